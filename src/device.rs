// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The producer side: recording, transitions, submission. */

pub mod config;
mod context;
pub mod splitter;
pub mod stream;
mod transition;

pub use config::Config;
pub use context::DeviceContext;
pub use transition::{SLOT_TABLE, SlotCapabilities};
