/*! Per-resource state shared between the producer and the transition protocol. */

pub mod buffer_access;
pub mod dirty_tracking;
pub mod fast_clear;
pub mod resource_tracking;
pub mod visible_to;

pub use resource_tracking::{AccessClass, ResourceId};
