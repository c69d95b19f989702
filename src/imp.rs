// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The device the core talks to.

The synchronization core needs a handful of things from a device: memory it can
allocate and (later) free, somewhere to submit recorded streams, a consumer timeline
that executes them in order, and a resolve pass for fast-clear metadata.

At the moment the only backend is `software`, which executes streams on the host.  It
is exact about ordering (it is the reference for what the recorded instructions mean),
which is what tests and tools need.
*/

mod software;

pub use software::*;
