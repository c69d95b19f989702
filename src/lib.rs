/*! locks_and_labels is the synchronization core of a GPU command-encoding layer.

It sits between a rendering front end, which records draw, dispatch and clear commands
on a *producer timeline*, and a device, which executes those commands on a *consumer
timeline* that trails the producer by an unbounded number of frames.  Both timelines
share mutable buffers and textures.  This crate keeps them from stepping on each other.

Here is a quick chart of the pieces and the hazard each one removes:

| Piece                                   | Hazard                                             | Mechanism                                   |
|-----------------------------------------|----------------------------------------------------|---------------------------------------------|
| [fence::FenceGate]                      | "is the device past this point yet?"               | end-of-pipe label write, device/CPU wait    |
| [multibuffer::BufferVersionRing]        | CPU overwriting data the device is still reading   | fresh version per write, deferred rebind    |
| [bindings::resource_tracking]           | not knowing which barriers are needed              | per-resource access class, dirty bit        |
| [DeviceContext::request_transition]     | stale caches between write and read roles          | batched waits, fences, cache operations     |
| [bindings::fast_clear::FastClearLedger] | sampling compressed clear metadata as pixels       | lazy resolve on first read                  |
| [device::splitter]                      | unbounded submissions                              | size-based cuts at safe points              |

# Timelines

The producer owns a [DeviceContext] and mutates it through `&mut`; there is no global
device state.  The consumer is the device in [imp], which drains submitted command
streams in order.  Work the producer wants done *on the consumer timeline*, such as
rebinding a buffer to a new version, is recorded into the stream as a
[device::stream::DeferredOp], so the point where the device drains it *is* the fence.

# Cost model

[DeviceContext::request_transition] never blocks the CPU.  Read locks on a
[multibuffer::BufferVersionRing] stall until the device is idle; they are for
read-back, and they log a performance warning every time.

# Sharp edges

[bindings::resource_tracking::AccessClass::ReadWriteNoBarrier] tells the protocol that
the caller has already synchronized by other means.  If that is not true the result is
a silent data race.  Nothing in this crate can detect it.
*/

pub mod bindings;
pub mod device;
pub mod error;
pub mod fence;
pub mod imp;
pub mod multibuffer;
pub mod sys;

pub use device::DeviceContext;
pub use error::Error;
