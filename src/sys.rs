// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! System abstractions for cross-platform compatibility.
//!
//! This module provides platform-specific implementations of system functionality
//! that differs between native and WASM targets, plus the deadline combinator used
//! by every CPU-side wait on the device.

pub mod time {
    //! Time abstractions for cross-platform compatibility.
    //!
    //! On native platforms, this re-exports `std::time` types.
    //! On WASM platforms, this re-exports `web_time` types for compatibility.

    #[cfg(not(target_arch = "wasm32"))]
    pub use std::time::{Duration, Instant};

    #[cfg(target_arch = "wasm32")]
    pub use web_time::{Duration, Instant};
}

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Returned by [with_deadline] when the deadline elapses first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut;

/// Races a future against a sleep.
///
/// The wrapped future is polled first on every wakeup, so a future that is ready at the
/// same moment the deadline passes still wins.
struct Deadline<F, S> {
    future: Pin<Box<F>>,
    sleep: Pin<Box<S>>,
}

impl<F, S> Future for Deadline<F, S>
where
    F: Future,
    S: Future,
{
    type Output = Result<F::Output, TimedOut>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(value) = self.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }
        match self.sleep.as_mut().poll(cx) {
            Poll::Ready(_) => Poll::Ready(Err(TimedOut)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Awaits `future`, giving up after `deadline`.
pub async fn with_deadline<F: Future>(
    future: F,
    deadline: time::Duration,
) -> Result<F::Output, TimedOut> {
    Deadline {
        future: Box::pin(future),
        sleep: Box::pin(portable_async_sleep::async_sleep(deadline)),
    }
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_future_beats_deadline() {
        let r = test_executors::sleep_on(with_deadline(async { 7 }, time::Duration::from_secs(5)));
        assert_eq!(r, Ok(7));
    }

    #[test]
    fn pending_future_times_out() {
        let r = test_executors::sleep_on(with_deadline(
            std::future::pending::<()>(),
            time::Duration::from_millis(10),
        ));
        assert_eq!(r, Err(TimedOut));
    }
}
