//! Time source for a single-threaded context.
//!
//! The browser supplies `Date.now()` and timer futures; native tests supply
//! tokio's. Futures are `!Send` because every context runs on one thread.

use futures::future::{self, Either, LocalBoxFuture};
use std::future::Future;
use std::time::Duration;

pub trait Clock {
    fn now_ms(&self) -> u64;

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        (**self).sleep(duration)
    }
}

/// `None` when `duration` elapses before `fut` completes
pub async fn with_timeout<C, F>(clock: &C, duration: Duration, fut: F) -> Option<F::Output>
where
    C: Clock + ?Sized,
    F: Future,
{
    let fut = Box::pin(fut);
    match future::select(fut, clock.sleep(duration)).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

/// Poll `check` up to `attempts` times, `interval` apart
pub async fn poll_until<C, T, F>(clock: &C, attempts: u32, interval: Duration, mut check: F) -> Option<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    for attempt in 1..=attempts {
        if let Some(found) = check() {
            return Some(found);
        }
        if attempt < attempts {
            clock.sleep(interval).await;
        }
    }
    None
}
