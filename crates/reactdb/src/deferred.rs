//! Cold, single-value units of work.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::Result;

type Work<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// A store operation that has not run yet.
///
/// Nothing happens until the value is pulled, either with [`Deferred::run`]
/// or by awaiting it. The work runs synchronously on the pulling thread.
/// Dropping a `Deferred` without pulling it performs no side effect.
#[must_use = "deferred operations do nothing unless run or awaited"]
pub struct Deferred<T> {
    work: Work<T>,
}

impl<T> Deferred<T> {
    pub(crate) fn new(work: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self {
            work: Box::new(work),
        }
    }

    /// Run the operation on the current thread and return its result.
    pub fn run(self) -> Result<T> {
        (self.work)()
    }

    /// Chain a transformation of the value, still without running anything.
    pub fn map<U>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Deferred<U>
    where
        T: 'static,
    {
        Deferred::new(move || self.run().map(f))
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T> IntoFuture for Deferred<T> {
    type Output = Result<T>;
    type IntoFuture = DeferredFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        DeferredFuture {
            work: Some(self.work),
        }
    }
}

/// Future returned by awaiting a [`Deferred`]. Runs the work on first poll.
pub struct DeferredFuture<T> {
    work: Option<Work<T>>,
}

impl<T> Future for DeferredFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let work = self
            .get_mut()
            .work
            .take()
            .expect("DeferredFuture polled after completion");
        Poll::Ready(work())
    }
}
