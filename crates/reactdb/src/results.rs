//! Auto-closing query results.

use std::iter::FusedIterator;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use reactdb_core::EntityCursor;
use tracing::trace;

use crate::Result;

/// Lazily iterated query results backed by a storage cursor.
///
/// The cursor is closed exactly once: when the rows run out, right after an
/// error is yielded, or when the results are dropped early. After closing the
/// sequence is fused.
pub struct QueryResults<T> {
    cursor: Option<EntityCursor<T>>,
    kind: &'static str,
    yielded: usize,
}

impl<T> QueryResults<T> {
    pub(crate) fn new(cursor: EntityCursor<T>, kind: &'static str) -> Self {
        Self {
            cursor: Some(cursor),
            kind,
            yielded: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
            trace!(kind = self.kind, yielded = self.yielded, "query results closed");
        }
    }
}

impl<T> Iterator for QueryResults<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.as_mut()?.advance() {
            Some(Ok(entity)) => {
                self.yielded += 1;
                Some(Ok(entity))
            }
            Some(Err(e)) => {
                self.close();
                Some(Err(e))
            }
            None => {
                self.close();
                None
            }
        }
    }
}

impl<T> FusedIterator for QueryResults<T> {}

impl<T> Stream for QueryResults<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next())
    }
}

impl<T> Drop for QueryResults<T> {
    fn drop(&mut self) {
        self.close();
    }
}
