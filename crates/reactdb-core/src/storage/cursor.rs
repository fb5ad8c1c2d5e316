//! Forward-only cursors over table rows.

use std::marker::PhantomData;

use tracing::trace;

use super::Record;
use crate::entity::{self, Entity};
use crate::error::Error;
use crate::query::{Filter, Query};

/// A resource-backed, forward-only sequence of rows.
///
/// A cursor holds storage resources until [`Cursor::close`] is called. After
/// closing, `advance` returns `None`.
pub trait Cursor: Send {
    type Item;

    /// Produce the next row, or `None` when the cursor is exhausted or closed.
    fn advance(&mut self) -> Option<Result<Self::Item, Error>>;

    /// Release the underlying resources.
    fn close(&mut self);
}

/// Cursor over one sled table, decoding rows into `T`.
///
/// Rows are visited in id order. The filter, offset and limit of the query are
/// applied while scanning so non-matching rows are never converted to `T`.
pub struct TableCursor<T> {
    table: String,
    iter: Option<sled::Iter>,
    filter: Option<Filter>,
    to_skip: usize,
    remaining: Option<usize>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> TableCursor<T> {
    pub(crate) fn new(iter: sled::Iter, query: &Query) -> Self {
        Self {
            table: query.table().to_string(),
            iter: Some(iter),
            filter: query.filter_expr().cloned(),
            to_skip: query.skip(),
            remaining: query.take(),
            _entity: PhantomData,
        }
    }

    fn decode_row(&self, bytes: &[u8]) -> Result<Option<T>, Error> {
        let record = Record::from_bytes(bytes)?;
        match &self.filter {
            Some(filter) => {
                let doc = entity::decode_value(&record.data)?;
                if filter.matches(&doc) {
                    entity::from_value(doc).map(Some)
                } else {
                    Ok(None)
                }
            }
            None => entity::decode(&record.data).map(Some),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.iter.is_none()
    }
}

impl<T: Entity> Cursor for TableCursor<T> {
    type Item = T;

    fn advance(&mut self) -> Option<Result<T, Error>> {
        if self.remaining == Some(0) {
            return None;
        }

        loop {
            let (_, value) = match self.iter.as_mut()?.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e.into())),
            };

            match self.decode_row(&value) {
                Ok(Some(_)) if self.to_skip > 0 => self.to_skip -= 1,
                Ok(Some(entity)) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(entity));
                }
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn close(&mut self) {
        if self.iter.take().is_some() {
            trace!(table = %self.table, "cursor closed");
        }
    }
}
