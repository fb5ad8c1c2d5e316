//! Queries over table scans.
//!
//! A [`Query`] names a table and optionally narrows the scan with a
//! [`Filter`], an offset and a limit. Filters can be built programmatically or
//! parsed from inline selection text with positional arguments.

mod filter;
mod selection;

pub use filter::{CompareOp, Filter};
pub use selection::parse_selection;

use crate::entity::Entity;
use crate::error::Error;

/// A table scan description.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    filter: Option<Filter>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// Scan every row of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            offset: 0,
            limit: None,
        }
    }

    /// Scan every row of the table backing `T`.
    pub fn of<T: Entity>() -> Self {
        Self::new(T::KIND)
    }

    /// Narrow the scan with a filter. Combines with an existing filter using AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Narrow the scan with selection text and its positional arguments.
    pub fn with_selection(self, selection: &str, args: &[&str]) -> Result<Self, Error> {
        let filter = parse_selection(selection, args)?;
        Ok(self.filter(filter))
    }

    /// Skip the first `offset` matching rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Return at most `limit` matching rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filter_expr(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn skip(&self) -> usize {
        self.offset
    }

    pub fn take(&self) -> Option<usize> {
        self.limit
    }
}
