//! Dynamic tables: a shared row set plus scalar, ragged and region-reference
//! columns.
//!
//! Row insertion validates every column first and only then appends, so the
//! table never exposes a partially added row. Region references name their
//! target by absolute store path and are resolved through a
//! [`TableResolver`].
mod column;
mod dynamic_table;
mod error;
mod row_set;

pub use column::{Column, ColumnKind, TableRef};
pub use dynamic_table::{DynamicTable, ReferenceValidation, Row, TableResolver, TableSet};
pub use error::{TableError, TableResult};
pub(crate) use error::*;
pub use row_set::RowSet;
