//! Error types and SNAFU context selectors for dynamic tables.
//!
//! Row-level variants are raised before any column is touched, so a failed
//! `add_row` leaves the table exactly as it was.

use snafu::prelude::*;

use crate::builder::ValueError;

/// Errors from table construction, row insertion and region resolution.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// A column with this name is already declared.
    #[snafu(display("table {table:?} already has a column named {column:?}"))]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Offending column name.
        column: String,
    },

    /// A row or lookup names a column that is not declared.
    #[snafu(display("table {table:?} has no column named {column:?}"))]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Offending column name.
        column: String,
    },

    /// A column was declared without a fill value after rows were added.
    #[snafu(display(
        "cannot declare column {column:?} on table {table:?} after {rows} rows were added without a fill value"
    ))]
    ColumnAfterRows {
        /// Table name.
        table: String,
        /// Offending column name.
        column: String,
        /// Current row count.
        rows: usize,
    },

    /// A row omitted a value for a declared column.
    #[snafu(display("row for table {table:?} is missing a value for column {column:?}"))]
    MissingColumnValue {
        /// Table name.
        table: String,
        /// Column without a value.
        column: String,
    },

    /// A row id is already present.
    #[snafu(display("table {table:?} already contains row id {id}"))]
    DuplicateRowId {
        /// Table name.
        table: String,
        /// Colliding id.
        id: i64,
    },

    /// A region reference points past the end of its target table.
    #[snafu(display(
        "column {column:?} references row {index} of {target:?}, which has {len} rows"
    ))]
    OutOfRangeReference {
        /// Region column name.
        column: String,
        /// Target table path.
        target: String,
        /// Offending index.
        index: i64,
        /// Row count of the target at validation time.
        len: usize,
    },

    /// A value does not fit the column's element type or shape.
    #[snafu(display("invalid value for column {column:?} of table {table:?}: {source}"))]
    TypeMismatch {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Underlying value error.
        source: ValueError,
    },

    /// The owning container caps the table at `capacity` rows.
    #[snafu(display("table {table:?} is full at {capacity} rows"))]
    TableFull {
        /// Table name.
        table: String,
        /// Row limit.
        capacity: usize,
    },

    /// A row index past the end of the table.
    #[snafu(display("row {row} is out of range for table {table:?} with {len} rows"))]
    RowOutOfRange {
        /// Table name.
        table: String,
        /// Requested row.
        row: usize,
        /// Current row count.
        len: usize,
    },

    /// A region column's target table could not be resolved.
    #[snafu(display("column {column:?} references table {target:?}, which could not be resolved"))]
    UnresolvedTable {
        /// Region column name.
        column: String,
        /// Target table path.
        target: String,
    },

    /// Ragged offsets or region indices violate their invariants.
    #[snafu(display("corrupt index for column {column:?}: {reason}"))]
    CorruptIndex {
        /// Column name.
        column: String,
        /// What is wrong.
        reason: String,
    },

    /// A column's row count diverges from the table's row count.
    #[snafu(display(
        "column {column:?} of table {table:?} has {found} rows, expected {expected}"
    ))]
    InconsistentColumns {
        /// Table name.
        table: String,
        /// Diverging column.
        column: String,
        /// Table row count.
        expected: usize,
        /// Column row count.
        found: usize,
    },
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;
