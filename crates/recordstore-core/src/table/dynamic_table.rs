//! Column-oriented tables with a shared row set.

use std::collections::{HashMap, HashSet};

use snafu::prelude::*;

use crate::builder::{BufferView, Value};

use super::{
    column::{Column, TableRef},
    error::*,
    row_set::RowSet,
};

/// When region-reference indices are checked against their target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceValidation {
    /// At `add_row` time; requires a [`TableResolver`].
    #[default]
    Eager,
    /// Only when the reference is resolved or the store is read.
    Deferred,
}

/// Looks up tables by absolute store path to validate and resolve region
/// references.
pub trait TableResolver {
    /// Table stored at `path`, if known.
    fn resolve_table(&self, path: &str) -> Option<&DynamicTable>;
}

/// Ad-hoc resolver over borrowed tables.
#[derive(Debug, Default)]
pub struct TableSet<'a> {
    tables: Vec<(String, &'a DynamicTable)>,
}

impl<'a> TableSet<'a> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under `path`.
    pub fn with(mut self, path: impl Into<String>, table: &'a DynamicTable) -> Self {
        self.tables.push((path.into(), table));
        self
    }
}

impl TableResolver for TableSet<'_> {
    fn resolve_table(&self, path: &str) -> Option<&DynamicTable> {
        self.tables
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, t)| *t)
    }
}

/// An ordered set of named columns sharing one [`RowSet`].
///
/// Every column always holds exactly as many rows as the row set. Rows are
/// validated against every column before any column is modified, so a
/// rejected row leaves the table untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTable {
    name: String,
    description: String,
    ids: RowSet,
    columns: Vec<Column>,
    validation: ReferenceValidation,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a DynamicTable,
    index: usize,
}

impl<'a> Row<'a> {
    /// Table this row belongs to.
    pub fn table(&self) -> &'a DynamicTable {
        self.table
    }

    /// Row position.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Row identifier.
    pub fn id(&self) -> i64 {
        self.table.ids.ids()[self.index]
    }

    /// Cell value of `column` (a list for ragged columns).
    pub fn get(&self, column: &str) -> Option<Value> {
        self.table.column(column)?.get(self.index)
    }

    /// Borrow the cell of `column` without copying.
    pub fn view(&self, column: &str) -> Option<BufferView<'a>> {
        self.table.column(column)?.row_view(self.index)
    }

    /// All cells in column order.
    pub fn values(&self) -> Vec<(&'a str, Value)> {
        self.table
            .columns
            .iter()
            .filter_map(|c| Some((c.name(), c.get(self.index)?)))
            .collect()
    }
}

impl DynamicTable {
    /// Empty table with no columns.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ids: RowSet::new(),
            columns: Vec::new(),
            validation: ReferenceValidation::default(),
        }
    }

    /// Select the reference validation policy.
    pub fn with_validation(mut self, validation: ReferenceValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Change the reference validation policy in place.
    pub fn set_validation(&mut self, validation: ReferenceValidation) {
        self.validation = validation;
    }

    /// Rebuild a table from stored parts, checking every invariant.
    ///
    /// The rebuilt table validates eagerly; callers restoring a deferred
    /// table set the policy afterwards with [`Self::set_validation`].
    pub fn from_parts(
        name: impl Into<String>,
        description: impl Into<String>,
        ids: Vec<i64>,
        columns: Vec<Column>,
    ) -> TableResult<Self> {
        let name = name.into();
        let ids = RowSet::from_ids(ids).map_err(|id| {
            DuplicateRowIdSnafu {
                table: name.clone(),
                id,
            }
            .build()
        })?;
        let mut seen = HashSet::new();
        for column in &columns {
            ensure!(
                seen.insert(column.name()),
                DuplicateColumnSnafu {
                    table: &name,
                    column: column.name(),
                }
            );
        }
        let table = Self {
            name,
            description: description.into(),
            ids,
            columns,
            validation: ReferenceValidation::default(),
        };
        table.check_consistency()?;
        Ok(table)
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Table description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replace the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Active reference validation policy.
    pub fn validation(&self) -> ReferenceValidation {
        self.validation
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Row identifiers in row order.
    pub fn ids(&self) -> &[i64] {
        self.ids.ids()
    }

    /// Column names in declaration order.
    pub fn colnames(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Declare a column. Columns must be declared before the first row.
    ///
    /// # Errors
    ///
    /// [`TableError::DuplicateColumn`] if the name is taken,
    /// [`TableError::ColumnAfterRows`] if rows already exist (use
    /// [`Self::add_column_with_fill`] instead).
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        indexed: bool,
        references: Option<TableRef>,
    ) -> TableResult<()> {
        let name = name.into();
        self.ensure_new_column(&name)?;
        ensure!(
            self.is_empty(),
            ColumnAfterRowsSnafu {
                table: &self.name,
                column: name,
                rows: self.len(),
            }
        );
        self.columns
            .push(Column::new(name, description, indexed, references));
        Ok(())
    }

    /// Declare a column and back-fill every existing row with `fill`.
    pub fn add_column_with_fill(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        indexed: bool,
        references: Option<TableRef>,
        fill: Value,
    ) -> TableResult<()> {
        let name = name.into();
        self.ensure_new_column(&name)?;
        let mut column = Column::new(name, description, indexed, references);
        column.check(&self.name, &fill)?;
        for _ in 0..self.len() {
            column.push(&self.name, &fill)?;
        }
        self.columns.push(column);
        Ok(())
    }

    fn ensure_new_column(&self, name: &str) -> TableResult<()> {
        ensure!(
            self.column(name).is_none(),
            DuplicateColumnSnafu {
                table: &self.name,
                column: name,
            }
        );
        Ok(())
    }

    /// Append a row and return its id.
    ///
    /// `values` must supply exactly one value per declared column. Region
    /// references are accepted unchecked only on a
    /// [`ReferenceValidation::Deferred`] table; an eager table needs
    /// [`Self::add_row_with`].
    pub fn add_row<I, K>(&mut self, id: Option<i64>, values: I) -> TableResult<i64>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.insert_row(id, collect_values(values), None)
    }

    /// Append a row, validating region references against `resolver`.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`Self::add_row`]:
    /// [`TableError::OutOfRangeReference`] when an index is past the end of
    /// its target and [`TableError::UnresolvedTable`] when the target is
    /// unknown to `resolver`.
    pub fn add_row_with<I, K>(
        &mut self,
        id: Option<i64>,
        values: I,
        resolver: &dyn TableResolver,
    ) -> TableResult<i64>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.insert_row(id, collect_values(values), Some(resolver))
    }

    fn insert_row(
        &mut self,
        id: Option<i64>,
        values: HashMap<String, Value>,
        resolver: Option<&dyn TableResolver>,
    ) -> TableResult<i64> {
        if let Some(unknown) = values.keys().filter(|k| self.column(k).is_none()).min() {
            return UnknownColumnSnafu {
                table: &self.name,
                column: unknown,
            }
            .fail();
        }

        for column in &self.columns {
            let value = values.get(column.name()).context(MissingColumnValueSnafu {
                table: &self.name,
                column: column.name(),
            })?;
            column.check(&self.name, value)?;
            if column.target().is_some() && self.validation == ReferenceValidation::Eager {
                check_references(column, value, resolver)?;
            }
        }

        let id = self.ids.check(id).map_err(|id| {
            DuplicateRowIdSnafu {
                table: self.name.clone(),
                id,
            }
            .build()
        })?;

        for column in &mut self.columns {
            if let Some(value) = values.get(column.name()) {
                column.push(&self.name, value)?;
            }
        }
        self.ids.push(id);
        self.check_consistency()?;
        Ok(id)
    }

    /// Verify that every column holds as many rows as the row set.
    pub fn check_consistency(&self) -> TableResult<()> {
        for column in &self.columns {
            ensure!(
                column.len() == self.len(),
                InconsistentColumnsSnafu {
                    table: &self.name,
                    column: column.name(),
                    expected: self.len(),
                    found: column.len(),
                }
            );
        }
        Ok(())
    }

    /// Row at position `index`.
    pub fn get_row(&self, index: usize) -> TableResult<Row<'_>> {
        ensure!(
            index < self.len(),
            RowOutOfRangeSnafu {
                table: &self.name,
                row: index,
                len: self.len(),
            }
        );
        Ok(Row { table: self, index })
    }

    /// Row with identifier `id`.
    pub fn row_by_id(&self, id: i64) -> Option<Row<'_>> {
        let index = self.ids.position(id)?;
        Some(Row { table: self, index })
    }

    /// Resolve the region reference stored in `column` at `row` to the target
    /// table's rows.
    ///
    /// # Errors
    ///
    /// [`TableError::CorruptIndex`] when an index does not exist in the
    /// target table, [`TableError::UnresolvedTable`] when `resolver` does not
    /// know the target.
    pub fn resolve_region<'r>(
        &self,
        column: &str,
        row: usize,
        resolver: &'r dyn TableResolver,
    ) -> TableResult<Vec<Row<'r>>> {
        let col = self.column(column).context(UnknownColumnSnafu {
            table: &self.name,
            column,
        })?;
        let target = col.target().context(CorruptIndexSnafu {
            column,
            reason: "not a region-reference column",
        })?;
        self.get_row(row)?;
        let table = resolver
            .resolve_table(target.path())
            .context(UnresolvedTableSnafu {
                column,
                target: target.path(),
            })?;
        col.region_indices(row)
            .unwrap_or_default()
            .into_iter()
            .map(|i| match usize::try_from(i) {
                Ok(index) if index < table.len() => Ok(Row { table, index }),
                _ => CorruptIndexSnafu {
                    column,
                    reason: format!(
                        "row {row} references index {i} of {}, which has {} rows",
                        target.path(),
                        table.len()
                    ),
                }
                .fail(),
            })
            .collect()
    }

    /// Check every stored region reference against its target table.
    pub fn verify_references(&self, resolver: &dyn TableResolver) -> TableResult<()> {
        for column in self.columns.iter().filter(|c| c.target().is_some()) {
            for row in 0..self.len() {
                self.resolve_region(column.name(), row, resolver)?;
            }
        }
        Ok(())
    }
}

fn collect_values<I, K>(values: I) -> HashMap<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

fn check_references(
    column: &Column,
    value: &Value,
    resolver: Option<&dyn TableResolver>,
) -> TableResult<()> {
    let indices: Vec<i64> = match value {
        Value::Int(i) => vec![*i],
        Value::List(items) => items.iter().filter_map(Value::as_int).collect(),
        _ => Vec::new(),
    };
    let Some(target) = column.target() else {
        return Ok(());
    };
    if indices.is_empty() {
        return Ok(());
    }
    let table = resolver
        .and_then(|r| r.resolve_table(target.path()))
        .context(UnresolvedTableSnafu {
            column: column.name(),
            target: target.path(),
        })?;
    for index in indices {
        let in_range = usize::try_from(index).is_ok_and(|i| i < table.len());
        ensure!(
            in_range,
            OutOfRangeReferenceSnafu {
                column: column.name(),
                target: target.path(),
                index,
                len: table.len(),
            }
        );
    }
    Ok(())
}
