//! Table columns: scalar, ragged and region-reference variants.

use snafu::prelude::*;

use crate::builder::{
    BufferView, DType, NdArray, Value, ValueError, values::TypeMismatchSnafu as ValueTypeSnafu,
};

use super::error::{CorruptIndexSnafu, TableResult, TypeMismatchSnafu};

/// Non-owning reference to another table by its absolute store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    path: String,
}

impl TableRef {
    /// Reference the table stored at `path` (for example `/general/electrodes`).
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Absolute path of the target table.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Observable column variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// One value per row.
    Scalar,
    /// A variable-length sequence per row.
    Ragged,
    /// Row indices into another table (one index, or a sequence when indexed).
    RegionReference,
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnData {
    Plain(NdArray),
    /// `offsets` has one entry per row plus a leading 0; row `i` spans
    /// `values[offsets[i]..offsets[i + 1]]`.
    Ragged { values: NdArray, offsets: Vec<usize> },
}

/// One named column of a [`super::DynamicTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    description: String,
    data: ColumnData,
    target: Option<TableRef>,
}

impl Column {
    /// Empty column. `indexed` selects ragged storage; `target` makes it a
    /// region reference.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        indexed: bool,
        target: Option<TableRef>,
    ) -> Self {
        let dtype = if target.is_some() {
            DType::Int
        } else {
            DType::Float
        };
        let data = if indexed {
            ColumnData::Ragged {
                values: NdArray::empty(dtype),
                offsets: vec![0],
            }
        } else {
            ColumnData::Plain(NdArray::empty(dtype))
        };
        Self {
            name: name.into(),
            description: description.into(),
            data,
            target,
        }
    }

    /// Rebuild a non-indexed column from its stored values.
    pub fn from_values(
        name: impl Into<String>,
        description: impl Into<String>,
        values: NdArray,
        target: Option<TableRef>,
    ) -> TableResult<Self> {
        let name = name.into();
        ensure!(
            !values.is_scalar(),
            CorruptIndexSnafu {
                column: &name,
                reason: "column values must have at least one dimension",
            }
        );
        if target.is_some() {
            check_region_dtype(&values, &name)?;
        }
        Ok(Self {
            name,
            description: description.into(),
            data: ColumnData::Plain(values),
            target,
        })
    }

    /// Rebuild a ragged column from its flat values and cumulative end offsets.
    ///
    /// # Errors
    ///
    /// [`super::TableError::CorruptIndex`] if an offset is negative, the
    /// offsets decrease, or the last offset differs from the number of values.
    pub fn from_ragged(
        name: impl Into<String>,
        description: impl Into<String>,
        values: NdArray,
        ends: &[i64],
        target: Option<TableRef>,
    ) -> TableResult<Self> {
        let name = name.into();
        ensure!(
            !values.is_scalar(),
            CorruptIndexSnafu {
                column: &name,
                reason: "ragged values must have at least one dimension",
            }
        );
        let mut offsets = Vec::with_capacity(ends.len() + 1);
        offsets.push(0usize);
        let mut prev = 0usize;
        for (row, &end) in ends.iter().enumerate() {
            let Ok(end) = usize::try_from(end) else {
                return CorruptIndexSnafu {
                    column: &name,
                    reason: format!("offset {end} for row {row} is negative"),
                }
                .fail();
            };
            ensure!(
                end >= prev,
                CorruptIndexSnafu {
                    column: &name,
                    reason: format!("offset {end} for row {row} is below previous offset {prev}"),
                }
            );
            offsets.push(end);
            prev = end;
        }
        ensure!(
            prev == values.rows(),
            CorruptIndexSnafu {
                column: &name,
                reason: format!(
                    "last offset {prev} does not match value count {}",
                    values.rows()
                ),
            }
        );
        if target.is_some() {
            check_region_dtype(&values, &name)?;
        }
        Ok(Self {
            name,
            description: description.into(),
            data: ColumnData::Ragged { values, offsets },
            target,
        })
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Variant of this column.
    pub fn kind(&self) -> ColumnKind {
        match (&self.data, &self.target) {
            (_, Some(_)) => ColumnKind::RegionReference,
            (ColumnData::Ragged { .. }, None) => ColumnKind::Ragged,
            (ColumnData::Plain(_), None) => ColumnKind::Scalar,
        }
    }

    /// Whether rows hold variable-length sequences.
    pub fn is_indexed(&self) -> bool {
        matches!(self.data, ColumnData::Ragged { .. })
    }

    /// Target of a region-reference column.
    pub fn target(&self) -> Option<&TableRef> {
        self.target.as_ref()
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Plain(values) => values.rows(),
            ColumnData::Ragged { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat value buffer (all rows concatenated for ragged columns).
    pub fn values(&self) -> &NdArray {
        match &self.data {
            ColumnData::Plain(values) | ColumnData::Ragged { values, .. } => values,
        }
    }

    /// Offsets including the leading 0, for ragged columns.
    pub fn offsets(&self) -> Option<&[usize]> {
        match &self.data {
            ColumnData::Ragged { offsets, .. } => Some(offsets),
            ColumnData::Plain(_) => None,
        }
    }

    /// Cumulative end offsets (one per row, no leading 0), as stored on disk.
    pub fn index_ends(&self) -> Option<Vec<i64>> {
        self.offsets()
            .map(|o| o.iter().skip(1).map(|&e| e as i64).collect())
    }

    fn span(&self, row: usize) -> Option<(usize, usize)> {
        let offsets = self.offsets()?;
        Some((*offsets.get(row)?, *offsets.get(row + 1)?))
    }

    /// Borrow row `row` without copying.
    pub fn row_view(&self, row: usize) -> Option<BufferView<'_>> {
        if row >= self.len() {
            return None;
        }
        match &self.data {
            ColumnData::Plain(values) => values.view_rows(row..row + 1),
            ColumnData::Ragged { values, .. } => {
                let (start, end) = self.span(row)?;
                values.view_rows(start..end)
            }
        }
    }

    /// Row `row` as an owned value (a list for ragged columns).
    pub fn get(&self, row: usize) -> Option<Value> {
        if row >= self.len() {
            return None;
        }
        match &self.data {
            ColumnData::Plain(values) => values.row_value(row),
            ColumnData::Ragged { values, .. } => {
                let (start, end) = self.span(row)?;
                let items = (start..end).filter_map(|i| values.row_value(i)).collect();
                Some(Value::List(items))
            }
        }
    }

    /// Target row indices of row `row`, for region-reference columns.
    pub fn region_indices(&self, row: usize) -> Option<Vec<i64>> {
        self.target.as_ref()?;
        match self.get(row)? {
            Value::Int(i) => Some(vec![i]),
            Value::List(items) => Some(items.iter().filter_map(Value::as_int).collect()),
            _ => None,
        }
    }

    /// Check that `value` can be appended as one row, without mutating.
    pub(crate) fn check(&self, table: &str, value: &Value) -> TableResult<()> {
        self.check_value(value).context(TypeMismatchSnafu {
            table,
            column: &self.name,
        })
    }

    fn check_value(&self, value: &Value) -> Result<(), ValueError> {
        if self.target.is_some() {
            check_region_value(value, self.is_indexed())?;
        }
        match &self.data {
            ColumnData::Plain(values) => values.check_element(value),
            ColumnData::Ragged { values, .. } => {
                let Value::List(items) = value else {
                    return ValueTypeSnafu {
                        expected: values.dtype(),
                        found: value.describe(),
                    }
                    .fail();
                };
                // Elements must agree with each other as well as with the buffer.
                NdArray::from_value(value)?;
                items.iter().try_for_each(|item| values.check_element(item))
            }
        }
    }

    /// Append one row after [`Self::check`].
    pub(crate) fn push(&mut self, table: &str, value: &Value) -> TableResult<()> {
        self.check(table, value)?;
        let name = &self.name;
        match &mut self.data {
            ColumnData::Plain(values) => values
                .push_element(value)
                .context(TypeMismatchSnafu { table, column: name }),
            ColumnData::Ragged { values, offsets } => {
                let items = value.as_list().unwrap_or_default();
                for item in items {
                    values
                        .push_element(item)
                        .context(TypeMismatchSnafu { table, column: name })?;
                }
                offsets.push(values.rows());
                Ok(())
            }
        }
    }
}

fn check_region_value(value: &Value, indexed: bool) -> Result<(), ValueError> {
    let ok = match value {
        Value::Int(_) => !indexed,
        Value::List(items) => indexed && items.iter().all(|i| matches!(i, Value::Int(_))),
        _ => false,
    };
    ensure!(
        ok,
        ValueTypeSnafu {
            expected: DType::Int,
            found: value.describe(),
        }
    );
    Ok(())
}

fn check_region_dtype(values: &NdArray, column: &str) -> TableResult<()> {
    ensure!(
        values.data().is_empty() || values.dtype() == DType::Int,
        CorruptIndexSnafu {
            column,
            reason: format!("region indices must be integers, found {}", values.dtype()),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableError;

    #[test]
    fn ragged_push_keeps_offsets_monotonic() {
        let mut col = Column::new("spike_times", "", true, None);
        col.push("t", &Value::from(vec![1.0, 2.0])).unwrap();
        col.push("t", &Value::List(vec![])).unwrap();
        col.push("t", &Value::from(vec![3.0])).unwrap();

        assert_eq!(col.offsets(), Some(&[0, 2, 2, 3][..]));
        assert_eq!(col.index_ends(), Some(vec![2, 2, 3]));
        assert_eq!(col.get(1), Some(Value::List(vec![])));
        assert_eq!(col.row_view(0).unwrap().as_floats(), Some(&[1.0, 2.0][..]));
        assert_eq!(col.kind(), ColumnKind::Ragged);
    }

    #[test]
    fn ragged_rejects_mixed_row_without_mutation() {
        let mut col = Column::new("labels", "", true, None);
        let err = col
            .push("t", &Value::List(vec![Value::from(1.0), Value::from("x")]))
            .unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
        assert!(col.is_empty());
        assert_eq!(col.values().rows(), 0);
    }

    #[test]
    fn from_ragged_detects_corrupt_offsets() {
        let values = NdArray::from_floats(vec![1.0, 2.0, 3.0]);
        let decreasing = Column::from_ragged("c", "", values.clone(), &[2, 1, 3], None);
        assert!(matches!(
            decreasing,
            Err(TableError::CorruptIndex { .. })
        ));
        let short = Column::from_ragged("c", "", values.clone(), &[1, 2], None);
        assert!(short.is_err());
        let ok = Column::from_ragged("c", "", values, &[0, 3], None).unwrap();
        assert_eq!(ok.get(0), Some(Value::List(vec![])));
    }

    #[test]
    fn region_values_must_be_integers() {
        let col = Column::new("electrodes", "", true, Some(TableRef::new("/general/electrodes")));
        assert!(col.check("units", &Value::from(vec![0i64, 1])).is_ok());
        assert!(col.check("units", &Value::from(vec![0.5])).is_err());
        assert!(col.check("units", &Value::Int(0)).is_err());
        assert_eq!(col.kind(), ColumnKind::RegionReference);
    }
}
