//! Column layout of table groups.
//!
//! A table group carries a `colnames` attribute, an `id` dataset, one
//! dataset per column and, for ragged columns, a `<column>_index` dataset of
//! cumulative end offsets. Region columns name their target table in a
//! `table` attribute on the column dataset. A deferred table carries a
//! `reference_validation` attribute so the policy survives a round trip.

use snafu::prelude::*;

use crate::{
    builder::{DatasetBuilder, GroupBuilder, NdArray, Value},
    storage::layout::{
        COLNAMES_ATTR, DEFERRED_VALIDATION, DESCRIPTION_ATTR, ID_DATASET, TABLE_ATTR,
        VALIDATION_ATTR, index_dataset_name,
    },
    table::{Column, CorruptIndexSnafu, DynamicTable, ReferenceValidation, TableRef},
};

use super::{MapResult, MissingFieldSnafu, TableSnafu};

pub(super) fn encode(table: &DynamicTable, group: &mut GroupBuilder) {
    let colnames: Vec<Value> = table.colnames().map(Value::from).collect();
    group.set_attribute(COLNAMES_ATTR, Value::List(colnames));
    if table.validation() == ReferenceValidation::Deferred {
        group.set_attribute(VALIDATION_ATTR, DEFERRED_VALIDATION);
    }
    group.set_dataset(DatasetBuilder::new(
        ID_DATASET,
        NdArray::from_ints(table.ids().to_vec()),
    ));
    for column in table.columns() {
        let mut dataset = DatasetBuilder::new(column.name(), column.values().clone())
            .with_attribute(DESCRIPTION_ATTR, column.description());
        if let Some(target) = column.target() {
            dataset.set_attribute(TABLE_ATTR, target.path());
        }
        group.set_dataset(dataset);
        if let Some(ends) = column.index_ends() {
            group.set_dataset(DatasetBuilder::new(
                index_dataset_name(column.name()),
                NdArray::from_ints(ends),
            ));
        }
    }
}

pub(super) fn decode(group: &GroupBuilder, path: &str) -> MapResult<DynamicTable> {
    let colnames: Vec<&str> = match group.attribute(COLNAMES_ATTR) {
        Some(Value::List(items)) => items.iter().filter_map(Value::as_text).collect(),
        Some(Value::Text(single)) => vec![single.as_str()],
        _ => Vec::new(),
    };
    let ids = match group.dataset(ID_DATASET) {
        Some(ids) => ints(ids.array(), ID_DATASET).context(TableSnafu { path })?,
        None if colnames.is_empty() => Vec::new(),
        None => {
            return MissingFieldSnafu {
                path,
                field: ID_DATASET,
            }
            .fail();
        }
    };

    let mut columns = Vec::with_capacity(colnames.len());
    for name in colnames {
        let dataset = group.dataset(name).context(MissingFieldSnafu { path, field: name })?;
        let description = dataset
            .attribute(DESCRIPTION_ATTR)
            .and_then(Value::as_text)
            .unwrap_or_default();
        let target = dataset
            .attribute(TABLE_ATTR)
            .and_then(Value::as_text)
            .map(TableRef::new);
        let values = dataset.array().clone();
        let column = match group.dataset(&index_dataset_name(name)) {
            Some(index) => {
                let ends = ints(index.array(), name).context(TableSnafu { path })?;
                Column::from_ragged(name, description, values, &ends, target)
            }
            None => Column::from_values(name, description, values, target),
        }
        .context(TableSnafu { path })?;
        columns.push(column);
    }
    let mut table =
        DynamicTable::from_parts(group.name(), "", ids, columns).context(TableSnafu { path })?;
    if group.attribute(VALIDATION_ATTR).and_then(Value::as_text) == Some(DEFERRED_VALIDATION) {
        table.set_validation(ReferenceValidation::Deferred);
    }
    Ok(table)
}

/// Integer contents of an id or offsets dataset; an empty dataset of any type is empty.
fn ints(array: &NdArray, column: &str) -> crate::table::TableResult<Vec<i64>> {
    if array.data().is_empty() {
        return Ok(Vec::new());
    }
    match array.as_ints() {
        Some(ints) if array.shape().len() == 1 => Ok(ints.to_vec()),
        _ => CorruptIndexSnafu {
            column,
            reason: format!(
                "expected a vector of integers, found {} with shape {:?}",
                array.dtype(),
                array.shape()
            ),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(validation: ReferenceValidation) -> DynamicTable {
        let mut t = DynamicTable::new("units", "").with_validation(validation);
        t.add_column("electrodes", "", true, Some(TableRef::new("/general/electrodes")))
            .unwrap();
        t
    }

    #[test]
    fn validation_policy_survives_a_round_trip() {
        let mut deferred = regions(ReferenceValidation::Deferred);
        deferred
            .add_row(None, [("electrodes", Value::from(vec![4i64]))])
            .unwrap();
        let mut group = GroupBuilder::new("units");
        encode(&deferred, &mut group);
        assert_eq!(
            group.attribute(VALIDATION_ATTR).and_then(Value::as_text),
            Some(DEFERRED_VALIDATION)
        );
        let back = decode(&group, "/units").unwrap();
        assert_eq!(back.validation(), ReferenceValidation::Deferred);
        assert_eq!(back.len(), 1);

        let mut group = GroupBuilder::new("units");
        encode(&regions(ReferenceValidation::Eager), &mut group);
        assert!(group.attribute(VALIDATION_ATTR).is_none());
        let back = decode(&group, "/units").unwrap();
        assert_eq!(back.validation(), ReferenceValidation::Eager);
    }
}
