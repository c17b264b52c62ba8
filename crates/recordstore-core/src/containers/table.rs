//! Table-layout containers.

use snafu::prelude::*;

use crate::{
    builder::Value,
    container::{Container, FieldReader, FieldRef, ValidationError},
    table::{
        DynamicTable, ReferenceValidation, TableRef, TableResolver, TableResult,
        UnknownColumnSnafu,
    },
};

/// Path of the electrode table that unit rows reference.
pub const ELECTRODES_PATH: &str = "/general/electrodes";

/// Insert a row with `insert`, first declaring columns with `declare` when
/// `table` has none. A rejected first row leaves no declared columns behind.
pub(crate) fn insert_declaring<D, F>(
    table: &mut DynamicTable,
    declare: D,
    insert: F,
) -> TableResult<i64>
where
    D: FnOnce(&mut DynamicTable) -> TableResult<()>,
    F: FnOnce(&mut DynamicTable) -> TableResult<i64>,
{
    if !table.columns().is_empty() || !table.is_empty() {
        return insert(table);
    }
    let mut fresh = table.clone();
    declare(&mut fresh)?;
    let id = insert(&mut fresh)?;
    *table = fresh;
    Ok(id)
}

impl DynamicTable {
    /// Schema type name of a generic table.
    pub const TYPE: &'static str = "DynamicTable";

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let description = r.text("description");
        let table = r.table();
        let mut table = r.complete(table)?;
        if let Some(d) = description {
            table.set_description(d);
        }
        Ok(Box::new(table))
    }
}

impl Container for DynamicTable {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn name(&self) -> &str {
        DynamicTable::name(self)
    }

    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "description" => Some(FieldRef::text(self.description())),
            _ => None,
        }
    }

    fn as_table(&self) -> Option<&DynamicTable> {
        Some(self)
    }
}

/// Input of [`Units::add_unit`]. Optional fields become columns when the
/// first unit provides them; later units must provide the same set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitParams {
    /// Row identifier; auto-assigned when `None`.
    pub id: Option<i64>,
    /// Spike times in seconds.
    pub spike_times: Vec<f64>,
    /// Observation intervals as `[start, stop]` pairs.
    pub obs_intervals: Option<Vec<[f64; 2]>>,
    /// Row indices into the electrode table.
    pub electrodes: Option<Vec<i64>>,
    /// Path of the electrode group the unit was recorded on.
    pub electrode_group: Option<String>,
    /// Mean spike waveform.
    pub waveform_mean: Option<Vec<f64>>,
    /// Standard deviation of the spike waveform.
    pub waveform_sd: Option<Vec<f64>>,
}

impl UnitParams {
    /// Unit with only spike times.
    pub fn new(spike_times: Vec<f64>) -> Self {
        Self {
            spike_times,
            ..Self::default()
        }
    }

    /// Set the observation intervals.
    pub fn obs_intervals(mut self, intervals: Vec<[f64; 2]>) -> Self {
        self.obs_intervals = Some(intervals);
        self
    }

    /// Set the electrode indices.
    pub fn electrodes(mut self, electrodes: Vec<i64>) -> Self {
        self.electrodes = Some(electrodes);
        self
    }

    fn row(&self) -> Vec<(&'static str, Value)> {
        let mut row = vec![("spike_times", Value::from(self.spike_times.clone()))];
        if let Some(v) = &self.obs_intervals {
            row.push(("obs_intervals", Value::from(v.clone())));
        }
        if let Some(v) = &self.electrodes {
            row.push(("electrodes", Value::from(v.clone())));
        }
        if let Some(v) = &self.electrode_group {
            row.push(("electrode_group", Value::from(v.as_str())));
        }
        if let Some(v) = &self.waveform_mean {
            row.push(("waveform_mean", Value::from(v.clone())));
        }
        if let Some(v) = &self.waveform_sd {
            row.push(("waveform_sd", Value::from(v.clone())));
        }
        row
    }
}

/// Column layout of the predefined unit columns: (description, indexed, target).
fn unit_column(name: &str) -> (&'static str, bool, Option<TableRef>) {
    match name {
        "spike_times" => ("the spike times for each unit", true, None),
        "obs_intervals" => ("the observation intervals for each unit", true, None),
        "electrodes" => (
            "the electrodes that each spike unit came from",
            true,
            Some(TableRef::new(ELECTRODES_PATH)),
        ),
        "electrode_group" => ("the electrode group that each spike unit came from", false, None),
        "waveform_mean" => ("the spike waveform mean for each spike unit", false, None),
        _ => ("the spike waveform standard deviation for each spike unit", false, None),
    }
}

/// Sorted spike units: a table with predefined optional columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Units {
    table: DynamicTable,
}

impl Units {
    /// Schema type name.
    pub const TYPE: &'static str = "Units";
    /// Default group name.
    pub const NAME: &'static str = "units";

    /// Empty units table.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            table: DynamicTable::new(name, description),
        }
    }

    /// Select the reference validation policy of the `electrodes` column.
    pub fn with_validation(mut self, validation: ReferenceValidation) -> Self {
        self.table.set_validation(validation);
        self
    }

    /// Backing table.
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Mutable backing table, for custom columns.
    pub fn table_mut(&mut self) -> &mut DynamicTable {
        &mut self.table
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether there are no units.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Append a unit. Electrode indices are checked against `resolver` when
    /// one is given.
    pub fn add_unit(
        &mut self,
        unit: UnitParams,
        resolver: Option<&dyn TableResolver>,
    ) -> TableResult<i64> {
        let row = unit.row();
        let names: Vec<&'static str> = row.iter().map(|(name, _)| *name).collect();
        insert_declaring(
            &mut self.table,
            |t| {
                names.into_iter().try_for_each(|name| {
                    let (doc, indexed, target) = unit_column(name);
                    t.add_column(name, doc, indexed, target)
                })
            },
            |t| match resolver {
                Some(r) => t.add_row_with(unit.id, row, r),
                None => t.add_row(unit.id, row),
            },
        )
    }

    fn cell(&self, index: usize, column: &str) -> TableResult<Value> {
        let row = self.table.get_row(index)?;
        row.get(column).context(UnknownColumnSnafu {
            table: self.table.name(),
            column,
        })
    }

    /// Spike times of unit `index`.
    pub fn unit_spike_times(&self, index: usize) -> TableResult<Vec<f64>> {
        let cell = self.cell(index, "spike_times")?;
        Ok(cell
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_float)
            .collect())
    }

    /// Observation intervals of unit `index`.
    pub fn unit_obs_intervals(&self, index: usize) -> TableResult<Vec<[f64; 2]>> {
        let cell = self.cell(index, "obs_intervals")?;
        Ok(cell
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|pair| match pair.as_list()? {
                [start, stop] => Some([start.as_float()?, stop.as_float()?]),
                _ => None,
            })
            .collect())
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let description = r.text("description");
        let table = r.table();
        let mut table = r.complete(table)?;
        if let Some(d) = description {
            table.set_description(d);
        }
        Ok(Box::new(Self { table }))
    }
}

impl Container for Units {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn name(&self) -> &str {
        self.table.name()
    }

    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        self.table.field(name)
    }

    fn as_table(&self) -> Option<&DynamicTable> {
        Some(&self.table)
    }
}
