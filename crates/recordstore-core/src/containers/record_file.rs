//! The root container of a store.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use snafu::prelude::*;

use crate::{
    builder::{NdArray, Value},
    container::{Container, FieldReader, FieldRef, ValidationError},
    storage::layout::{FORMAT_VERSION, ROOT_NAME},
    table::{DynamicTable, TableResolver, TableResult, TableSet, UnresolvedTableSnafu},
};

use super::{
    epoch::{IntervalParams, SeriesSpan, TimeIntervals},
    series::Series,
    table::{ELECTRODES_PATH, UnitParams, Units, insert_declaring},
};

/// Path of the epoch table of a file.
pub const EPOCHS_PATH: &str = "/intervals/epochs";

/// Named child containers of one collection group, in name order.
#[derive(Debug, Default)]
pub struct Collection {
    items: BTreeMap<String, Box<dyn Container>>,
}

impl Collection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`, returning the container it replaced.
    pub fn insert(&mut self, item: Box<dyn Container>) -> Option<Box<dyn Container>> {
        self.items.insert(item.name().to_string(), item)
    }

    /// Container by name.
    pub fn get(&self, name: &str) -> Option<&dyn Container> {
        self.items.get(name).map(|c| c.as_ref())
    }

    /// Container by name, as concrete type `T`.
    pub fn get_as<T: Container>(&self, name: &str) -> Option<&T> {
        self.get(name)?.downcast_ref::<T>()
    }

    /// Whether a container named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Containers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Container> {
        self.items.values().map(|c| c.as_ref())
    }

    /// Number of containers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn field(&self) -> Option<FieldRef<'_>> {
        if self.is_empty() {
            None
        } else {
            Some(FieldRef::Groups(self.iter().collect()))
        }
    }
}

impl FromIterator<Box<dyn Container>> for Collection {
    fn from_iter<I: IntoIterator<Item = Box<dyn Container>>>(iter: I) -> Self {
        let mut c = Collection::new();
        for item in iter {
            c.insert(item);
        }
        c
    }
}

/// Required session metadata of a [`RecordFile`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFileParams {
    /// Unique identifier of the file.
    pub identifier: String,
    /// Description of the recorded session.
    pub session_description: String,
    /// Start of the session; other times are relative to it.
    pub session_start_time: DateTime<FixedOffset>,
    /// Creation and modification dates, oldest first. Empty means "now".
    pub file_create_date: Vec<DateTime<FixedOffset>>,
}

impl RecordFileParams {
    /// Metadata created now.
    pub fn new(
        identifier: impl Into<String>,
        session_description: impl Into<String>,
        session_start_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            session_description: session_description.into(),
            session_start_time,
            file_create_date: Vec::new(),
        }
    }
}

/// Root container: session metadata plus the standard collection groups.
#[derive(Debug)]
pub struct RecordFile {
    identifier: String,
    session_description: String,
    session_start_time: DateTime<FixedOffset>,
    file_create_date: Vec<DateTime<FixedOffset>>,
    acquisition: Collection,
    analysis: Collection,
    processing: Collection,
    stimulus: Collection,
    stimulus_templates: Collection,
    electrodes: Option<DynamicTable>,
    units: Option<Units>,
    epochs: Option<TimeIntervals>,
}

impl RecordFile {
    /// Schema type name.
    pub const TYPE: &'static str = "RecordFile";

    /// Validate `params` and build an empty file.
    pub fn new(params: RecordFileParams) -> Result<Self, ValidationError> {
        let mut problems = Vec::new();
        if params.identifier.is_empty() {
            problems.push("identifier must not be empty".to_string());
        }
        if params.session_description.is_empty() {
            problems.push("session_description must not be empty".to_string());
        }
        ValidationError::check(Self::TYPE, ROOT_NAME, problems)?;
        let file_create_date = if params.file_create_date.is_empty() {
            vec![Utc::now().into()]
        } else {
            params.file_create_date
        };
        Ok(Self {
            identifier: params.identifier,
            session_description: params.session_description,
            session_start_time: params.session_start_time,
            file_create_date,
            acquisition: Collection::new(),
            analysis: Collection::new(),
            processing: Collection::new(),
            stimulus: Collection::new(),
            stimulus_templates: Collection::new(),
            electrodes: None,
            units: None,
            epochs: None,
        })
    }

    /// Unique identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Session description.
    pub fn session_description(&self) -> &str {
        &self.session_description
    }

    /// Session start.
    pub fn session_start_time(&self) -> DateTime<FixedOffset> {
        self.session_start_time
    }

    /// Creation and modification dates.
    pub fn file_create_date(&self) -> &[DateTime<FixedOffset>] {
        &self.file_create_date
    }

    /// Raw acquired data.
    pub fn acquisition(&self) -> &Collection {
        &self.acquisition
    }

    /// Derived results.
    pub fn analysis(&self) -> &Collection {
        &self.analysis
    }

    /// Intermediate processing results.
    pub fn processing(&self) -> &Collection {
        &self.processing
    }

    /// Presented stimuli.
    pub fn stimulus(&self) -> &Collection {
        &self.stimulus
    }

    /// Stimulus templates.
    pub fn stimulus_templates(&self) -> &Collection {
        &self.stimulus_templates
    }

    /// Electrode metadata table.
    pub fn electrodes(&self) -> Option<&DynamicTable> {
        self.electrodes.as_ref()
    }

    /// Sorted units.
    pub fn units(&self) -> Option<&Units> {
        self.units.as_ref()
    }

    /// Experimental epochs.
    pub fn epochs(&self) -> Option<&TimeIntervals> {
        self.epochs.as_ref()
    }

    fn add_to(
        collection: &mut Collection,
        group: &str,
        container: Box<dyn Container>,
    ) -> Result<(), ValidationError> {
        if collection.contains(container.name()) {
            return ValidationError::check(
                Self::TYPE,
                ROOT_NAME,
                vec![format!("{group} already holds {:?}", container.name())],
            );
        }
        collection.insert(container);
        Ok(())
    }

    /// Add raw acquired data.
    pub fn add_acquisition(&mut self, container: impl Container) -> Result<(), ValidationError> {
        Self::add_to(&mut self.acquisition, "acquisition", Box::new(container))
    }

    /// Add a derived result.
    pub fn add_analysis(&mut self, container: impl Container) -> Result<(), ValidationError> {
        Self::add_to(&mut self.analysis, "analysis", Box::new(container))
    }

    /// Add an intermediate processing result.
    pub fn add_processing(&mut self, container: impl Container) -> Result<(), ValidationError> {
        Self::add_to(&mut self.processing, "processing", Box::new(container))
    }

    /// Add a presented stimulus.
    pub fn add_stimulus(&mut self, container: impl Container) -> Result<(), ValidationError> {
        Self::add_to(&mut self.stimulus, "stimulus", Box::new(container))
    }

    /// Add a stimulus template.
    pub fn add_stimulus_template(
        &mut self,
        container: impl Container,
    ) -> Result<(), ValidationError> {
        Self::add_to(
            &mut self.stimulus_templates,
            "stimulus templates",
            Box::new(container),
        )
    }

    /// Replace the electrode table.
    pub fn set_electrodes(&mut self, mut table: DynamicTable) {
        table.set_name("electrodes");
        self.electrodes = Some(table);
    }

    /// Append an electrode row. The first row declares one column per key.
    pub fn add_electrode<I, K>(&mut self, values: I) -> TableResult<i64>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: Vec<(String, Value)> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let names: Vec<String> = values.iter().map(|(k, _)| k.clone()).collect();
        let existed = self.electrodes.is_some();
        let mut table = self.electrodes.take().unwrap_or_else(|| {
            DynamicTable::new("electrodes", "metadata about extracellular electrodes")
        });
        let inserted = insert_declaring(
            &mut table,
            |t| {
                names
                    .into_iter()
                    .try_for_each(|name| t.add_column(name, "", false, None))
            },
            |t| t.add_row(None, values),
        );
        if existed || inserted.is_ok() {
            self.electrodes = Some(table);
        }
        inserted
    }

    /// Replace the units table.
    pub fn set_units(&mut self, units: Units) {
        self.units = Some(units);
    }

    /// Append a unit, checking its electrode indices against this file's
    /// electrode table.
    pub fn add_unit(&mut self, unit: UnitParams) -> TableResult<i64> {
        let mut resolver = TableSet::new();
        if let Some(electrodes) = &self.electrodes {
            resolver = resolver.with(ELECTRODES_PATH, electrodes);
        }
        match &mut self.units {
            Some(units) => units.add_unit(unit, Some(&resolver)),
            None => {
                let mut units = Units::new(Units::NAME, "data on spike-sorted units");
                let id = units.add_unit(unit, Some(&resolver))?;
                self.units = Some(units);
                Ok(id)
            }
        }
    }

    /// Replace the epoch table.
    pub fn set_epochs(&mut self, mut epochs: TimeIntervals) {
        epochs.set_name(TimeIntervals::EPOCHS);
        self.epochs = Some(epochs);
    }

    /// Append an epoch covering the series stored at `timeseries` (absolute
    /// paths into this file's collections).
    ///
    /// # Errors
    ///
    /// [`crate::table::TableError::UnresolvedTable`] if a path does not name
    /// a series of this file, or any row error from the epoch table.
    pub fn add_epoch<S: Into<String>>(
        &mut self,
        start_time: f64,
        stop_time: f64,
        tags: impl IntoIterator<Item = S>,
        timeseries: &[&str],
    ) -> TableResult<i64> {
        let spans = timeseries
            .iter()
            .map(|path| -> TableResult<SeriesSpan> {
                let series = self.series_at(path).context(UnresolvedTableSnafu {
                    column: "timeseries",
                    target: *path,
                })?;
                Ok(SeriesSpan::covering(*path, series, start_time, stop_time))
            })
            .collect::<TableResult<Vec<_>>>()?;
        let interval = IntervalParams::new(start_time, stop_time)
            .tags(tags)
            .timeseries(spans);
        match &mut self.epochs {
            Some(epochs) => epochs.add_interval(interval),
            None => {
                let mut epochs = TimeIntervals::new(TimeIntervals::EPOCHS, "experimental epochs");
                let id = epochs.add_interval(interval)?;
                self.epochs = Some(epochs);
                Ok(id)
            }
        }
    }

    /// The series stored at an absolute path, if any.
    pub fn series_at(&self, path: &str) -> Option<&dyn Series> {
        let path = path.trim_start_matches('/');
        self.collections().into_iter().find_map(|(group, items)| {
            let name = path.strip_prefix(group)?.strip_prefix('/')?;
            items.get(name)?.as_series()
        })
    }

    fn collections(&self) -> [(&'static str, &Collection); 5] {
        [
            ("acquisition", &self.acquisition),
            ("analysis", &self.analysis),
            ("processing", &self.processing),
            ("stimulus/presentation", &self.stimulus),
            ("stimulus/templates", &self.stimulus_templates),
        ]
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let identifier = r.text("identifier");
        let identifier = r.require("identifier", identifier);
        let description = r.text("session_description");
        let description = r.require("session_description", description);
        let start = r.text("session_start_time");
        let start = r
            .require("session_start_time", start)
            .and_then(|s| parse_time(&mut r, "session_start_time", &s));
        let created = r
            .texts("file_create_date")
            .unwrap_or_default()
            .iter()
            .filter_map(|s| parse_time(&mut r, "file_create_date", s))
            .collect::<Vec<_>>();
        if let Some(version) = r.text("format_version") {
            if version != FORMAT_VERSION {
                log::warn!("reading format version {version}, expected {FORMAT_VERSION}");
            }
        }

        let acquisition = r.children("acquisition").into_iter().collect();
        let analysis = r.children("analysis").into_iter().collect();
        let processing = r.children("processing").into_iter().collect();
        let stimulus = r.children("presentation").into_iter().collect();
        let stimulus_templates = r.children("templates").into_iter().collect();
        let electrodes = if r.contains("electrodes") {
            r.child::<DynamicTable>("electrodes")
        } else {
            None
        };
        let units = if r.contains("units") {
            r.child::<Units>("units")
        } else {
            None
        };
        let epochs = if r.contains(TimeIntervals::EPOCHS) {
            r.child::<TimeIntervals>(TimeIntervals::EPOCHS)
        } else {
            None
        };

        let parts = match (identifier, description, start) {
            (Some(i), Some(d), Some(s)) => Some(RecordFileParams {
                identifier: i,
                session_description: d,
                session_start_time: s,
                file_create_date: created,
            }),
            _ => None,
        };
        let params = r.complete(parts)?;
        let mut file = Self::new(params)?;
        file.acquisition = acquisition;
        file.analysis = analysis;
        file.processing = processing;
        file.stimulus = stimulus;
        file.stimulus_templates = stimulus_templates;
        file.electrodes = electrodes;
        file.units = units;
        file.epochs = epochs;
        Ok(Box::new(file))
    }
}

fn parse_time(r: &mut FieldReader, key: &str, s: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => Some(t),
        Err(e) => {
            r.problem(format!("field {key:?}: invalid timestamp {s:?}: {e}"));
            None
        }
    }
}

fn times(ts: &[DateTime<FixedOffset>]) -> NdArray {
    NdArray::from_texts(ts.iter().map(DateTime::to_rfc3339).collect())
}

impl TableResolver for RecordFile {
    fn resolve_table(&self, path: &str) -> Option<&DynamicTable> {
        match path {
            ELECTRODES_PATH => self.electrodes.as_ref(),
            "/units" => self.units.as_ref().map(Units::table),
            EPOCHS_PATH => self.epochs.as_ref().map(TimeIntervals::table),
            _ => {
                let path = path.trim_start_matches('/');
                self.collections().into_iter().find_map(|(group, items)| {
                    let name = path.strip_prefix(group)?.strip_prefix('/')?;
                    items.get(name)?.as_table()
                })
            }
        }
    }
}

impl Container for RecordFile {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn name(&self) -> &str {
        ROOT_NAME
    }

    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        match name {
            "identifier" => Some(FieldRef::array(NdArray::scalar_text(&self.identifier))),
            "session_description" => Some(FieldRef::array(NdArray::scalar_text(
                &self.session_description,
            ))),
            "session_start_time" => Some(FieldRef::array(NdArray::scalar_text(
                self.session_start_time.to_rfc3339(),
            ))),
            "file_create_date" => Some(FieldRef::array(times(&self.file_create_date))),
            "format_version" => Some(FieldRef::array(NdArray::scalar_text(FORMAT_VERSION))),
            "acquisition" => self.acquisition.field(),
            "analysis" => self.analysis.field(),
            "processing" => self.processing.field(),
            "presentation" => self.stimulus.field(),
            "templates" => self.stimulus_templates.field(),
            "electrodes" => self
                .electrodes
                .as_ref()
                .map(|t| FieldRef::Group(t as &dyn Container)),
            "units" => self
                .units
                .as_ref()
                .map(|u| FieldRef::Group(u as &dyn Container)),
            "epochs" => self
                .epochs
                .as_ref()
                .map(|e| FieldRef::Group(e as &dyn Container)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{AnnotationSeries, IntervalSeries, TimeSeries, TimeSeriesParams, Timing};
    use crate::table::TableError;

    fn file() -> RecordFile {
        let start = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00").unwrap();
        RecordFile::new(RecordFileParams::new("session-1", "two units", start)).unwrap()
    }

    #[test]
    fn collections_reject_duplicate_names() {
        let mut f = file();
        f.add_acquisition(AnnotationSeries::new("notes")).unwrap();
        f.add_acquisition(IntervalSeries::new("trials")).unwrap();
        assert!(f.add_acquisition(IntervalSeries::new("trials")).is_err());
        let names: Vec<_> = f.acquisition().names().collect();
        assert_eq!(names, ["notes", "trials"]);
        assert!(f.acquisition().get_as::<IntervalSeries>("trials").is_some());
        assert!(f.acquisition().get_as::<IntervalSeries>("notes").is_none());
    }

    #[test]
    fn units_reference_file_electrodes() {
        let mut f = file();
        let bad = f.add_unit(UnitParams::new(vec![0.5]).electrodes(vec![0]));
        assert!(matches!(bad, Err(TableError::UnresolvedTable { .. })));
        assert!(f.units().is_none());

        f.add_electrode([("location", Value::from("CA1")), ("x", Value::from(1.5))])
            .unwrap();
        f.add_unit(UnitParams::new(vec![0.5]).electrodes(vec![0]))
            .unwrap();
        let rows = f
            .units()
            .unwrap()
            .table()
            .resolve_region("electrodes", 0, &f)
            .unwrap();
        assert_eq!(rows[0].get("location"), Some(Value::from("CA1")));
        assert!(f.resolve_table("/units").is_some());
    }

    #[test]
    fn rejected_first_electrode_leaves_no_table() {
        let mut f = file();
        let bad = f.add_electrode([("location", Value::from(vec![Value::from(1.0), Value::from("x")]))]);
        assert!(matches!(bad, Err(TableError::TypeMismatch { .. })));
        assert!(f.electrodes().is_none());
    }

    #[test]
    fn epochs_cover_file_series() {
        let mut f = file();
        let speed = TimeSeries::new(TimeSeriesParams::new(
            "speed",
            NdArray::from_floats(vec![1.0, 2.0, 3.0, 4.0]),
            "m/s",
            Timing::Timestamps(vec![0.0, 0.1, 0.2, 0.3]),
        ))
        .unwrap();
        f.add_acquisition(speed).unwrap();
        f.add_acquisition(AnnotationSeries::new("notes")).unwrap();

        f.add_epoch(0.1, 0.3, ["running"], &["/acquisition/speed", "/acquisition/notes"])
            .unwrap();
        f.add_epoch(0.3, 0.4, Vec::<String>::new(), &[]).unwrap();
        let missing = f.add_epoch(0.0, 1.0, ["x"], &["/acquisition/nothing"]);
        assert!(matches!(
            missing,
            Err(TableError::UnresolvedTable { ref target, .. }) if target == "/acquisition/nothing"
        ));

        let epochs = f.epochs().unwrap();
        assert_eq!(epochs.len(), 2);
        let spans = epochs.interval_timeseries(0).unwrap();
        assert_eq!((spans[0].idx_start, spans[0].count), (1, 2));
        assert_eq!((spans[1].idx_start, spans[1].count), (0, 0));
        assert!(epochs.interval_tags(1).unwrap().is_empty());
        assert!(f.resolve_table(EPOCHS_PATH).is_some());
        assert!(f.series_at("/acquisition/speed").is_some());
        assert!(f.series_at("/general/electrodes").is_none());
    }

    #[test]
    fn empty_identifier_is_rejected() {
        let start = DateTime::parse_from_rfc3339("2024-03-01T09:30:00Z").unwrap();
        let err = RecordFile::new(RecordFileParams::new("", "", start)).unwrap_err();
        assert_eq!(err.problems().len(), 2);
    }
}
