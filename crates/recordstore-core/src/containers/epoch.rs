//! Labelled time intervals, such as the experimental epochs of a file.

use snafu::prelude::*;

use crate::{
    builder::Value,
    container::{Container, FieldReader, FieldRef, ValidationError},
    table::{DynamicTable, TableResult, UnknownColumnSnafu},
};

use super::{
    series::{Series, Timing},
    table::insert_declaring,
};

/// Column layout of an interval table: (name, description, indexed).
const INTERVAL_COLUMNS: [(&str, &str, bool); 5] = [
    ("start_time", "start time of the interval in seconds", false),
    ("stop_time", "stop time of the interval in seconds", false),
    ("tags", "user-defined tags for the interval", true),
    ("timeseries", "paths of the series the interval covers", true),
    (
        "timeseries_samples",
        "first sample and sample count of each covered series",
        true,
    ),
];

/// The samples of one series that fall inside an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpan {
    /// Absolute store path of the series.
    pub path: String,
    /// Index of the first sample at or after the interval start.
    pub idx_start: i64,
    /// Number of samples before the interval stop.
    pub count: i64,
}

impl SeriesSpan {
    /// Span of the samples of `series` in `[start, stop)`.
    pub fn covering(path: impl Into<String>, series: &dyn Series, start: f64, stop: f64) -> Self {
        let index = |time: f64| -> usize {
            match series.timing().as_ref() {
                Timing::Timestamps(ts) => ts.partition_point(|t| *t < time),
                Timing::Rate {
                    starting_time,
                    rate,
                } => {
                    let first = ((time - starting_time) * rate).ceil().max(0.0) as usize;
                    first.min(series.num_samples())
                }
            }
        };
        let first = index(start);
        let last = index(stop).max(first);
        Self {
            path: path.into(),
            idx_start: first as i64,
            count: (last - first) as i64,
        }
    }
}

/// Input of [`TimeIntervals::add_interval`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalParams {
    /// Row identifier; auto-assigned when `None`.
    pub id: Option<i64>,
    /// Start in seconds.
    pub start_time: f64,
    /// Stop in seconds.
    pub stop_time: f64,
    /// Free-form labels; may be empty.
    pub tags: Vec<String>,
    /// Series sampled during the interval.
    pub timeseries: Vec<SeriesSpan>,
}

impl IntervalParams {
    /// Interval with no tags and no series.
    pub fn new(start_time: f64, stop_time: f64) -> Self {
        Self {
            start_time,
            stop_time,
            ..Self::default()
        }
    }

    /// Set the tags.
    pub fn tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the covered series.
    pub fn timeseries(mut self, spans: Vec<SeriesSpan>) -> Self {
        self.timeseries = spans;
        self
    }

    fn row(&self) -> [(&'static str, Value); 5] {
        let paths: Vec<Value> = self.timeseries.iter().map(|s| s.path.clone().into()).collect();
        let samples: Vec<Value> = self
            .timeseries
            .iter()
            .map(|s| Value::from([s.idx_start, s.count]))
            .collect();
        [
            ("start_time", self.start_time.into()),
            ("stop_time", self.stop_time.into()),
            ("tags", self.tags.clone().into()),
            ("timeseries", Value::List(paths)),
            ("timeseries_samples", Value::List(samples)),
        ]
    }
}

/// A table of time intervals with tags and the series they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIntervals {
    table: DynamicTable,
}

impl TimeIntervals {
    /// Schema type name.
    pub const TYPE: &'static str = "TimeIntervals";
    /// Group name of the epoch table of a file.
    pub const EPOCHS: &'static str = "epochs";

    /// Empty interval table.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            table: DynamicTable::new(name, description),
        }
    }

    /// Rename the table.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.table.set_name(name);
    }

    /// Backing table.
    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether there are no intervals.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Append an interval. The first interval declares every column.
    pub fn add_interval(&mut self, interval: IntervalParams) -> TableResult<i64> {
        let row = interval.row();
        insert_declaring(
            &mut self.table,
            |t| {
                INTERVAL_COLUMNS
                    .into_iter()
                    .try_for_each(|(name, doc, indexed)| t.add_column(name, doc, indexed, None))
            },
            |t| t.add_row(interval.id, row),
        )
    }

    fn cell(&self, index: usize, column: &str) -> TableResult<Value> {
        let row = self.table.get_row(index)?;
        row.get(column).context(UnknownColumnSnafu {
            table: self.table.name(),
            column,
        })
    }

    /// Start and stop of interval `index`.
    pub fn interval_times(&self, index: usize) -> TableResult<(f64, f64)> {
        let start = self.cell(index, "start_time")?.as_float().unwrap_or(f64::NAN);
        let stop = self.cell(index, "stop_time")?.as_float().unwrap_or(f64::NAN);
        Ok((start, stop))
    }

    /// Tags of interval `index`.
    pub fn interval_tags(&self, index: usize) -> TableResult<Vec<String>> {
        let cell = self.cell(index, "tags")?;
        Ok(cell
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|t| t.as_text().map(str::to_string))
            .collect())
    }

    /// Series covered by interval `index`.
    pub fn interval_timeseries(&self, index: usize) -> TableResult<Vec<SeriesSpan>> {
        let paths = self.cell(index, "timeseries")?;
        let samples = self.cell(index, "timeseries_samples")?;
        let paths = paths.as_list().unwrap_or_default();
        let samples = samples.as_list().unwrap_or_default();
        Ok(paths
            .iter()
            .zip(samples)
            .filter_map(|(path, pair)| match pair.as_list()? {
                [idx_start, count] => Some(SeriesSpan {
                    path: path.as_text()?.to_string(),
                    idx_start: idx_start.as_int()?,
                    count: count.as_int()?,
                }),
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

impl Container for TimeIntervals {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NdArray;
    use crate::containers::{TimeSeries, TimeSeriesParams};

    fn sampled(timing: Timing, samples: usize) -> TimeSeries {
        TimeSeries::new(TimeSeriesParams::new(
            "speed",
            NdArray::from_floats(vec![0.0; samples]),
            "m/s",
            timing,
        ))
        .unwrap()
    }

    #[test]
    fn spans_count_samples_in_the_half_open_interval() {
        let stamped = sampled(Timing::Timestamps(vec![0.0, 0.5, 1.0, 1.5, 2.0]), 5);
        let span = SeriesSpan::covering("/acquisition/speed", &stamped, 0.5, 1.5);
        assert_eq!((span.idx_start, span.count), (1, 2));

        let regular = sampled(
            Timing::Rate {
                starting_time: 1.0,
                rate: 10.0,
            },
            20,
        );
        let span = SeriesSpan::covering("/acquisition/speed", &regular, 2.0, 5.0);
        assert_eq!((span.idx_start, span.count), (10, 10));
        let reversed = SeriesSpan::covering("/acquisition/speed", &regular, 2.0, 1.0);
        assert_eq!(reversed.count, 0);
    }

    #[test]
    fn rows_keep_tags_and_series() {
        let series = sampled(Timing::Timestamps(vec![0.0, 0.5, 1.0]), 3);
        let mut epochs = TimeIntervals::new(TimeIntervals::EPOCHS, "experimental epochs");
        epochs.add_interval(IntervalParams::new(0.2, 0.25)).unwrap();
        epochs
            .add_interval(
                IntervalParams::new(0.3, 1.0)
                    .tags(["fizz", "buzz"])
                    .timeseries(vec![SeriesSpan::covering("/acquisition/speed", &series, 0.3, 1.0)]),
            )
            .unwrap();

        assert_eq!(epochs.len(), 2);
        assert_eq!(epochs.interval_times(1).unwrap(), (0.3, 1.0));
        assert!(epochs.interval_tags(0).unwrap().is_empty());
        assert_eq!(epochs.interval_tags(1).unwrap(), ["fizz", "buzz"]);
        assert_eq!(
            epochs.interval_timeseries(1).unwrap(),
            vec![SeriesSpan {
                path: "/acquisition/speed".to_string(),
                idx_start: 1,
                count: 1,
            }]
        );
        assert!(epochs.interval_timeseries(0).unwrap().is_empty());
        epochs.table().check_consistency().unwrap();
    }
}
