//! Time-indexed measurement series.

use std::borrow::Cow;

use crate::{
    builder::NdArray,
    container::{Container, FieldReader, FieldRef, ValidationError},
};

/// Default `description` of a series.
pub const NO_DESCRIPTION: &str = "no description";
/// Default `comments` of a series.
pub const NO_COMMENTS: &str = "no comments";
/// Default `conversion` factor.
pub const DEFAULT_CONVERSION: f64 = 1.0;
/// Default `resolution` (unknown).
pub const DEFAULT_RESOLUTION: f64 = -1.0;

/// How samples are placed in time.
#[derive(Debug, Clone, PartialEq)]
pub enum Timing {
    /// One timestamp (seconds) per sample.
    Timestamps(Vec<f64>),
    /// Regular sampling.
    Rate {
        /// Time of the first sample in seconds.
        starting_time: f64,
        /// Sampling rate in Hz.
        rate: f64,
    },
}

impl Default for Timing {
    fn default() -> Self {
        Timing::Timestamps(Vec::new())
    }
}

/// Read accessors shared by every series type.
///
/// Specialized series may store their buffers differently; they expose them
/// through these accessors so the mapper sees one layout.
pub trait Series: Container {
    /// Description.
    fn description(&self) -> &str;
    /// Comments.
    fn comments(&self) -> &str;
    /// Sample data; the first axis is time.
    fn data(&self) -> Cow<'_, NdArray>;
    /// Unit of `data` after conversion.
    fn unit(&self) -> &str;
    /// Factor converting stored values to `unit`.
    fn conversion(&self) -> f64;
    /// Smallest meaningful difference between values, `-1.0` if unknown.
    fn resolution(&self) -> f64;
    /// Sample placement.
    fn timing(&self) -> Cow<'_, Timing>;

    /// Timestamps, when samples are individually timed.
    fn timestamps(&self) -> Option<Vec<f64>> {
        match self.timing().into_owned() {
            Timing::Timestamps(t) => Some(t),
            Timing::Rate { .. } => None,
        }
    }

    /// Number of samples.
    fn num_samples(&self) -> usize {
        let data = self.data();
        if data.is_scalar() { 1 } else { data.rows() }
    }
}

/// Field lookup common to every series.
pub(crate) fn series_field<'a, S: Series + ?Sized>(s: &'a S, name: &str) -> Option<FieldRef<'a>> {
    match name {
        "description" => Some(FieldRef::text(s.description())),
        "comments" => Some(FieldRef::text(s.comments())),
        "data" => Some(FieldRef::Dataset(s.data())),
        "unit" => Some(FieldRef::text(s.unit())),
        "conversion" => Some(FieldRef::float(s.conversion())),
        "resolution" => Some(FieldRef::float(s.resolution())),
        "timestamps" => match s.timing() {
            Cow::Borrowed(Timing::Timestamps(t)) => {
                Some(FieldRef::array(NdArray::from_floats(t.clone())))
            }
            Cow::Owned(Timing::Timestamps(t)) => Some(FieldRef::array(NdArray::from_floats(t))),
            _ => None,
        },
        "starting_time" => match s.timing().as_ref() {
            Timing::Rate { starting_time, .. } => {
                Some(FieldRef::array(NdArray::scalar_float(*starting_time)))
            }
            Timing::Timestamps(_) => None,
        },
        "rate" => match s.timing().as_ref() {
            Timing::Rate { rate, .. } => Some(FieldRef::float(*rate)),
            Timing::Timestamps(_) => None,
        },
        _ => None,
    }
}

/// Validated constructor input of a [`TimeSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesParams {
    /// Group name.
    pub name: String,
    /// Sample data; the first axis is time.
    pub data: NdArray,
    /// Unit of `data` after conversion.
    pub unit: String,
    /// Sample placement.
    pub timing: Timing,
    /// Description.
    pub description: String,
    /// Comments.
    pub comments: String,
    /// Conversion factor.
    pub conversion: f64,
    /// Resolution, `-1.0` if unknown.
    pub resolution: f64,
}

impl TimeSeriesParams {
    /// Parameters with defaults for every optional field.
    pub fn new(
        name: impl Into<String>,
        data: NdArray,
        unit: impl Into<String>,
        timing: Timing,
    ) -> Self {
        Self {
            name: name.into(),
            data,
            unit: unit.into(),
            timing,
            description: NO_DESCRIPTION.to_string(),
            comments: NO_COMMENTS.to_string(),
            conversion: DEFAULT_CONVERSION,
            resolution: DEFAULT_RESOLUTION,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the comments.
    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    /// Set the conversion factor.
    pub fn conversion(mut self, conversion: f64) -> Self {
        self.conversion = conversion;
        self
    }

    /// Set the resolution.
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Pull series fields out of a reader; `None` if a required one is missing.
    pub(crate) fn read(r: &mut FieldReader) -> Option<Self> {
        let name = r.name().to_string();
        let data = r.array("data");
        let data = r.require("data", data);
        let unit = r.text("unit").unwrap_or_else(|| "unknown".to_string());
        let timing = read_timing(r);
        let mut params = Self::new(name, data?, unit, timing?);
        if let Some(d) = r.text("description") {
            params.description = d;
        }
        if let Some(c) = r.text("comments") {
            params.comments = c;
        }
        if let Some(c) = r.float("conversion") {
            params.conversion = c;
        }
        if let Some(res) = r.float("resolution") {
            params.resolution = res;
        }
        Some(params)
    }

    /// Every problem with these parameters.
    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.data.is_scalar() {
            problems.push("data must have a time axis".to_string());
        }
        match &self.timing {
            Timing::Timestamps(t) if !self.data.is_scalar() && t.len() != self.data.rows() => {
                problems.push(format!(
                    "{} timestamps for {} samples",
                    t.len(),
                    self.data.rows()
                ));
            }
            Timing::Rate { rate, .. } if !(rate.is_finite() && *rate > 0.0) => {
                problems.push(format!("rate must be positive, got {rate}"));
            }
            Timing::Rate { starting_time, .. } if !starting_time.is_finite() => {
                problems.push(format!("starting_time must be finite, got {starting_time}"));
            }
            _ => {}
        }
        if !self.conversion.is_finite() {
            problems.push(format!("conversion must be finite, got {}", self.conversion));
        }
        problems
    }
}

/// Timestamps, or `starting_time` plus `rate`.
pub(crate) fn read_timing(r: &mut FieldReader) -> Option<Timing> {
    if r.contains("timestamps") {
        let ts = r.array("timestamps")?;
        let floats = ts.to_floats();
        if floats.is_none() {
            r.problem("timestamps must be numeric");
        }
        return floats.map(Timing::Timestamps);
    }
    let starting_time = r.float("starting_time");
    let rate = r.float("rate");
    match (starting_time, rate) {
        (Some(starting_time), Some(rate)) => Some(Timing::Rate {
            starting_time,
            rate,
        }),
        _ => {
            r.problem("either timestamps or starting_time and rate are required");
            None
        }
    }
}

/// A generic time-indexed measurement series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    params: TimeSeriesParams,
}

impl TimeSeries {
    /// Schema type name.
    pub const TYPE: &'static str = "TimeSeries";

    /// Validate `params` and build the series.
    pub fn new(params: TimeSeriesParams) -> Result<Self, ValidationError> {
        ValidationError::check(Self::TYPE, &params.name, params.problems())?;
        Ok(Self { params })
    }

    /// The parameters this series was built from.
    pub fn params(&self) -> &TimeSeriesParams {
        &self.params
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let params = TimeSeriesParams::read(&mut r);
        let params = r.complete(params)?;
        Ok(Box::new(Self::new(params)?))
    }
}

impl Series for TimeSeries {
    fn description(&self) -> &str {
        &self.params.description
    }

    fn comments(&self) -> &str {
        &self.params.comments
    }

    fn data(&self) -> Cow<'_, NdArray> {
        Cow::Borrowed(&self.params.data)
    }

    fn unit(&self) -> &str {
        &self.params.unit
    }

    fn conversion(&self) -> f64 {
        self.params.conversion
    }

    fn resolution(&self) -> f64 {
        self.params.resolution
    }

    fn timing(&self) -> Cow<'_, Timing> {
        Cow::Borrowed(&self.params.timing)
    }
}

impl Container for TimeSeries {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn as_series(&self) -> Option<&dyn Series> {
        Some(self)
    }

    fn name(&self) -> &str {
        &self.params.name
    }

    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        series_field(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_must_match_samples() {
        let params = TimeSeriesParams::new(
            "raw",
            NdArray::from_floats(vec![1.0, 2.0, 3.0]),
            "volts",
            Timing::Timestamps(vec![0.0, 0.1]),
        );
        let err = TimeSeries::new(params).unwrap_err();
        assert_eq!(err.problems().len(), 1);
    }

    #[test]
    fn rate_timing_exposes_starting_time_and_rate() {
        let ts = TimeSeries::new(
            TimeSeriesParams::new(
                "raw",
                NdArray::from_ints(vec![1, 2]),
                "volts",
                Timing::Rate {
                    starting_time: 0.5,
                    rate: 30.0,
                },
            )
            .description("treadmill speed"),
        )
        .unwrap();
        assert!(matches!(ts.field("rate"), Some(FieldRef::Attribute(_))));
        assert!(ts.field("timestamps").is_none());
        assert_eq!(ts.num_samples(), 2);
        assert_eq!(ts.description(), "treadmill speed");

        let bad = TimeSeriesParams::new(
            "raw",
            NdArray::from_ints(vec![1]),
            "volts",
            Timing::Rate {
                starting_time: 0.0,
                rate: 0.0,
            },
        );
        assert!(TimeSeries::new(bad).is_err());
    }
}
