use std::borrow::Cow;

use crate::{
    builder::NdArray,
    container::{Container, FieldReader, FieldRef, ValidationError},
};

use super::series::{
    DEFAULT_CONVERSION, DEFAULT_RESOLUTION, NO_COMMENTS, NO_DESCRIPTION, Series, Timing,
    TimeSeriesParams, series_field,
};

/// Start and stop times of repeated events.
///
/// Each event contributes two samples: `+1` at its start and `-1` at its
/// stop. Other positive or negative codes may mark distinct event kinds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntervalSeries {
    name: String,
    description: String,
    comments: String,
    data: Vec<i64>,
    timestamps: Vec<f64>,
}

impl IntervalSeries {
    /// Schema type name.
    pub const TYPE: &'static str = "IntervalSeries";
    /// Unit recorded for interval data.
    pub const UNIT: &'static str = "n/a";

    /// Empty series.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: NO_DESCRIPTION.to_string(),
            comments: NO_COMMENTS.to_string(),
            ..Self::default()
        }
    }

    /// Series from parallel codes and timestamps.
    pub fn with_samples(
        name: impl Into<String>,
        data: Vec<i64>,
        timestamps: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        let mut series = Self::new(name);
        let mut problems = Vec::new();
        if data.len() != timestamps.len() {
            problems.push(format!(
                "{} timestamps for {} samples",
                timestamps.len(),
                data.len()
            ));
        }
        if data.contains(&0) {
            problems.push("interval codes must be non-zero".to_string());
        }
        ValidationError::check(Self::TYPE, &series.name, problems)?;
        series.data = data;
        series.timestamps = timestamps;
        Ok(series)
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the comments.
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    /// Record an interval from `start` to `stop`.
    pub fn add_interval(&mut self, start: f64, stop: f64) {
        self.timestamps.extend([start, stop]);
        self.data.extend([1, -1]);
    }

    /// Interval codes.
    pub fn codes(&self) -> &[i64] {
        &self.data
    }

    /// Sample times.
    pub fn times(&self) -> &[f64] {
        &self.timestamps
    }

    /// `(start, stop)` pairs of `+1`/`-1` intervals, in order.
    pub fn intervals(&self) -> Vec<(f64, f64)> {
        let mut open = None;
        let mut out = Vec::new();
        for (&code, &t) in self.data.iter().zip(&self.timestamps) {
            match code {
                c if c > 0 => open = Some(t),
                _ => {
                    if let Some(start) = open.take() {
                        out.push((start, t));
                    }
                }
            }
        }
        out
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let params = TimeSeriesParams::read(&mut r);
        let parts = params.and_then(|p| {
            let codes = if p.data.data().is_empty() {
                Some(Vec::new())
            } else {
                p.data.as_ints().map(<[i64]>::to_vec)
            };
            match (codes, p.timing.clone()) {
                (Some(codes), Timing::Timestamps(times)) => Some((p, codes, times)),
                _ => None,
            }
        });
        if parts.is_none() {
            r.problem("intervals need integer data and timestamps");
        }
        let (p, codes, times) = r.complete(parts)?;
        Ok(Box::new(
            Self::with_samples(p.name, codes, times)?
                .with_description(p.description)
                .with_comments(p.comments),
        ))
    }
}

impl Series for IntervalSeries {
    fn description(&self) -> &str {
        &self.description
    }

    fn comments(&self) -> &str {
        &self.comments
    }

    fn data(&self) -> Cow<'_, NdArray> {
        Cow::Owned(NdArray::from_ints(self.data.clone()))
    }

    fn unit(&self) -> &str {
        Self::UNIT
    }

    fn conversion(&self) -> f64 {
        DEFAULT_CONVERSION
    }

    fn resolution(&self) -> f64 {
        DEFAULT_RESOLUTION
    }

    fn timing(&self) -> Cow<'_, Timing> {
        Cow::Owned(Timing::Timestamps(self.timestamps.clone()))
    }
}

impl Container for IntervalSeries {
    fn type_name(&self) -> &str {
        Self::TYPE
    }

    fn as_series(&self) -> Option<&dyn Series> {
        Some(self)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        series_field(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_interval_appends_start_and_stop() {
        let mut trials = IntervalSeries::new("trials");
        trials.add_interval(1.0, 2.5);
        trials.add_interval(4.0, 6.0);
        assert_eq!(trials.codes(), &[1, -1, 1, -1]);
        assert_eq!(trials.timestamps(), Some(vec![1.0, 2.5, 4.0, 6.0]));
        assert_eq!(trials.intervals(), vec![(1.0, 2.5), (4.0, 6.0)]);
        assert_eq!(trials.data().as_ints(), Some(&[1, -1, 1, -1][..]));
    }

    #[test]
    fn zero_codes_are_rejected() {
        assert!(IntervalSeries::with_samples("x", vec![1, 0], vec![0.0, 1.0]).is_err());
    }
}
