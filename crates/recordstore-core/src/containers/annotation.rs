use std::borrow::Cow;

use crate::{
    builder::NdArray,
    container::{Container, FieldReader, FieldRef, ValidationError},
};

use super::series::{
    DEFAULT_CONVERSION, DEFAULT_RESOLUTION, NO_COMMENTS, NO_DESCRIPTION, Series, Timing,
    TimeSeriesParams, series_field,
};

/// Time-stamped text notes about an experiment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationSeries {
    name: String,
    description: String,
    comments: String,
    times: Vec<f64>,
    texts: Vec<String>,
}

impl AnnotationSeries {
    /// Schema type name.
    pub const TYPE: &'static str = "AnnotationSeries";
    /// Unit recorded for annotation data.
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

    /// Series pre-filled with parallel `times` and `texts`.
    pub fn with_annotations(
        name: impl Into<String>,
        times: Vec<f64>,
        texts: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let mut series = Self::new(name);
        if times.len() != texts.len() {
            ValidationError::check(
                Self::TYPE,
                &series.name,
                vec![format!("{} timestamps for {} annotations", times.len(), texts.len())],
            )?;
        }
        series.times = times;
        series.texts = texts;
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

    /// Record `text` at `time`.
    pub fn add_annotation(&mut self, time: f64, text: impl Into<String>) {
        self.times.push(time);
        self.texts.push(text.into());
    }

    /// `(time, text)` pairs in insertion order.
    pub fn annotations(&self) -> impl Iterator<Item = (f64, &str)> {
        self.times
            .iter()
            .copied()
            .zip(self.texts.iter().map(String::as_str))
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let params = TimeSeriesParams::read(&mut r);
        let parts = params.and_then(|p| {
            let texts = if p.data.data().is_empty() {
                Some(Vec::new())
            } else {
                p.data.as_texts().map(<[String]>::to_vec)
            };
            match (texts, p.timing.clone()) {
                (Some(texts), Timing::Timestamps(times)) => Some((p, texts, times)),
                _ => None,
            }
        });
        if parts.is_none() {
            r.problem("annotations need text data and timestamps");
        }
        let (p, texts, times) = r.complete(parts)?;
        Ok(Box::new(
            Self::with_annotations(p.name, times, texts)?
                .with_description(p.description)
                .with_comments(p.comments),
        ))
    }
}

impl Series for AnnotationSeries {
    fn description(&self) -> &str {
        &self.description
    }

    fn comments(&self) -> &str {
        &self.comments
    }

    fn data(&self) -> Cow<'_, NdArray> {
        Cow::Owned(NdArray::from_texts(self.texts.clone()))
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
        Cow::Owned(Timing::Timestamps(self.times.clone()))
    }
}

impl Container for AnnotationSeries {
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
    fn annotations_keep_times_and_texts_aligned() {
        let mut notes = AnnotationSeries::new("notes");
        notes.add_annotation(0.5, "lights on");
        notes.add_annotation(2.0, "reward");
        let pairs: Vec<_> = notes.annotations().collect();
        assert_eq!(pairs, [(0.5, "lights on"), (2.0, "reward")]);
        assert_eq!(notes.num_samples(), 2);
        assert_eq!(notes.timestamps(), Some(vec![0.5, 2.0]));

        let err = AnnotationSeries::with_annotations("bad", vec![1.0], vec![]).unwrap_err();
        assert_eq!(err.type_name(), "AnnotationSeries");
    }
}
