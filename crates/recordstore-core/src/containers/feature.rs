use std::borrow::Cow;

use crate::{
    builder::{DType, NdArray, Value},
    container::{Container, FieldReader, FieldRef, ValidationError},
};

use super::series::{Series, TimeSeriesParams, Timing, series_field};

/// Abstract features (for example stimulus descriptors) sampled over time.
///
/// `data` is two-dimensional: one row per timestamp, one column per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractFeatureSeries {
    params: TimeSeriesParams,
    features: Vec<String>,
    feature_units: Vec<String>,
}

impl AbstractFeatureSeries {
    /// Schema type name.
    pub const TYPE: &'static str = "AbstractFeatureSeries";
    /// Unit recorded for feature data; the real units live in `feature_units`.
    pub const UNIT: &'static str = "see 'feature_units'";

    /// Empty series describing `features`, timed by timestamps.
    pub fn new(
        name: impl Into<String>,
        features: Vec<String>,
        feature_units: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let data = NdArray::empty_rows(DType::Float, &[features.len()]);
        let params = TimeSeriesParams::new(name, data, Self::UNIT, Timing::default());
        Self::from_params(params, features, feature_units)
    }

    /// Validate a fully specified series.
    pub fn from_params(
        params: TimeSeriesParams,
        features: Vec<String>,
        feature_units: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let mut problems = params.problems();
        if features.is_empty() {
            problems.push("at least one feature is required".to_string());
        }
        if !feature_units.is_empty() && feature_units.len() != features.len() {
            problems.push(format!(
                "{} feature units for {} features",
                feature_units.len(),
                features.len()
            ));
        }
        match params.data.shape() {
            [_, width] if *width == features.len() => {}
            shape => problems.push(format!(
                "data shape {shape:?} does not have one column per feature ({})",
                features.len()
            )),
        }
        ValidationError::check(Self::TYPE, &params.name, problems)?;
        Ok(Self {
            params,
            features,
            feature_units,
        })
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.params.description = description.into();
        self
    }

    /// Feature names, one per data column.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Feature units, parallel to [`Self::features`] (may be empty).
    pub fn feature_units(&self) -> &[String] {
        &self.feature_units
    }

    /// Append one row of feature values sampled at `time`.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] if `values` does not hold one value per feature or
    /// the series is timed by a sampling rate.
    pub fn add_features(&mut self, time: f64, values: Vec<f64>) -> Result<(), ValidationError> {
        let mut problems = Vec::new();
        if values.len() != self.features.len() {
            problems.push(format!(
                "{} values for {} features",
                values.len(),
                self.features.len()
            ));
        }
        if !matches!(self.params.timing, Timing::Timestamps(_)) {
            problems.push("cannot add timed rows to a rate-sampled series".to_string());
        }
        ValidationError::check(Self::TYPE, &self.params.name, problems)?;

        let row = Value::from(values);
        if let Err(e) = self.params.data.push_element(&row) {
            return ValidationError::check(Self::TYPE, &self.params.name, vec![e.to_string()]);
        }
        if let Timing::Timestamps(ts) = &mut self.params.timing {
            ts.push(time);
        }
        Ok(())
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let params = TimeSeriesParams::read(&mut r);
        let features = r.texts("features");
        let features = r.require("features", features);
        let feature_units = if r.contains("feature_units") {
            r.texts("feature_units").unwrap_or_default()
        } else {
            Vec::new()
        };
        let parts = params.zip(features);
        let (params, features) = r.complete(parts)?;
        Ok(Box::new(Self::from_params(params, features, feature_units)?))
    }
}

impl Series for AbstractFeatureSeries {
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

impl Container for AbstractFeatureSeries {
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
        match name {
            "features" => Some(FieldRef::array(NdArray::from_texts(self.features.clone()))),
            "feature_units" if !self.feature_units.is_empty() => Some(FieldRef::array(
                NdArray::from_texts(self.feature_units.clone()),
            )),
            "feature_units" => None,
            _ => series_field(self, name),
        }
    }
}
