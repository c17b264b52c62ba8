use std::borrow::Cow;

use snafu::prelude::*;

use crate::{
    builder::{NdArray, Value},
    container::{Container, FieldReader, FieldRef, ValidationError},
    table::{DynamicTable, TableError, TableFullSnafu, TableResult},
};

use super::{
    series::{Series, TimeSeriesParams, Timing, series_field},
    table::insert_declaring,
};

const BANDS_NAME: &str = "bands";
const BANDS_DESCRIPTION: &str = "data about the frequency bands that the signal was decomposed into";

/// One frequency band of a [`DecompositionSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct BandParams {
    /// Band label, such as `theta`.
    pub name: Option<String>,
    /// Low and high limits of the band in Hz.
    pub limits: [f64; 2],
    /// Mean of the Gaussian filter, in Hz.
    pub mean: Option<f64>,
    /// Standard deviation of the Gaussian filter, in Hz.
    pub stdev: Option<f64>,
}

impl BandParams {
    /// Band with only its limits.
    pub fn new(limits: [f64; 2]) -> Self {
        Self {
            name: None,
            limits,
            mean: None,
            stdev: None,
        }
    }

    /// Set the label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the Gaussian filter parameters.
    pub fn gaussian(mut self, mean: f64, stdev: f64) -> Self {
        self.mean = Some(mean);
        self.stdev = Some(stdev);
        self
    }

    fn row(&self) -> Vec<(&'static str, Value)> {
        let mut row = vec![("band_limits", Value::from(self.limits))];
        if let Some(name) = &self.name {
            row.push(("band_name", Value::from(name.as_str())));
        }
        if let Some(mean) = self.mean {
            row.push(("band_mean", Value::from(mean)));
        }
        if let Some(stdev) = self.stdev {
            row.push(("band_stdev", Value::from(stdev)));
        }
        row
    }
}

/// Spectral analysis of a series: `data` is time by channel by band.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionSeries {
    params: TimeSeriesParams,
    metric: String,
    bands: DynamicTable,
    source_timeseries: Option<String>,
}

impl DecompositionSeries {
    /// Schema type name.
    pub const TYPE: &'static str = "DecompositionSeries";
    /// Unit used when the caller does not name one.
    pub const DEFAULT_UNIT: &'static str = "no unit";

    /// Validate `params` and build a series measuring `metric` (for example
    /// `amplitude` or `power`) with no bands yet.
    pub fn new(
        params: TimeSeriesParams,
        metric: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::from_parts(
            params,
            metric.into(),
            DynamicTable::new(BANDS_NAME, BANDS_DESCRIPTION),
            None,
        )
    }

    fn from_parts(
        params: TimeSeriesParams,
        metric: String,
        bands: DynamicTable,
        source_timeseries: Option<String>,
    ) -> Result<Self, ValidationError> {
        let mut problems = params.problems();
        match params.data.shape() {
            [_, _, n] if bands.len() <= *n => {}
            [_, _, n] => problems.push(format!("{n} bands in data, {} in table", bands.len())),
            shape => problems.push(format!("data must be three-dimensional, got {shape:?}")),
        }
        if metric.is_empty() {
            problems.push("metric must not be empty".to_string());
        }
        ValidationError::check(Self::TYPE, &params.name, problems)?;
        Ok(Self {
            params,
            metric,
            bands,
            source_timeseries,
        })
    }

    /// Link the series this decomposition was computed from, by absolute path.
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source_timeseries = Some(path.into());
        self
    }

    /// The measured quantity.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Band table.
    pub fn bands(&self) -> &DynamicTable {
        &self.bands
    }

    /// Path of the source series, if linked.
    pub fn source_timeseries(&self) -> Option<&str> {
        self.source_timeseries.as_deref()
    }

    /// Number of bands `data` holds along its last axis.
    pub fn band_capacity(&self) -> usize {
        self.params.data.shape().get(2).copied().unwrap_or(0)
    }

    /// Append a band. The first band decides which optional columns exist.
    ///
    /// # Errors
    ///
    /// [`TableError::TableFull`] once every band of `data` is described, or
    /// any row error from the band table.
    pub fn add_band(&mut self, band: BandParams) -> TableResult<i64> {
        let capacity = self.band_capacity();
        ensure!(
            self.bands.len() < capacity,
            TableFullSnafu {
                table: self.bands.name(),
                capacity,
            }
        );
        let row = band.row();
        let names: Vec<&'static str> = row.iter().map(|(name, _)| *name).collect();
        insert_declaring(
            &mut self.bands,
            |t| {
                names.into_iter().try_for_each(|column| {
                    let doc = match column {
                        "band_name" => "name of the band",
                        "band_limits" => "low and high limit of each band in Hz",
                        "band_mean" => "mean of Gaussian filters, in Hz",
                        _ => "standard deviation of Gaussian filters, in Hz",
                    };
                    t.add_column(column, doc, false, None)
                })
            },
            |t| t.add_row(None, row),
        )
    }

    pub(crate) fn read(mut r: FieldReader) -> Result<Box<dyn Container>, ValidationError> {
        let params = TimeSeriesParams::read(&mut r);
        let metric = r.text("metric");
        let metric = r.require("metric", metric);
        let bands = if r.contains(BANDS_NAME) {
            r.child::<DynamicTable>(BANDS_NAME)
        } else {
            Some(DynamicTable::new(BANDS_NAME, BANDS_DESCRIPTION))
        };
        let source = if r.contains("source_timeseries") {
            r.link("source_timeseries")
        } else {
            None
        };
        let parts = match (params, metric, bands) {
            (Some(p), Some(m), Some(b)) => Some((p, m, b)),
            _ => None,
        };
        let (params, metric, bands) = r.complete(parts)?;
        Ok(Box::new(Self::from_parts(params, metric, bands, source)?))
    }
}

impl Series for DecompositionSeries {
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

impl Container for DecompositionSeries {
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
            "metric" => Some(FieldRef::array(NdArray::scalar_text(&self.metric))),
            "bands" => Some(FieldRef::Group(&self.bands)),
            "source_timeseries" => self.source_timeseries.clone().map(FieldRef::Link),
            _ => series_field(self, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DType;
    use crate::mapper::ObjectMapper;
    use crate::schema::TypeMap;

    fn power() -> DecompositionSeries {
        let params = TimeSeriesParams::new(
            "lfp_power",
            NdArray::empty_rows(DType::Float, &[4, 3]),
            DecompositionSeries::DEFAULT_UNIT,
            Timing::Rate {
                starting_time: 0.0,
                rate: 100.0,
            },
        );
        DecompositionSeries::new(params, "power").unwrap()
    }

    #[test]
    fn first_band_declares_columns() {
        let mut d = power();
        d.add_band(BandParams::new([4.0, 8.0]).name("theta").gaussian(6.0, 1.0))
            .unwrap();
        d.add_band(BandParams::new([8.0, 12.0]).name("alpha").gaussian(10.0, 1.0))
            .unwrap();
        let names: Vec<_> = d.bands().colnames().collect();
        assert_eq!(names, ["band_limits", "band_name", "band_mean", "band_stdev"]);
        assert_eq!(d.bands().len(), 2);
        assert_eq!(
            d.bands().get_row(1).unwrap().get("band_limits"),
            Some(Value::from(vec![8.0, 12.0]))
        );

        let missing = d.add_band(BandParams::new([30.0, 80.0]));
        assert!(matches!(missing, Err(TableError::MissingColumnValue { .. })));
        assert_eq!(d.bands().len(), 2);
    }

    #[test]
    fn bands_stop_at_the_band_axis_and_round_trip() {
        let params = TimeSeriesParams::new(
            "power",
            NdArray::empty_rows(DType::Float, &[2, 1]),
            DecompositionSeries::DEFAULT_UNIT,
            Timing::Timestamps(vec![]),
        );
        let mut d = DecompositionSeries::new(params, "power").unwrap();
        d.add_band(BandParams::new([4.0, 8.0]).name("theta")).unwrap();
        let full = d.add_band(BandParams::new([8.0, 12.0]).name("alpha"));
        assert!(matches!(full, Err(TableError::TableFull { capacity: 1, .. })));
        assert_eq!(d.bands().len(), 1);

        let map = TypeMap::core();
        let mapper = ObjectMapper::new(&map);
        let back = mapper
            .from_builder(&mapper.to_builder(&d).unwrap(), None)
            .unwrap();
        let back = back.downcast_ref::<DecompositionSeries>().unwrap();
        assert_eq!(back.bands().len(), 1);
        assert_eq!(
            back.bands().get_row(0).unwrap().get("band_name"),
            Some(Value::from("theta"))
        );
        assert_eq!(back.data().shape(), &[0, 2, 1]);

        let mut partial = power();
        partial.add_band(BandParams::new([4.0, 8.0])).unwrap();
        let back = mapper
            .from_builder(&mapper.to_builder(&partial).unwrap(), None)
            .unwrap();
        let back = back.downcast_ref::<DecompositionSeries>().unwrap();
        assert_eq!(back.bands().len(), 1);
        assert_eq!(back.band_capacity(), 3);
    }

    #[test]
    fn data_must_be_three_dimensional() {
        let params = TimeSeriesParams::new(
            "flat",
            NdArray::from_floats(vec![1.0]),
            "no unit",
            Timing::Timestamps(vec![0.0]),
        );
        assert!(DecompositionSeries::new(params, "power").is_err());
        assert_eq!(power().with_source("/acquisition/lfp").source_timeseries(), Some("/acquisition/lfp"));
    }
}
