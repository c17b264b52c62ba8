//! The built-in `core` namespace.

use crate::{builder::DType, storage::layout::FORMAT_VERSION};

use super::{FieldSpec, Namespace, TypeLayout, TypeSpec};

/// Name of the built-in namespace.
pub const CORE_NAMESPACE: &str = "core";

/// Version of the built-in namespace.
pub const CORE_VERSION: &str = FORMAT_VERSION;

fn scalar_text(name: &str) -> FieldSpec {
    FieldSpec::dataset(name, DType::Text).shape(Vec::new())
}

fn text_vector(name: &str) -> FieldSpec {
    FieldSpec::dataset(name, DType::Text).shape(vec![None])
}

/// `data` of a series: the samples plus their unit and scaling.
fn series_data(dtype: DType, shape: Option<Vec<Option<usize>>>) -> FieldSpec {
    let mut data = FieldSpec::dataset("data", dtype)
        .required()
        .doc("data values; the first dimension is time")
        .with_attribute(FieldSpec::attribute("unit", DType::Text).default_value("unknown"))
        .with_attribute(FieldSpec::attribute("conversion", DType::Float).default_value(1.0))
        .with_attribute(FieldSpec::attribute("resolution", DType::Float).default_value(-1.0));
    if let Some(shape) = shape {
        data = data.shape(shape);
    }
    data
}

fn time_series() -> TypeSpec {
    TypeSpec::new("TimeSeries")
        .doc("general purpose time series")
        .field(
            FieldSpec::attribute("description", DType::Text)
                .default_value(crate::containers::NO_DESCRIPTION),
        )
        .field(
            FieldSpec::attribute("comments", DType::Text)
                .default_value(crate::containers::NO_COMMENTS),
        )
        .field(series_data(DType::Any, None))
        .field(
            FieldSpec::dataset("timestamps", DType::Float)
                .shape(vec![None])
                .doc("sample times in seconds")
                .with_attribute(FieldSpec::attribute("unit", DType::Text).fixed("seconds"))
                .with_attribute(FieldSpec::attribute("interval", DType::Int).fixed(1)),
        )
        .field(
            FieldSpec::dataset("starting_time", DType::Float)
                .shape(Vec::new())
                .doc("time of the first sample in seconds")
                .with_attribute(FieldSpec::attribute("rate", DType::Float).required())
                .with_attribute(FieldSpec::attribute("unit", DType::Text).fixed("seconds")),
        )
}

/// The `core` namespace: series types, tables and the root file type.
pub fn core_namespace() -> Namespace {
    let mut ns = Namespace::new(CORE_NAMESPACE, CORE_VERSION)
        .with_type(time_series())
        .with_type(
            TypeSpec::new("AnnotationSeries")
                .extends("TimeSeries")
                .doc("time-stamped text annotations")
                .field(series_data(DType::Text, Some(vec![None]))),
        )
        .with_type(
            TypeSpec::new("IntervalSeries")
                .extends("TimeSeries")
                .doc("interval starts (positive codes) and stops (negative codes)")
                .field(series_data(DType::Int, Some(vec![None]))),
        )
        .with_type(
            TypeSpec::new("AbstractFeatureSeries")
                .extends("TimeSeries")
                .doc("abstract features sampled over time")
                .field(series_data(DType::Float, Some(vec![None, None])))
                .field(text_vector("features").required())
                .field(text_vector("feature_units")),
        )
        .with_type(
            TypeSpec::new("DecompositionSeries")
                .extends("TimeSeries")
                .doc("spectral decomposition of a series: time by channel by band")
                .field(series_data(DType::Float, Some(vec![None, None, None])))
                .field(scalar_text("metric").required())
                .field(FieldSpec::group("bands", Some("DynamicTable")))
                .field(FieldSpec::link("source_timeseries", "TimeSeries")),
        )
        .with_type(
            TypeSpec::new("DynamicTable")
                .layout(TypeLayout::Table)
                .doc("columns of equal row count sharing one id column")
                .field(FieldSpec::attribute("description", DType::Text).default_value("")),
        )
        .with_type(
            TypeSpec::new("Units")
                .extends("DynamicTable")
                .doc("spike-sorted units"),
        )
        .with_type(
            TypeSpec::new("TimeIntervals")
                .extends("DynamicTable")
                .doc("labelled time intervals and the series samples they cover"),
        )
        .with_type(
            TypeSpec::new("RecordFile")
                .doc("root of a record store")
                .field(scalar_text("identifier").required())
                .field(scalar_text("session_description").required())
                .field(scalar_text("session_start_time").required())
                .field(text_vector("file_create_date").required())
                .field(scalar_text("format_version"))
                .field(FieldSpec::groups("acquisition", None))
                .field(FieldSpec::groups("analysis", None))
                .field(FieldSpec::groups("processing", None))
                .field(FieldSpec::groups("stimulus/presentation", Some("TimeSeries")))
                .field(FieldSpec::groups("stimulus/templates", Some("TimeSeries")))
                .field(FieldSpec::group("general/electrodes", Some("DynamicTable")))
                .field(FieldSpec::group("units", Some("Units")))
                .field(FieldSpec::group("intervals/epochs", Some("TimeIntervals"))),
        );
    ns.full_name = "core record store schema".to_string();
    ns.doc = "built-in series, table and file types".to_string();
    ns
}
