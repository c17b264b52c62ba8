//! Built-in container types of the `core` namespace.
//!
//! Each type is a plain struct with a validated constructor and a `read`
//! function registered with the [`crate::schema::TypeMap`]. Series types
//! share their accessors through the [`Series`] trait; specialized series
//! own their buffers and expose them through the same accessors.
mod annotation;
mod decomposition;
mod epoch;
mod feature;
mod interval;
mod record_file;
mod series;
mod table;

pub use annotation::AnnotationSeries;
pub use decomposition::{BandParams, DecompositionSeries};
pub use epoch::{IntervalParams, SeriesSpan, TimeIntervals};
pub use feature::AbstractFeatureSeries;
pub use interval::IntervalSeries;
pub use record_file::{Collection, EPOCHS_PATH, RecordFile, RecordFileParams};
pub use series::{
    DEFAULT_CONVERSION, DEFAULT_RESOLUTION, NO_COMMENTS, NO_DESCRIPTION, Series, TimeSeries,
    TimeSeriesParams, Timing,
};
pub use table::{ELECTRODES_PATH, UnitParams, Units};

use crate::{container::Constructor, table::DynamicTable};

/// Constructors of every built-in type, keyed by schema type name.
pub(crate) fn core_constructors() -> [(&'static str, Constructor); 9] {
    [
        (TimeSeries::TYPE, TimeSeries::read),
        (AnnotationSeries::TYPE, AnnotationSeries::read),
        (IntervalSeries::TYPE, IntervalSeries::read),
        (AbstractFeatureSeries::TYPE, AbstractFeatureSeries::read),
        (DecompositionSeries::TYPE, DecompositionSeries::read),
        (DynamicTable::TYPE, DynamicTable::read),
        (Units::TYPE, Units::read),
        (TimeIntervals::TYPE, TimeIntervals::read),
        (RecordFile::TYPE, RecordFile::read),
    ]
}
