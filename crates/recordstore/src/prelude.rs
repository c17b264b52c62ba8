//! Wrapper prelude.
//!
//! The `recordstore` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::builder::{NdArray, Value};
pub use crate::schema::TypeMap;
pub use crate::{
    AnnotationSeries, Container, DecompositionSeries, DynamicTable, IntervalSeries, MapError,
    OpenMode, RecordFile, RecordFileParams, Series, StoreError, StoreIo, StoreLocation,
    StoreOptions, TableError, TimeIntervals, TimeSeries, TimeSeriesParams, Timing, UnitParams,
    Units,
};
