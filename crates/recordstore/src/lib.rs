//! # recordstore
//!
//! Typed, self-describing hierarchical record store.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recordstore::prelude::*;
//!
//! let start = chrono::DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00")?;
//! let mut file = RecordFile::new(RecordFileParams::new("session-1", "open field", start))?;
//! file.add_acquisition(AnnotationSeries::new("notes"))?;
//!
//! let location = StoreLocation::local("session-1.json");
//! let mut store = StoreIo::open(location, OpenMode::WriteExclusive).await?;
//! store.write(&file, true).await?;
//! store.close()?;
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Schema namespace (wrapper-only).
pub mod schema {
    pub use recordstore_core::schema::{
        CORE_NAMESPACE, CORE_VERSION, FieldKind, FieldSpec, Namespace, NamespaceCatalog,
        SchemaError, TypeLayout, TypeMap, TypeSpec, core_namespace,
    };
}

/// Builder tree namespace (wrapper-only).
pub mod builder {
    pub use recordstore_core::builder::{
        DType, DataBuffer, DatasetBuilder, GroupBuilder, NdArray, Value, ValueError,
    };
}

pub use recordstore_core::container::{Container, Field, FieldReader, FieldRef, ValidationError};
pub use recordstore_core::containers::{
    AbstractFeatureSeries, AnnotationSeries, BandParams, Collection, DecompositionSeries,
    ELECTRODES_PATH, EPOCHS_PATH, IntervalParams, IntervalSeries, RecordFile, RecordFileParams,
    Series, SeriesSpan, TimeIntervals, TimeSeries, TimeSeriesParams, Timing, UnitParams, Units,
};
pub use recordstore_core::mapper::{MapError, ObjectMapper};
pub use recordstore_core::storage::StoreLocation;
pub use recordstore_core::store_io::{OpenMode, StoreError, StoreIo, StoreOptions};
pub use recordstore_core::table::{
    Column, DynamicTable, ReferenceValidation, Row, TableError, TableRef, TableResolver, TableSet,
};
