//! Tree layout conventions inside a store document.
//!
//! Every name the mapper and store I/O agree on lives here so that the
//! conventions can evolve in one place:
//! - reserved attribute names (`type`, `namespace`)
//! - the fixed top-level skeleton of a record file
//! - the schema cache subtree (`specifications/<namespace>/<version>/...`)
//! - the ragged column index suffix (`<column>_index`)

/// Marker written into every store document envelope.
pub const STORE_FORMAT_NAME: &str = "recordstore";

/// Version of the store document envelope.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Schema format version written into a record file's `format_version` dataset.
pub const FORMAT_VERSION: &str = "2.0.0";

/// Name of the root group.
pub const ROOT_NAME: &str = "root";

/// Attribute carrying the schema type name of a typed group.
pub const TYPE_ATTR: &str = "type";

/// Attribute carrying the namespace of a typed group.
pub const NAMESPACE_ATTR: &str = "namespace";

/// Raw acquired data.
pub const ACQUISITION: &str = "acquisition";
/// Derived results.
pub const ANALYSIS: &str = "analysis";
/// Experiment metadata.
pub const GENERAL: &str = "general";
/// Intermediate processing results.
pub const PROCESSING: &str = "processing";
/// Stimuli presented during the session.
pub const STIMULUS_PRESENTATION: &str = "stimulus/presentation";
/// Stimulus templates.
pub const STIMULUS_TEMPLATES: &str = "stimulus/templates";

/// Groups that always exist under the root of a written store, possibly empty.
pub const SKELETON: [&str; 6] = [
    ACQUISITION,
    ANALYSIS,
    GENERAL,
    PROCESSING,
    STIMULUS_PRESENTATION,
    STIMULUS_TEMPLATES,
];

/// Reserved group holding the schema cache.
pub const SPECIFICATIONS: &str = "specifications";

/// Dataset under `specifications/<ns>/<version>/` holding namespace metadata.
pub const NAMESPACE_BLOB: &str = "namespace";

/// Suffix of the offsets dataset that accompanies a ragged column.
pub const INDEX_SUFFIX: &str = "_index";

/// Attribute on a region column's dataset naming the target table path.
pub const TABLE_ATTR: &str = "table";

/// Attribute listing a table's columns in declaration order.
pub const COLNAMES_ATTR: &str = "colnames";

/// Row identifier dataset of a table group.
pub const ID_DATASET: &str = "id";

/// Attribute carrying a column's description.
pub const DESCRIPTION_ATTR: &str = "description";

/// Attribute marking a table whose region references are checked late.
/// Absent means eager.
pub const VALIDATION_ATTR: &str = "reference_validation";

/// Value of [`VALIDATION_ATTR`] for deferred tables.
pub const DEFERRED_VALIDATION: &str = "deferred";

/// `<column>_index`
pub fn index_dataset_name(column: &str) -> String {
    format!("{column}{INDEX_SUFFIX}")
}

/// `specifications/<namespace>/<version>`
pub fn cache_path(namespace: &str, version: &str) -> String {
    format!("{SPECIFICATIONS}/{namespace}/{version}")
}
