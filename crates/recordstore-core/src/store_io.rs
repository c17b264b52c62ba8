//! Opening, writing and reading record stores.
//!
//! A [`StoreIo`] handle owns the in-memory builder tree of one store
//! document. Opening in a write mode commits a fresh skeleton immediately,
//! so exclusive creation fails up front and never touches an existing
//! document. Every [`StoreIo::write`] maps the container, merges it into the
//! tree, adds the fixed skeleton and, when asked, the schema cache, then
//! replaces the document atomically.
//!
//! The handle is released explicitly with [`StoreIo::close`]. A backend
//! failure releases it as well; any later call fails with
//! [`StoreError::Closed`].
mod schema_cache;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    builder::GroupBuilder,
    container::Container,
    mapper::{MapError, ObjectMapper},
    schema::{NamespaceCatalog, SchemaError, TypeMap},
    storage::{
        self, StorageError, StoreLocation,
        layout::{ROOT_NAME, SKELETON, STORE_FORMAT_NAME, STORE_FORMAT_VERSION},
    },
};

/// Errors from store I/O.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Exclusive creation targeted an existing store.
    #[snafu(display("store already exists at {location}"))]
    AlreadyExists {
        /// Store location.
        location: String,
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// Reading or appending targeted a missing store.
    #[snafu(display("no store at {location}"))]
    NotFound {
        /// Store location.
        location: String,
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// Any other backend failure. The handle is released.
    #[snafu(display("backend I/O error at {location}: {source}"))]
    BackendIo {
        /// Store location.
        location: String,
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// A write was attempted on a handle opened read-only.
    #[snafu(display("store {location} is open read-only"))]
    ReadOnly {
        /// Store location.
        location: String,
    },

    /// The handle was closed or released after a backend failure.
    #[snafu(display("store handle for {location} is closed"))]
    Closed {
        /// Store location.
        location: String,
    },

    /// Mapping a container to or from the tree failed.
    #[snafu(display("mapping error in {location}: {source}"))]
    Map {
        /// Store location.
        location: String,
        /// Underlying mapping error.
        source: MapError,
    },

    /// A schema catalog operation failed.
    #[snafu(display("schema error: {source}"))]
    Schema {
        /// Underlying schema error.
        source: SchemaError,
    },

    /// The cached schema does not reproduce the active catalog.
    #[snafu(display("cached schema in {location} does not match: {source}"))]
    SchemaMismatch {
        /// Store location.
        location: String,
        /// The first difference found.
        source: SchemaError,
    },

    /// The tree or a schema blob could not be serialized.
    #[snafu(display("failed to encode store document: {source}"))]
    Encode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The store document or a schema blob could not be parsed.
    #[snafu(display("failed to decode {location}: {source}"))]
    Decode {
        /// Store location.
        location: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The document envelope names another format or version.
    #[snafu(display("{location} is not a {STORE_FORMAT_NAME} v{STORE_FORMAT_VERSION} document (found {format} v{version})"))]
    UnsupportedFormat {
        /// Store location.
        location: String,
        /// Format name found.
        format: String,
        /// Format version found.
        version: u32,
    },

    /// The root container is not of the requested concrete type.
    #[snafu(display("root container is {found}, not {expected}"))]
    UnexpectedType {
        /// Requested Rust type.
        expected: String,
        /// Schema type found.
        found: String,
    },

    /// An open mode string could not be parsed.
    #[snafu(display("invalid open mode {mode:?}; expected r, w, w-, a or a+"))]
    InvalidMode {
        /// The rejected string.
        mode: String,
    },
}

/// Result alias for store I/O.
pub type StoreResult<T> = Result<T, StoreError>;

fn from_storage(err: StorageError, location: &StoreLocation) -> StoreError {
    let location = location.to_string();
    match err {
        source @ StorageError::NotFound { .. } => StoreError::NotFound { location, source },
        source @ StorageError::AlreadyExists { .. } => {
            StoreError::AlreadyExists { location, source }
        }
        source => StoreError::BackendIo { location, source },
    }
}

/// How a store is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    /// Open an existing store; writes are rejected.
    #[default]
    Read,
    /// Create a fresh store, discarding any existing one.
    WriteTruncate,
    /// Create a fresh store, failing if one exists.
    WriteExclusive,
    /// Open an existing store and merge writes into it.
    Append,
    /// Like [`OpenMode::Append`], creating the store when it is missing.
    AppendOrCreate,
}

impl OpenMode {
    /// Whether writes are allowed.
    pub fn is_writable(self) -> bool {
        self != OpenMode::Read
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "r",
            OpenMode::WriteTruncate => "w",
            OpenMode::WriteExclusive => "w-",
            OpenMode::Append => "a",
            OpenMode::AppendOrCreate => "a+",
        };
        f.write_str(s)
    }
}

impl FromStr for OpenMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write-truncate" => Ok(OpenMode::WriteTruncate),
            "w-" | "x" | "write-exclusive" => Ok(OpenMode::WriteExclusive),
            "a" | "append" => Ok(OpenMode::Append),
            "a+" | "append-or-create" => Ok(OpenMode::AppendOrCreate),
            _ => InvalidModeSnafu { mode: s }.fail(),
        }
    }
}

/// Options for opening a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Open mode.
    pub mode: OpenMode,
    /// Whether [`StoreIo::write_default`] caches the schema.
    pub cache_schema: bool,
    /// Pretty-print the JSON document.
    pub pretty: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::Read,
            cache_schema: true,
            pretty: false,
        }
    }
}

impl StoreOptions {
    /// Default options with `mode`.
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    format: &'a str,
    version: u32,
    root: &'a GroupBuilder,
}

#[derive(Deserialize)]
struct Document {
    format: String,
    version: u32,
    root: GroupBuilder,
}

fn skeleton() -> GroupBuilder {
    let mut root = GroupBuilder::new(ROOT_NAME);
    add_skeleton(&mut root);
    root
}

fn add_skeleton(root: &mut GroupBuilder) {
    for path in SKELETON {
        root.group_at_or_create(path);
    }
}

/// Serialize `root` and commit it; returns the document size in bytes.
async fn commit(
    location: &StoreLocation,
    root: &GroupBuilder,
    pretty: bool,
    create_new: bool,
) -> StoreResult<usize> {
    let doc = DocumentRef {
        format: STORE_FORMAT_NAME,
        version: STORE_FORMAT_VERSION,
        root,
    };
    let bytes = if pretty {
        serde_json::to_vec_pretty(&doc)
    } else {
        serde_json::to_vec(&doc)
    }
    .context(EncodeSnafu)?;
    let written = if create_new {
        storage::write_new(location, &bytes).await
    } else {
        storage::write_atomic(location, &bytes).await
    };
    written.map_err(|e| from_storage(e, location))?;
    Ok(bytes.len())
}

async fn load(location: &StoreLocation) -> StoreResult<GroupBuilder> {
    let text = storage::read_to_string(location)
        .await
        .map_err(|e| from_storage(e, location))?;
    let doc: Document = serde_json::from_str(&text).context(DecodeSnafu {
        location: location.to_string(),
    })?;
    ensure!(
        doc.format == STORE_FORMAT_NAME && doc.version == STORE_FORMAT_VERSION,
        UnsupportedFormatSnafu {
            location: location.to_string(),
            format: doc.format,
            version: doc.version,
        }
    );
    Ok(doc.root)
}

/// An open record store.
#[derive(Debug)]
pub struct StoreIo {
    location: StoreLocation,
    options: StoreOptions,
    type_map: TypeMap,
    root: GroupBuilder,
    open: bool,
}

impl StoreIo {
    /// Open `location` in `mode` with default options and the built-in types.
    pub async fn open(location: StoreLocation, mode: OpenMode) -> StoreResult<Self> {
        Self::open_with_options(location, StoreOptions::new(mode)).await
    }

    /// Open `location` with `options` and the built-in types.
    pub async fn open_with_options(
        location: StoreLocation,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        Self::open_with(location, options, TypeMap::core()).await
    }

    /// Open `location` with `options`, mapping containers through `type_map`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] in read or append mode when no store exists.
    /// - [`StoreError::AlreadyExists`] in exclusive mode when one does; the
    ///   existing document is left byte-for-byte unchanged.
    pub async fn open_with(
        location: StoreLocation,
        options: StoreOptions,
        type_map: TypeMap,
    ) -> StoreResult<Self> {
        let mode = options.mode;
        let root = match mode {
            OpenMode::Read | OpenMode::Append => load(&location).await?,
            OpenMode::AppendOrCreate => {
                let found = storage::exists(&location)
                    .await
                    .map_err(|e| from_storage(e, &location))?;
                if found {
                    load(&location).await?
                } else {
                    log::debug!("no store at {location}; creating it");
                    let root = skeleton();
                    commit(&location, &root, options.pretty, false).await?;
                    root
                }
            }
            OpenMode::WriteTruncate | OpenMode::WriteExclusive => {
                let root = skeleton();
                let create_new = mode == OpenMode::WriteExclusive;
                commit(&location, &root, options.pretty, create_new).await?;
                root
            }
        };
        log::info!("opened store {location} in mode {mode}");
        Ok(Self {
            location,
            options,
            type_map,
            root,
            open: true,
        })
    }

    /// Where the store lives.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Open mode.
    pub fn mode(&self) -> OpenMode {
        self.options.mode
    }

    /// Types used for mapping.
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> StoreResult<()> {
        ensure!(
            self.open,
            ClosedSnafu {
                location: self.location.to_string(),
            }
        );
        Ok(())
    }

    fn release(&mut self) {
        if self.open {
            log::warn!("releasing store handle for {} after a backend failure", self.location);
            self.open = false;
        }
    }

    /// Map `container`, merge it into the store and commit.
    ///
    /// In append modes same-named objects are replaced and siblings kept; in
    /// write modes the container lands in the fresh tree created at open.
    /// With `cache_schema` the active catalog is written under
    /// `specifications`.
    ///
    /// # Errors
    ///
    /// [`StoreError::ReadOnly`] in read mode, [`StoreError::Map`] when the
    /// container does not fit its schema (nothing is committed), or a backend
    /// error, which also releases the handle.
    pub async fn write(&mut self, container: &dyn Container, cache_schema: bool) -> StoreResult<()> {
        self.ensure_open()?;
        ensure!(
            self.options.mode.is_writable(),
            ReadOnlySnafu {
                location: self.location.to_string(),
            }
        );
        let mapped = ObjectMapper::new(&self.type_map)
            .to_builder(container)
            .context(MapSnafu {
                location: self.location.to_string(),
            })?;

        let mut root = self.root.clone();
        if matches!(self.options.mode, OpenMode::Append | OpenMode::AppendOrCreate) {
            log::debug!(
                "merging {} {:?} into existing store {}",
                container.type_name(),
                container.name(),
                self.location
            );
        }
        root.merge_from(mapped);
        add_skeleton(&mut root);
        if cache_schema {
            let blobs = schema_cache::write(&mut root, self.type_map.catalog())?;
            log::debug!("cached {blobs} schema blobs in {}", self.location);
        }

        match commit(&self.location, &root, self.options.pretty, false).await {
            Ok(bytes) => {
                log::info!("committed {bytes} bytes to {}", self.location);
                self.root = root;
                Ok(())
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    /// [`Self::write`] using the `cache_schema` option.
    pub async fn write_default(&mut self, container: &dyn Container) -> StoreResult<()> {
        let cache_schema = self.options.cache_schema;
        self.write(container, cache_schema).await
    }

    /// Map the whole tree back to its root container.
    ///
    /// # Errors
    ///
    /// [`StoreError::Map`] holding every problem found in the tree.
    pub fn read(&self) -> StoreResult<Box<dyn Container>> {
        self.ensure_open()?;
        ObjectMapper::new(&self.type_map)
            .from_builder(&self.root, None)
            .context(MapSnafu {
                location: self.location.to_string(),
            })
    }

    /// [`Self::read`], downcast to `T`.
    pub fn read_as<T: Container>(&self) -> StoreResult<T> {
        let container = self.read()?;
        let found = container.type_name().to_string();
        container
            .downcast::<T>()
            .map(|c| *c)
            .context(UnexpectedTypeSnafu {
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Read the cached schema of `namespaces` from the store at `location`
    /// without mapping any container. The highest cached version of each
    /// namespace is used.
    pub async fn load_schema<S: AsRef<str>>(
        location: &StoreLocation,
        namespaces: &[S],
    ) -> StoreResult<NamespaceCatalog> {
        let root = load(location).await?;
        schema_cache::read(&root, namespaces, &location.to_string())
    }

    /// Check that this store's schema cache reproduces the active catalog.
    pub fn verify_schema_cache(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let names: Vec<&str> = self
            .type_map
            .catalog()
            .namespaces()
            .map(|ns| ns.name.as_str())
            .collect();
        let location = self.location.to_string();
        let cached = schema_cache::read(&self.root, &names, &location)?;
        self.type_map
            .catalog()
            .ensure_matches(&cached)
            .context(SchemaMismatchSnafu { location })
    }

    /// Release the handle. Later calls fail with [`StoreError::Closed`].
    pub fn close(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.open = false;
        log::info!("closed store {}", self.location);
        Ok(())
    }
}

impl Drop for StoreIo {
    fn drop(&mut self) {
        if self.open {
            log::warn!("store handle for {} dropped without close", self.location);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{AnnotationSeries, TimeSeries};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn modes_parse_short_and_long_names() {
        assert_eq!("w-".parse::<OpenMode>().unwrap(), OpenMode::WriteExclusive);
        assert_eq!("append-or-create".parse::<OpenMode>().unwrap(), OpenMode::AppendOrCreate);
        assert_eq!(OpenMode::Append.to_string(), "a");
        assert!(matches!(
            "rw".parse::<OpenMode>(),
            Err(StoreError::InvalidMode { .. })
        ));
    }

    #[test]
    fn options_fill_defaults() {
        let options: StoreOptions = serde_json::from_str(r#"{"mode": "append"}"#).unwrap();
        assert_eq!(options.mode, OpenMode::Append);
        assert!(options.cache_schema);
        assert!(!options.pretty);
    }

    #[tokio::test]
    async fn read_only_handles_reject_writes() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StoreLocation::local(tmp.path().join("store.json"));
        let mut writer = StoreIo::open(location.clone(), OpenMode::WriteTruncate).await?;
        writer.close()?;

        let mut reader = StoreIo::open(location, OpenMode::Read).await?;
        let err = reader
            .write(&AnnotationSeries::new("notes"), false)
            .await
            .expect_err("read-only write");
        assert!(matches!(err, StoreError::ReadOnly { .. }));
        reader.close()?;
        assert!(matches!(reader.close(), Err(StoreError::Closed { .. })));
        assert!(matches!(reader.read(), Err(StoreError::Closed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn skeleton_is_committed_at_open() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StoreLocation::local(tmp.path().join("fresh.json"));
        let mut store = StoreIo::open(location.clone(), OpenMode::AppendOrCreate).await?;
        store.close()?;

        let root = load(&location).await?;
        for path in SKELETON {
            assert!(root.group_at(path).is_some(), "{path} missing");
        }
        assert!(root.type_name().is_none());

        let store = StoreIo::open(location, OpenMode::Read).await?;
        let err = store.read_as::<TimeSeries>().expect_err("untyped root");
        assert!(matches!(err, StoreError::Map { .. }));
        Ok(())
    }
}
