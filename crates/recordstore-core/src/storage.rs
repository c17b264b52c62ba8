//! Physical backend for record stores.
//!
//! A store is a single document on the local filesystem. This module only
//! moves bytes: it knows how to create a document exclusively, replace it
//! atomically and read it back, and it classifies the underlying I/O errors
//! so callers can distinguish "missing" and "already there" from everything
//! else. The tree layout inside the document is described in [`layout`].
//!
//! The API takes a [`StoreLocation`] rather than a raw path so that further
//! backends (for example, object storage) can be added without touching the
//! store I/O logic.
pub mod layout;

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    ffi::OsString,
    fmt, io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Where a record store lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// A store document on the local filesystem.
    Local(PathBuf),
}

impl StoreLocation {
    /// Creates a new `StoreLocation` for a local file path.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        StoreLocation::Local(path.into())
    }

    /// The local path of the store document.
    pub fn path(&self) -> &Path {
        match self {
            StoreLocation::Local(p) => p,
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Local(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Errors produced by the backend implementation.
///
/// Backend-specific I/O errors are wrapped here so higher layers can map
/// them into [`StorageError`] variants with path context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
pub enum StorageError {
    /// The store document was not found.
    #[snafu(display("Store not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The store document already exists and create-new semantics were requested.
    #[snafu(display("Store already exists: {path}"))]
    AlreadyExists {
        /// The path that already exists.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O failure (disk, permissions, ...).
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

fn classify(err: io::Error, path: &Path) -> StorageError {
    let path = path.display().to_string();
    let kind = err.kind();
    let source = BackendError::Local(err);
    let backtrace = Backtrace::capture();
    match kind {
        io::ErrorKind::NotFound => StorageError::NotFound {
            path,
            source,
            backtrace,
        },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path,
            source,
            backtrace,
        },
        _ => StorageError::OtherIo {
            path,
            source,
            backtrace,
        },
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// `<file>.tmp` next to the target, keeping the original extension.
fn temp_path(abs: &Path) -> PathBuf {
    let mut name = abs
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".tmp");
    abs.with_file_name(name)
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the caller is already propagating another error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Whether the store document exists.
pub async fn exists(location: &StoreLocation) -> StorageResult<bool> {
    let abs = location.path();
    fs::try_exists(abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })
}

/// Replace the store document with `contents` atomically.
///
/// Writes a temporary file next to the target, syncs it and renames it into
/// place, so readers observe either the previous document or the new one.
/// On failure the temporary file is removed and the previous document is
/// left as it was.
///
/// # Errors
///
/// Returns [`StorageError::OtherIo`] when any filesystem step fails.
pub async fn write_atomic(location: &StoreLocation, contents: &[u8]) -> StorageResult<()> {
    match location {
        StoreLocation::Local(abs) => {
            create_parent_dir(abs).await?;

            let tmp_path = temp_path(abs);
            let mut guard = TempFileGuard::new(tmp_path.clone());
            let tmp_str = tmp_path.display().to_string();

            {
                let mut file = fs::File::create(&tmp_path)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_str.clone(),
                    })?;

                file.write_all(contents)
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu {
                        path: tmp_str.clone(),
                    })?;

                file.sync_all()
                    .await
                    .map_err(BackendError::Local)
                    .context(OtherIoSnafu { path: tmp_str })?;
            }

            fs::rename(&tmp_path, abs)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: abs.display().to_string(),
                })?;

            guard.disarm();
            Ok(())
        }
    }
}

/// Create the store document, failing if it already exists.
///
/// The existence check and the creation are one atomic filesystem call, so an
/// existing document's bytes are never touched.
///
/// # Errors
///
/// [`StorageError::AlreadyExists`] if the document exists, otherwise
/// [`StorageError::OtherIo`].
pub async fn write_new(location: &StoreLocation, contents: &[u8]) -> StorageResult<()> {
    match location {
        StoreLocation::Local(abs) => {
            create_parent_dir(abs).await?;
            let path_str = abs.display().to_string();

            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(abs)
                .await
                .map_err(|e| classify(e, abs))?;

            // A half-written new document is removed rather than left behind.
            let mut guard = TempFileGuard::new(abs.clone());

            file.write_all(contents)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: path_str.clone(),
                })?;

            file.sync_all()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu { path: path_str })?;

            guard.disarm();
            Ok(())
        }
    }
}

/// Read the whole store document as UTF-8 text.
///
/// # Errors
///
/// [`StorageError::NotFound`] if the document is missing, otherwise
/// [`StorageError::OtherIo`].
pub async fn read_to_string(location: &StoreLocation) -> StorageResult<String> {
    match location {
        StoreLocation::Local(abs) => fs::read_to_string(abs).await.map_err(|e| classify(e, abs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn write_atomic_creates_parent_directories_and_overwrites() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StoreLocation::local(tmp.path().join("nested/deep/store.json"));

        write_atomic(&location, b"original").await?;
        write_atomic(&location, b"updated").await?;

        assert_eq!(read_to_string(&location).await?, "updated");
        assert!(!tmp.path().join("nested/deep/store.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn read_missing_store_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StoreLocation::local(tmp.path().join("missing.json"));

        let err = read_to_string(&location).await.expect_err("missing store");
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(!exists(&location).await?);
        Ok(())
    }

    #[tokio::test]
    async fn write_new_refuses_existing_store_and_keeps_bytes() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StoreLocation::local(tmp.path().join("store.json"));

        write_new(&location, b"first").await?;
        let err = write_new(&location, b"second")
            .await
            .expect_err("second create must fail");
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        assert_eq!(read_to_string(&location).await?, "first");
        assert!(exists(&location).await?);
        Ok(())
    }

    #[test]
    fn temp_path_keeps_extension() {
        let p = temp_path(Path::new("/data/session.rec"));
        assert_eq!(p, PathBuf::from("/data/session.rec.tmp"));
    }
}
