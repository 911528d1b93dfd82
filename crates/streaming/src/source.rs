//! Grid file sources.
//!
//! A [`GridSource`] resolves a data-file path to raw bytes or fails with a
//! [`LoadError`] carrying an HTTP-like status: `-1` for transport failures,
//! `404` when no data exists for the requested time or layer, anything else
//! passed through as reported.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use formats::{FormatError, GridRecord};
use tracing::debug;

pub const STATUS_TRANSPORT: i32 = -1;
pub const STATUS_NOT_FOUND: i32 = 404;

#[derive(Debug)]
pub enum LoadError {
    Transport { message: String },
    NotFound { path: String },
    Status { status: i32, message: String },
    Format { path: String, error: FormatError },
}

impl LoadError {
    /// Builds the error variant matching an HTTP-like status code.
    pub fn from_status(status: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            STATUS_TRANSPORT => LoadError::Transport { message },
            STATUS_NOT_FOUND => LoadError::NotFound { path: message },
            _ => LoadError::Status { status, message },
        }
    }

    /// Status code reported to the user. Format errors have none.
    pub fn status(&self) -> Option<i32> {
        match self {
            LoadError::Transport { .. } => Some(STATUS_TRANSPORT),
            LoadError::NotFound { .. } => Some(STATUS_NOT_FOUND),
            LoadError::Status { status, .. } => Some(*status),
            LoadError::Format { .. } => None,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Transport { message } => write!(f, "transport failure: {message}"),
            LoadError::NotFound { path } => write!(f, "no data: {path}"),
            LoadError::Status { status, message } => write!(f, "{status} {message}"),
            LoadError::Format { path, error } => write!(f, "{path}: {error}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Format { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Pending fetch of a data file, run on a runtime worker.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves data-file paths to bytes.
///
/// Implementations must be `Send + Sync` so loads can run on a runtime
/// worker. Methods return boxed futures for dyn-compatibility.
pub trait GridSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, path: &str) -> BoxFuture<'_, Result<Vec<u8>, LoadError>>;
}

/// Fetches and parses every path in order; the first failure wins.
pub async fn load_files(
    source: &dyn GridSource,
    paths: &[String],
) -> Result<Vec<Vec<GridRecord>>, LoadError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = source.fetch(path).await?;
        let records = formats::parse_records(&bytes).map_err(|error| LoadError::Format {
            path: path.clone(),
            error,
        })?;
        debug!(source = source.name(), %path, records = records.len(), "grid file loaded");
        files.push(records);
    }
    Ok(files)
}

/// Reads data files below a root directory.
pub struct FilesystemSource {
    name: String,
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            name: root.display().to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl GridSource for FilesystemSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, path: &str) -> BoxFuture<'_, Result<Vec<u8>, LoadError>> {
        let full = self.root.join(path.trim_start_matches('/'));
        let requested = path.to_string();
        Box::pin(async move {
            match tokio::fs::read(&full).await {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(LoadError::NotFound { path: requested })
                }
                Err(e) => Err(LoadError::Transport {
                    message: format!("{}: {e}", full.display()),
                }),
            }
        })
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Bytes(Vec<u8>),
    Failure { status: i32, message: String },
}

/// In-memory source, handy for replays and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, Entry>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.into(), Entry::Bytes(bytes.into()));
        self
    }

    /// Makes `path` fail with the given status.
    pub fn with_failure(
        mut self,
        path: impl Into<String>,
        status: i32,
        message: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            path.into(),
            Entry::Failure {
                status,
                message: message.into(),
            },
        );
        self
    }
}

impl GridSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, path: &str) -> BoxFuture<'_, Result<Vec<u8>, LoadError>> {
        let result = match self.entries.get(path) {
            Some(Entry::Bytes(bytes)) => Ok(bytes.clone()),
            Some(Entry::Failure { status, message }) => {
                Err(LoadError::from_status(*status, message.clone()))
            }
            None => Err(LoadError::NotFound {
                path: path.to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"[{"header":{"lo1":0,"la1":0,"dx":1,"dy":1,"nx":2,"ny":1,
        "refTime":"2014-01-01T00:00:00Z","forecastTime":0},"data":[1,2]}]"#;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(matches!(
            LoadError::from_status(-1, "down"),
            LoadError::Transport { .. }
        ));
        assert!(matches!(
            LoadError::from_status(404, "x.json"),
            LoadError::NotFound { .. }
        ));
        let e = LoadError::from_status(503, "busy");
        assert_eq!(e.status(), Some(503));
        assert_eq!(e.to_string(), "503 busy");
    }

    #[tokio::test]
    async fn filesystem_source_reads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), RECORD).unwrap();
        let source = FilesystemSource::new(dir.path());

        let files = load_files(&source, &["a.json".to_string()]).await.unwrap();
        assert_eq!(files[0][0].data, vec![Some(1.0), Some(2.0)]);

        let err = load_files(&source, &["missing.json".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn memory_source_injects_failures() {
        let source = MemorySource::new()
            .with_file("ok.json", RECORD)
            .with_failure("down.json", -1, "connection refused");
        let err = load_files(&source, &["ok.json".to_string(), "down.json".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(-1));
    }

    #[tokio::test]
    async fn malformed_file_is_a_format_error() {
        let source = MemorySource::new().with_file("bad.json", "{");
        let err = load_files(&source, &["bad.json".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Format { .. }));
        assert_eq!(err.status(), None);
    }
}
