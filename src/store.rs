use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;

use crate::limits::MAX_STORAGE_KEY_LEN;
use crate::sheet::{Sheet, SheetError};

#[derive(Debug)]
pub enum StoreError {
    /// No sheet stored under this key.
    Missing(String),
    Io(io::Error),
    Malformed(String),
    Timeout,
}

impl StoreError {
    /// Worth retrying: the same call may succeed a moment later.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout => true,
            StoreError::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
            ),
            StoreError::Missing(_) | StoreError::Malformed(_) => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Missing(key) => write!(f, "no sheet stored under {key:?}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::Malformed(e) => write!(f, "malformed sheet: {e}"),
            StoreError::Timeout => write!(f, "store call timed out"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<SheetError> for StoreError {
    fn from(e: SheetError) -> Self {
        StoreError::Malformed(e.to_string())
    }
}

/// Whole-sheet persistence, keyed by office storage key.
/// `save` replaces whatever was stored; there is no merge.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Sheet, StoreError>;
    async fn save(&self, key: &str, sheet: &Sheet) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemorySheetStore {
    sheets: DashMap<String, Sheet>,
}

impl InMemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sheets.contains_key(key)
    }
}

#[async_trait]
impl SheetStore for InMemorySheetStore {
    async fn load(&self, key: &str) -> Result<Sheet, StoreError> {
        self.sheets
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::Missing(key.to_string()))
    }

    async fn save(&self, key: &str, sheet: &Sheet) -> Result<(), StoreError> {
        self.sheets.insert(key.to_string(), sheet.clone());
        Ok(())
    }
}

/// One CSV file per key inside a directory.
pub struct CsvSheetStore {
    dir: PathBuf,
}

impl CsvSheetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a key to a file inside `dir`. Anything that could escape the
    /// directory is stripped; a key that sanitizes to nothing is rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.len() > MAX_STORAGE_KEY_LEN {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "storage key too long",
            )));
        }
        let safe: String = key
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe.is_empty() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty storage key",
            )));
        }
        Ok(self.dir.join(format!("{safe}.csv")))
    }
}

#[async_trait]
impl SheetStore for CsvSheetStore {
    async fn load(&self, key: &str) -> Result<Sheet, StoreError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(key.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(Sheet::from_csv(&bytes)?)
    }

    /// Write to a temp file, fsync, then rename over the target so readers
    /// never observe a half-written sheet.
    async fn save(&self, key: &str, sheet: &Sheet) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let bytes = sheet.to_csv()?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(StoreError::Io)?;
        let tmp_path = path.with_extension("csv.tmp");
        if let Err(e) = replace_file(&tmp_path, &path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

async fn replace_file(tmp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, path).await
}
