//! Local disk storage: one file per payload under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::StorageSink;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    /// The root is created on first save, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` under the root. Names must be a single plain path
    /// component.
    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0');
        if invalid {
            return Err(Error::InvalidUrl(format!("unusable file name {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StorageSink for LocalDiskStorage {
    async fn save(&self, bytes: &[u8], name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        // The final name only ever holds a complete payload. Concurrent saves
        // of one name each write their own temp file; the last rename wins.
        let tmp = self.root.join(format!(".{name}.{}.part", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = bytes.len(), "payload saved");
        Ok(())
    }
}
