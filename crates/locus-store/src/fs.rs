use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use locus_types::ObjectName;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectReader, ObjectWriter, ProviderStore};

/// Filesystem-backed store: `<root>/objects/<name>`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    objects: PathBuf,
}

impl FsObjectStore {
    /// Open a store, creating the storage root and its objects directory if
    /// they do not exist yet.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let objects = root.join("objects");
        fs::create_dir_all(&objects)
            .await
            .map_err(|source| StoreError::Init { path: objects.clone(), source })?;
        info!(root = %root.display(), "storage root ready");
        Ok(Self { root, objects })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an object's file. The name is a single validated segment.
    pub fn object_path(&self, name: &ObjectName) -> PathBuf {
        self.objects.join(name.as_str())
    }
}

#[async_trait]
impl ProviderStore for FsObjectStore {
    async fn exists(&self, name: &ObjectName) -> StoreResult<bool> {
        match fs::metadata(self.object_path(name)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_read(&self, name: &ObjectName) -> StoreResult<ObjectReader> {
        match fs::File::open(self.object_path(name)).await {
            Ok(file) => {
                debug!(object = %name, "opened for read");
                Ok(Box::new(file))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_write(&self, name: &ObjectName) -> StoreResult<ObjectWriter> {
        let file = fs::File::create(self.object_path(name)).await?;
        debug!(object = %name, "opened for write");
        Ok(Box::new(file))
    }
}
