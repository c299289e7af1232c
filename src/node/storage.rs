//! Node-local file storage
//!
//! Layout: `<root>/<department>/<name>`. The filesystem is the only source of
//! truth; nothing is indexed in memory.
//!
//! Writes that replace content go through a [`StagedFile`]: bytes land in a
//! hidden sibling (`.<name>.<tag>.partial`) and are renamed onto the target
//! on commit, so a failed stream never leaves a half-written file in place.
//! Visible names never start with `.`, so staging files cannot collide with
//! stored files.

use crate::common::{FullName, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DIGEST_BUFFER: usize = 64 * 1024;

/// Size and CRC32 of a stored file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub size: u64,
    pub crc32: u32,
}

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open (and create if missing) a storage root
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        tracing::info!("Storage ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &FullName) -> PathBuf {
        self.root.join(name.department()).join(name.name())
    }

    pub async fn exists(&self, name: &FullName) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }

    /// Create a new file for writing. `None` if it already exists.
    pub async fn create(&self, name: &FullName) -> Result<Option<File>> {
        let path = self.path_for(name);
        ensure_parent(&path).await?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an existing file for reading. `None` if absent.
    pub async fn open_read(&self, name: &FullName) -> Result<Option<File>> {
        match File::open(self.path_for(name)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Begin replacing a file's content; it is created if missing
    pub async fn stage(&self, name: &FullName) -> Result<StagedFile> {
        let target = self.path_for(name);
        ensure_parent(&target).await?;
        let staging = target.with_file_name(format!(
            ".{}.{}.partial",
            name.name(),
            uuid::Uuid::new_v4().simple()
        ));
        let file = File::create(&staging).await?;
        Ok(StagedFile {
            file,
            staging,
            target,
        })
    }

    /// Remove a file. `false` if it was not there.
    pub async fn delete(&self, name: &FullName) -> Result<bool> {
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Fingerprint of the current content, if present
    pub async fn digest(&self, name: &FullName) -> Result<Option<FileDigest>> {
        let Some(mut file) = self.open_read(name).await? else {
            return Ok(None);
        };
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; DIGEST_BUFFER];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Some(FileDigest {
            size,
            crc32: hasher.finalize(),
        }))
    }

    /// Size in bytes, if present
    pub async fn size(&self, name: &FullName) -> Result<Option<u64>> {
        match fs::metadata(self.path_for(name)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Content being written to a hidden sibling of its final path
pub struct StagedFile {
    file: File,
    staging: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes).await?;
        Ok(())
    }

    /// Flush and move onto the final path, replacing any previous content
    pub async fn commit(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.staging, &self.target).await?;
        Ok(())
    }

    /// Drop the staged bytes, leaving the target untouched
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.staging).await {
            tracing::warn!("Failed to remove {}: {}", self.staging.display(), e);
        }
    }
}
