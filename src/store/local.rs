//! Filesystem-backed blob store
//!
//! Layout:
//! ```text
//! <root>/
//!   blob/
//!     <40 hex chars>
//! ```
//!
//! Keys map directly onto relative paths below the root. Writes go through
//! a temp file in the destination directory and an atomic rename, so a
//! concurrent or later `get` never observes a torn blob.

use crate::store::{BlobReader, BlobStore};
use crate::util::write_atomic;
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A blob store rooted at a local directory
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Open a store at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(LocalBlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, refusing anything that would escape the root
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key.trim_start_matches('/'));
        let well_formed = !rel.as_os_str().is_empty()
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store key: {}", key),
            )));
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, mut content: BlobReader) -> Result<()> {
        let path = self.key_path(key)?;
        let written = write_atomic(&path, &mut content)?;
        debug!(key, bytes = written, "stored blob locally");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<BlobReader> {
        let path = self.key_path(key)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
