//! Blob operations bound to one store
//!
//! A [`DatasetIndex`] pairs a [`BlobStore`] (the local cache or a remote
//! service) with the file-level blob operations the transfer engine uses.

use crate::config::{Backend, Config};
use crate::model::{Hash, HashingReader};
use crate::store::{blob_key, BlobStore, LocalBlobStore};
use crate::util::{write_atomic, write_atomic_if};
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use tracing::{debug, info};

pub struct DatasetIndex {
    name: String,
    store: Box<dyn BlobStore>,
}

impl DatasetIndex {
    pub fn new(name: impl Into<String>, store: impl BlobStore + 'static) -> Self {
        DatasetIndex {
            name: name.into(),
            store: Box::new(store),
        }
    }

    /// Bind the store selected by `backend` for a dataset
    pub fn open(dataset_dir: &Path, config: &Config, backend: Backend) -> Result<Self> {
        match backend {
            Backend::Local => {
                let root = config.local_store_path(dataset_dir)?;
                info!(store = %root.display(), "using local blobstore");
                Ok(Self::new(
                    root.display().to_string(),
                    LocalBlobStore::open(root)?,
                ))
            }
            #[cfg(feature = "remote")]
            Backend::Remote => {
                let store = crate::store::RemoteBlobStore::new(config.remote_store_config())?;
                info!(url = %config.remote_url, "using remote blobstore");
                Ok(Self::new(config.remote_url.clone(), store))
            }
            #[cfg(not(feature = "remote"))]
            Backend::Remote => Err(Error::Config(
                "built without remote blobstore support".into(),
            )),
        }
    }

    /// Human-readable name of the bound store
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store key for `hash`: `/blob/<hash>`
    pub fn blob_key(hash: &Hash) -> String {
        blob_key(hash)
    }

    /// Upload the file at `path` as the blob `hash`.
    ///
    /// The file is trusted to hash to `hash`; nothing here re-checks it.
    pub fn put_blob(&self, hash: &Hash, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        debug!(%hash, path = %path.display(), "put blob");
        self.store
            .put(&blob_key(hash), Box::new(BufReader::new(file)))
    }

    /// Download the blob `hash` into `path`, replacing any existing file.
    /// Returns the number of bytes written.
    pub fn get_blob(&self, hash: &Hash, path: &Path) -> Result<u64> {
        let mut reader = self.store.get(&blob_key(hash))?;
        debug!(%hash, path = %path.display(), "get blob");
        Ok(write_atomic(path, &mut reader)?)
    }

    /// Like [`DatasetIndex::get_blob`], but the downloaded bytes must hash
    /// to `hash`. On mismatch `path` is left untouched and
    /// [`Error::Integrity`] is returned.
    pub fn get_blob_verified(&self, hash: &Hash, path: &Path) -> Result<u64> {
        let reader = self.store.get(&blob_key(hash))?;
        let mut reader = HashingReader::new(reader);
        debug!(%hash, path = %path.display(), "get blob (verified)");
        write_atomic_if(path, &mut reader, |r| {
            let actual = r.hash();
            if actual == *hash {
                Ok(())
            } else {
                Err(Error::Integrity {
                    expected: hash.to_hex(),
                    actual: actual.to_hex(),
                })
            }
        })
    }

    /// Fetch the blob and confirm its content still hashes to `hash`
    pub fn check_blob(&self, hash: &Hash) -> Result<()> {
        let reader = self.store.get(&blob_key(hash))?;
        let actual = Hash::compute(reader)?;
        if actual != *hash {
            return Err(Error::Integrity {
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Stream the blob's content into `out`
    pub fn show_blob(&self, hash: &Hash, out: &mut dyn Write) -> Result<u64> {
        let mut reader = self.store.get(&blob_key(hash))?;
        Ok(io::copy(&mut reader, out)?)
    }
}

impl std::fmt::Debug for DatasetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetIndex")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
