//! Blob stores
//!
//! A [`BlobStore`] is a flat key → bytes namespace with exactly two
//! operations. Blob data lives under `/blob/<hash>` (see [`blob_key`]) so a
//! store can be shared with other index data.
//!
//! Backends:
//! - [`LocalBlobStore`]: a directory on the local filesystem
//! - [`RemoteBlobStore`]: an HTTP object store (feature `remote`)
//! - [`MemoryBlobStore`]: in-process, counts operations; for tests

mod local;
mod memory;
#[cfg(feature = "remote")]
mod remote;

use crate::model::Hash;
use crate::Result;
use std::io::Read;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "remote")]
pub use remote::{RemoteBlobStore, RemoteStoreConfig};

/// Owned byte stream passed into and returned from stores
pub type BlobReader = Box<dyn Read + Send>;

/// Key prefix isolating blob data inside a store
pub const BLOB_PREFIX: &str = "/blob/";

/// Store key for a blob
pub fn blob_key(hash: &Hash) -> String {
    format!("{}{}", BLOB_PREFIX, hash.to_hex())
}

/// Capability interface implemented by every storage backend.
///
/// Both operations must behave identically across backends: `put` consumes
/// the whole stream and the key only becomes visible once fully written;
/// `get` returns everything stored under the key or [`crate::Error::NotFound`].
pub trait BlobStore: Send + Sync {
    /// Store `content` under `key`, replacing any previous value
    fn put(&self, key: &str, content: BlobReader) -> Result<()>;

    /// Open the content stored under `key`. The caller owns the stream.
    fn get(&self, key: &str) -> Result<BlobReader>;
}

impl<S: BlobStore + ?Sized> BlobStore for Box<S> {
    fn put(&self, key: &str, content: BlobReader) -> Result<()> {
        (**self).put(key, content)
    }

    fn get(&self, key: &str) -> Result<BlobReader> {
        (**self).get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_shape() {
        let hash = Hash::digest(b"hello world");
        assert_eq!(
            blob_key(&hash),
            "/blob/2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }
}
