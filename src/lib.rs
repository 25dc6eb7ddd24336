//! # datadex
//!
//! Content-addressed blob storage and transfer for datasets.
//!
//! Datasets are made up of files, and every file is one blob named by the
//! SHA-1 of its content. Blobs live in blob stores, either a directory on
//! this machine or a remote HTTP service, and are moved in batches that
//! never transfer the same content twice.
//!
//! ## Core Concepts
//!
//! - **Hash**: 40 hex chars of SHA-1; the only blob identifier
//! - **Manifest**: tracked file → hash, recomputed from disk on demand
//! - **BlobStore**: put/get by key, blobs under `/blob/<hash>`
//! - **DatasetIndex**: a store plus file-level blob operations
//! - **BlobTransferEngine**: validated, de-duplicated batch put/get
//!
//! ## Example
//!
//! ```ignore
//! use datadex::{BlobTransferEngine, DatasetIndex, LocalBlobStore, Manifest};
//!
//! let manifest = Manifest::scan("my-dataset")?;
//! let index = DatasetIndex::new("cache", LocalBlobStore::open("/tmp/blobs")?);
//! let hashes: Vec<String> = manifest.all_hashes().iter().map(|h| h.to_hex()).collect();
//! BlobTransferEngine::new(&index, &manifest).put(&hashes)?;
//! ```

pub mod config;
pub mod manifest;
pub mod model;
pub mod store;
pub mod transfer;

mod error;
mod index;
mod util;

pub use config::{Backend, Config, DEFAULT_REMOTE_URL};
pub use error::{Error, Result};
pub use index::DatasetIndex;
pub use manifest::{hash_file, HashCache, Manifest, ScanOptions, MANIFEST_FILE};
pub use model::{is_valid_hash, short_hash, Handle, Hash};
#[cfg(feature = "remote")]
pub use store::{RemoteBlobStore, RemoteStoreConfig};
pub use store::{blob_key, BlobReader, BlobStore, LocalBlobStore, MemoryBlobStore};
pub use transfer::{
    validate_batch, BlobTransferEngine, Operation, RecordingObserver, TracingObserver,
    TransferEvent, TransferObserver, TransferOptions, TransferReport,
};
pub use util::{copy_file, deduplicate};
