//! Batch blob transfer
//!
//! [`BlobTransferEngine`] runs put/get/check over a batch of requested
//! hashes against one [`DatasetIndex`]:
//!
//! 1. every hash is validated before anything else happens; one malformed
//!    hash (or an empty batch) rejects the whole batch
//! 2. duplicates are dropped, so each blob is handled at most once
//! 3. each hash is resolved to its tracked paths through the [`Manifest`]
//! 4. the blob is transferred once; on `get`, the fetched file is then
//!    copied locally to every other path sharing the hash
//!
//! The first failure stops the batch. Blobs already transferred stay
//! transferred. Progress goes to a [`TransferObserver`].

use crate::index::DatasetIndex;
use crate::manifest::Manifest;
use crate::model::Hash;
use crate::util::{copy_file, deduplicate};
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What happened to a blob
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Uploaded from a tracked file
    Put,
    /// Downloaded into a tracked file
    Get,
    /// Replicated from an already fetched file
    Copy,
    /// Verified in the store
    Check,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::Copy => "copy",
            Operation::Check => "check",
        }
    }
}

/// A single step of a batch, reported before it runs
#[derive(Clone, Debug, Serialize)]
pub struct TransferEvent<'a> {
    pub op: Operation,
    pub hash: &'a Hash,
    /// Path relative to the dataset root; `None` for store-only operations
    pub path: Option<&'a Path>,
}

/// Receives per-blob progress from the engine
pub trait TransferObserver {
    fn on_event(&mut self, event: &TransferEvent<'_>);
}

impl<T: TransferObserver + ?Sized> TransferObserver for &mut T {
    fn on_event(&mut self, event: &TransferEvent<'_>) {
        (**self).on_event(event)
    }
}

/// Default observer: emits `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_event(&mut self, event: &TransferEvent<'_>) {
        match event.path {
            Some(path) => info!(op = event.op.as_str(), hash = %event.hash, path = %path.display(), "blob"),
            None => info!(op = event.op.as_str(), hash = %event.hash, "blob"),
        }
    }
}

/// Collects events in memory
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<(Operation, Hash, Option<PathBuf>)>,
}

impl TransferObserver for RecordingObserver {
    fn on_event(&mut self, event: &TransferEvent<'_>) {
        self.events
            .push((event.op, *event.hash, event.path.map(Path::to_path_buf)));
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TransferOptions {
    /// Rehash downloaded content before accepting it
    pub verify: bool,
}

/// Outcome of a completed batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Blobs handled, in processing order
    pub blobs: Vec<Hash>,
    /// Local files read from or written to
    pub files: usize,
}

/// Validate a batch of hash strings.
///
/// All-or-nothing: the first malformed entry fails the whole batch. The
/// result is normalized and free of duplicates, in first-seen order.
pub fn validate_batch<I, S>(hashes: I) -> Result<Vec<Hash>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = hashes
        .into_iter()
        .map(|s| Hash::parse(s.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    if parsed.is_empty() {
        return Err(Error::EmptyBatch);
    }
    Ok(deduplicate(parsed))
}

pub struct BlobTransferEngine<'a> {
    index: &'a DatasetIndex,
    manifest: Option<&'a Manifest>,
    options: TransferOptions,
    observer: Box<dyn TransferObserver + 'a>,
}

impl<'a> BlobTransferEngine<'a> {
    /// Engine for put/get, resolving hashes through `manifest`
    pub fn new(index: &'a DatasetIndex, manifest: &'a Manifest) -> Self {
        BlobTransferEngine {
            index,
            manifest: Some(manifest),
            options: TransferOptions::default(),
            observer: Box::new(TracingObserver),
        }
    }

    /// Engine for store-only operations (`check`)
    pub fn without_manifest(index: &'a DatasetIndex) -> Self {
        BlobTransferEngine {
            index,
            manifest: None,
            options: TransferOptions::default(),
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: impl TransferObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    fn manifest(&self) -> Result<&'a Manifest> {
        self.manifest
            .ok_or_else(|| Error::Manifest("no manifest bound to transfer engine".into()))
    }

    /// Upload each requested blob from the first tracked path holding it
    pub fn put<I, S>(&mut self, hashes: I) -> Result<TransferReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = validate_batch(hashes)?;
        let manifest = self.manifest()?;
        let mut report = TransferReport::default();

        for hash in hashes {
            let paths = manifest.paths_for_hash(&hash)?;
            let source = &paths[0];
            self.emit(Operation::Put, &hash, Some(source.as_path()));

            self.index
                .put_blob(&hash, &manifest.absolute(source))
                .map_err(|e| e.in_transfer(hash.to_hex(), source))?;

            report.files += 1;
            report.blobs.push(hash);
        }

        info!(blobs = report.blobs.len(), store = self.index.name(), "put complete");
        Ok(report)
    }

    /// Download each requested blob once, then replicate it locally to
    /// every other tracked path sharing its hash
    pub fn get<I, S>(&mut self, hashes: I) -> Result<TransferReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = validate_batch(hashes)?;
        let manifest = self.manifest()?;
        let mut report = TransferReport::default();

        for hash in hashes {
            let paths = manifest.paths_for_hash(&hash)?;
            let (first, rest) = paths
                .split_first()
                .ok_or_else(|| Error::NotFound(hash.to_hex()))?;
            let fetched = manifest.absolute(first);

            self.emit(Operation::Get, &hash, Some(first.as_path()));
            let result = if self.options.verify {
                self.index.get_blob_verified(&hash, &fetched)
            } else {
                self.index.get_blob(&hash, &fetched)
            };
            result.map_err(|e| e.in_transfer(hash.to_hex(), first))?;
            report.files += 1;

            for path in rest {
                self.emit(Operation::Copy, &hash, Some(path.as_path()));
                copy_file(&fetched, &manifest.absolute(path))
                    .map_err(|e| Error::from(e).in_transfer(hash.to_hex(), path))?;
                report.files += 1;
            }

            debug!(%hash, copies = rest.len(), "fetched blob");
            report.blobs.push(hash);
        }

        info!(blobs = report.blobs.len(), files = report.files, store = self.index.name(), "get complete");
        Ok(report)
    }

    /// Confirm each requested blob is present in the store and intact
    pub fn check<I, S>(&mut self, hashes: I) -> Result<TransferReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = validate_batch(hashes)?;
        let mut report = TransferReport::default();

        for hash in hashes {
            self.emit(Operation::Check, &hash, None);
            self.index
                .check_blob(&hash)
                .map_err(|e| e.in_transfer(hash.to_hex(), DatasetIndex::blob_key(&hash)))?;
            report.blobs.push(hash);
        }

        Ok(report)
    }

    fn emit(&mut self, op: Operation, hash: &Hash, path: Option<&Path>) {
        self.observer.on_event(&TransferEvent { op, hash, path });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{blob_key, MemoryBlobStore};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        store: MemoryBlobStore,
        index: DatasetIndex,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryBlobStore::new();
            Fixture {
                dir: tempdir().unwrap(),
                index: DatasetIndex::new("mem", store.clone()),
                store,
            }
        }

        fn write(&self, rel: &str, data: &[u8]) {
            let path = self.dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, data).unwrap();
        }

        fn read(&self, rel: &str) -> Vec<u8> {
            fs::read(self.dir.path().join(rel)).unwrap()
        }

        fn manifest(&self) -> Manifest {
            Manifest::scan(self.dir.path()).unwrap()
        }
    }

    fn hex(data: &[u8]) -> String {
        Hash::digest(data).to_hex()
    }

    #[test]
    fn test_put_uploads_first_path_once() {
        let fx = Fixture::new();
        fx.write("fileA", b"shared");
        fx.write("fileB", b"shared");
        fx.write("fileC", b"alone");
        let mf = fx.manifest();

        let mut recorder = RecordingObserver::default();
        let report = BlobTransferEngine::new(&fx.index, &mf)
            .with_observer(&mut recorder)
            .put([hex(b"shared"), hex(b"shared")])
            .unwrap();

        assert_eq!(report.blobs, vec![Hash::digest(b"shared")]);
        assert_eq!(fx.store.put_calls(), 1);
        assert_eq!(
            fx.store.contents(&blob_key(&Hash::digest(b"shared"))).unwrap(),
            &b"shared"[..]
        );
        assert_eq!(
            recorder.events,
            vec![(Operation::Put, Hash::digest(b"shared"), Some(PathBuf::from("fileA")))]
        );
    }

    #[test]
    fn test_get_fetches_once_and_copies_to_duplicates() {
        let fx = Fixture::new();
        let h = Hash::digest(b"payload");
        let mf = Manifest::from_entries(
            fx.dir.path(),
            vec![
                ("fileA", h),
                ("fileB", h),
                ("fileC", Hash::digest(b"other")),
            ],
        ).unwrap();
        fx.store.insert(blob_key(&h), &b"payload"[..]);

        let report = BlobTransferEngine::new(&fx.index, &mf)
            .get([h.to_hex()])
            .unwrap();

        assert_eq!(fx.store.get_calls(), 1);
        assert_eq!(report.files, 2);
        assert_eq!(fx.read("fileA"), b"payload");
        assert_eq!(fx.read("fileB"), b"payload");
        assert!(!fx.dir.path().join("fileC").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_get_keeps_ordinary_file_modes() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let h = Hash::digest(b"payload");
        let mf = Manifest::from_entries(fx.dir.path(), vec![("a", h), ("b", h), ("c", h)]).unwrap();
        fx.store.insert(blob_key(&h), &b"payload"[..]);
        fx.write("plain", b"plain");
        fx.write("c", b"stale");
        fs::set_permissions(fx.dir.path().join("c"), fs::Permissions::from_mode(0o640)).unwrap();

        BlobTransferEngine::new(&fx.index, &mf)
            .get([h.to_hex()])
            .unwrap();

        let mode = |rel: &str| {
            fs::metadata(fx.dir.path().join(rel)).unwrap().permissions().mode() & 0o777
        };
        // fetched and copied files look like any other file written here
        assert_eq!(mode("a"), mode("plain"));
        assert_eq!(mode("b"), mode("plain"));
        // a replaced file keeps its own mode
        assert_eq!(mode("c"), 0o640);
        assert_eq!(fx.read("c"), b"payload");
    }

    #[test]
    fn test_duplicate_hash_in_batch_hits_store_once() {
        let fx = Fixture::new();
        let h = Hash::digest(b"dup");
        let mf = Manifest::from_entries(fx.dir.path(), vec![("d", h)]).unwrap();
        fx.store.insert(blob_key(&h), &b"dup"[..]);

        // same hash spelled in both cases still counts as one
        let batch = [h.to_hex(), h.to_hex().to_uppercase(), h.to_hex()];
        let report = BlobTransferEngine::new(&fx.index, &mf).get(batch).unwrap();

        assert_eq!(report.blobs.len(), 1);
        assert_eq!(fx.store.get_calls(), 1);
    }

    #[test]
    fn test_invalid_hash_aborts_before_any_transfer() {
        let fx = Fixture::new();
        fx.write("one", b"1");
        fx.write("three", b"3");
        let mf = fx.manifest();

        let err = BlobTransferEngine::new(&fx.index, &mf)
            .put([hex(b"1"), "not-a-hash".to_string(), hex(b"3")])
            .unwrap_err();

        assert!(err.is_validation());
        assert!(matches!(err, Error::InvalidHash(ref s) if s == "not-a-hash"));
        assert_eq!(fx.store.put_calls(), 0);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let fx = Fixture::new();
        let mf = fx.manifest();
        let err = BlobTransferEngine::new(&fx.index, &mf)
            .get(Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));
    }

    #[test]
    fn test_unknown_hash_is_not_found_without_store_calls() {
        let fx = Fixture::new();
        fx.write("known", b"known");
        let mf = fx.manifest();

        let err = BlobTransferEngine::new(&fx.index, &mf)
            .get([hex(b"unknown")])
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(fx.store.get_calls(), 0);
        assert_eq!(fx.store.put_calls(), 0);
    }

    #[test]
    fn test_first_failure_stops_batch_and_keeps_completed() {
        let fx = Fixture::new();
        let present = Hash::digest(b"present");
        let missing = Hash::digest(b"missing");
        let later = Hash::digest(b"later");
        let mf = Manifest::from_entries(
            fx.dir.path(),
            vec![("p", present), ("m", missing), ("l", later)],
        ).unwrap();
        fx.store.insert(blob_key(&present), &b"present"[..]);
        fx.store.insert(blob_key(&later), &b"later"[..]);

        let err = BlobTransferEngine::new(&fx.index, &mf)
            .get([present.to_hex(), missing.to_hex(), later.to_hex()])
            .unwrap_err();

        match &err {
            Error::Transfer { hash, path, .. } => {
                assert_eq!(hash, &missing.to_hex());
                assert_eq!(path, Path::new("m"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_not_found());
        assert_eq!(fx.read("p"), b"present");
        assert!(!fx.dir.path().join("l").exists());
        assert_eq!(fx.store.get_calls(), 2);
    }

    #[test]
    fn test_put_then_get_restores_dataset() {
        let fx = Fixture::new();
        fx.write("a/one.csv", b"1,2,3");
        fx.write("b/copy.csv", b"1,2,3");
        fx.write("two.txt", b"two");
        let mf = fx.manifest();
        let all: Vec<String> = mf.all_hashes().iter().map(Hash::to_hex).collect();

        BlobTransferEngine::new(&fx.index, &mf).put(&all).unwrap();
        assert_eq!(fx.store.len(), 2);

        fs::remove_dir_all(fx.dir.path().join("a")).unwrap();
        fs::remove_dir_all(fx.dir.path().join("b")).unwrap();
        fs::remove_file(fx.dir.path().join("two.txt")).unwrap();

        let report = BlobTransferEngine::new(&fx.index, &mf).get(&all).unwrap();
        assert_eq!(report.files, 3);
        assert_eq!(fx.read("a/one.csv"), b"1,2,3");
        assert_eq!(fx.read("b/copy.csv"), b"1,2,3");
        assert_eq!(fx.read("two.txt"), b"two");
    }

    #[test]
    fn test_verified_get_leaves_duplicates_untouched_on_mismatch() {
        let fx = Fixture::new();
        let h = Hash::digest(b"genuine");
        let mf = Manifest::from_entries(fx.dir.path(), vec![("x", h), ("y", h)]).unwrap();
        fx.store.insert(blob_key(&h), &b"corrupted"[..]);

        let err = BlobTransferEngine::new(&fx.index, &mf)
            .with_options(TransferOptions { verify: true })
            .get([h.to_hex()])
            .unwrap_err();

        assert!(matches!(err.root(), Error::Integrity { .. }));
        assert!(!fx.dir.path().join("x").exists());
        assert!(!fx.dir.path().join("y").exists());
    }

    #[test]
    fn test_check_reports_missing_and_corrupt() {
        let fx = Fixture::new();
        let good = Hash::digest(b"good");
        let bad = Hash::digest(b"bad");
        fx.store.insert(blob_key(&good), &b"good"[..]);
        fx.store.insert(blob_key(&bad), &b"not bad"[..]);

        let mut engine = BlobTransferEngine::without_manifest(&fx.index);
        assert_eq!(engine.check([good.to_hex()]).unwrap().blobs, vec![good]);

        let err = engine.check([bad.to_hex()]).unwrap_err();
        assert!(matches!(err.root(), Error::Integrity { .. }));

        let err = engine.check([Hash::digest(b"gone").to_hex()]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_put_without_manifest_is_an_error() {
        let fx = Fixture::new();
        let err = BlobTransferEngine::without_manifest(&fx.index)
            .put([hex(b"x")])
            .unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }
}
