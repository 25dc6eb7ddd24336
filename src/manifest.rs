//! Dataset manifest: which tracked file holds which content hash
//!
//! A manifest is derived data. [`Manifest::scan`] rebuilds it from the
//! dataset directory on every call, hashing each tracked file, so a file
//! modified behind our back is never reported under its old hash.
//! [`Manifest::save`] persists the mapping as `Manifest.json` so that files
//! missing locally can still be fetched by hash later.
//!
//! Tracked files are every regular file below the root except hidden
//! entries (any path component starting with `.`, which covers the `.data`
//! working directory) and the manifest file itself.

use crate::model::Hash;
use crate::util::write_atomic;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// File name of the persisted manifest, relative to the dataset root
pub const MANIFEST_FILE: &str = "Manifest.json";

#[derive(Serialize, Deserialize)]
struct ManifestFile {
    files: BTreeMap<String, Hash>,
}

/// Mapping from tracked paths (relative to the dataset root) to hashes
#[derive(Clone, Debug)]
pub struct Manifest {
    root: PathBuf,
    /// Sorted by path
    entries: Vec<(PathBuf, Hash)>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Forward-slash form used as the manifest key; `None` when a component
/// is not valid UTF-8
fn path_key(rel: &Path) -> Option<String> {
    rel.components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
}

fn is_relative_inside(rel: &Path) -> bool {
    !rel.as_os_str().is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Excluded directories relative to `root`. Directories outside the
/// dataset or not yet created cannot show up in a scan and are dropped.
fn relative_excludes(root: &Path, exclude: &[PathBuf]) -> Vec<PathBuf> {
    let canonical_root = match root.canonicalize() {
        Ok(root) => root,
        Err(_) => return Vec::new(),
    };
    exclude
        .iter()
        .filter_map(|dir| dir.canonicalize().ok())
        .filter_map(|dir| dir.strip_prefix(&canonical_root).ok().map(Path::to_path_buf))
        .filter(|rel| !rel.as_os_str().is_empty())
        .collect()
}

/// What a scan tracks and how it hashes
#[derive(Default)]
pub struct ScanOptions<'c> {
    /// Directories never tracked, such as a local blob store kept inside
    /// the dataset
    pub exclude: Vec<PathBuf>,
    /// Reuse hashes of unchanged files
    pub cache: Option<&'c mut HashCache>,
}

impl Manifest {
    /// Hash every tracked file under `root`
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        Self::scan_with_options(root, ScanOptions::default())
    }

    /// Like [`Manifest::scan`], reusing hashes from `cache` for files whose
    /// size and modification time are unchanged
    pub fn scan_cached(root: impl AsRef<Path>, cache: &mut HashCache) -> Result<Self> {
        Self::scan_with_options(
            root,
            ScanOptions {
                cache: Some(cache),
                ..Default::default()
            },
        )
    }

    pub fn scan_with_options(root: impl AsRef<Path>, options: ScanOptions<'_>) -> Result<Self> {
        let root = root.as_ref();
        let excluded = relative_excludes(root, &options.exclude);
        let mut cache = options.cache;

        let is_excluded = |entry: &DirEntry| {
            entry.file_type().is_dir()
                && entry
                    .path()
                    .strip_prefix(root)
                    .map(|rel| excluded.iter().any(|x| x == rel))
                    .unwrap_or(false)
        };
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(is_hidden(e) || is_excluded(e)));

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.depth() == 1 && entry.file_name() == MANIFEST_FILE {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| Error::Manifest(format!("{} escapes root", entry.path().display())))?
                .to_path_buf();
            let h = match cache.as_deref_mut() {
                Some(cache) => cache.hash_file(&rel, entry.path())?,
                None => hash_file(entry.path())?,
            };
            entries.push((rel, h));
        }
        entries.sort();

        debug!(root = %root.display(), files = entries.len(), "scanned dataset");
        Ok(Manifest {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Build a manifest from a known path → hash mapping. Later duplicates
    /// of a path win. Paths must be relative and stay inside `root`.
    pub fn from_entries<I, P>(root: impl AsRef<Path>, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, Hash)>,
        P: Into<PathBuf>,
    {
        let mut map = BTreeMap::new();
        for (path, hash) in entries {
            let path = path.into();
            if !is_relative_inside(&path) {
                return Err(Error::Manifest(format!(
                    "path outside dataset: {}",
                    path.display()
                )));
            }
            map.insert(path, hash);
        }
        Ok(Manifest {
            root: root.as_ref().to_path_buf(),
            entries: map.into_iter().collect(),
        })
    }

    /// Read `<root>/Manifest.json`
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let content = std::fs::read_to_string(Self::file_path(root))?;
        let file: ManifestFile =
            serde_json::from_str(&content).map_err(|e| Error::Manifest(e.to_string()))?;

        let mut entries = Vec::with_capacity(file.files.len());
        for (key, hash) in file.files {
            let rel = PathBuf::from(&key);
            if !is_relative_inside(&rel) {
                return Err(Error::Manifest(format!("path outside dataset: {}", key)));
            }
            entries.push((rel, hash));
        }
        entries.sort();

        Ok(Manifest {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// The persisted manifest if there is one, otherwise a fresh scan
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(root, ScanOptions::default())
    }

    /// Like [`Manifest::open`]; `options` only apply when falling back to a
    /// scan
    pub fn open_with_options(root: impl AsRef<Path>, options: ScanOptions<'_>) -> Result<Self> {
        let root = root.as_ref();
        if Self::file_path(root).exists() {
            Self::load(root)
        } else {
            Self::scan_with_options(root, options)
        }
    }

    /// Write the mapping to `<root>/Manifest.json`. Paths that are not
    /// valid UTF-8 cannot be named in JSON and are left out.
    pub fn save(&self) -> Result<()> {
        let mut files = BTreeMap::new();
        for (path, hash) in &self.entries {
            match path_key(path) {
                Some(key) => {
                    files.insert(key, *hash);
                }
                None => warn!(path = %path.display(), "leaving non UTF-8 path out of manifest"),
            }
        }
        let file = ManifestFile { files };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(&Self::file_path(&self.root), &mut json.as_slice())?;
        Ok(())
    }

    pub fn file_path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a tracked path
    pub fn absolute(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    pub fn entries(&self) -> &[(PathBuf, Hash)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tracked paths currently holding `hash`, in path order
    pub fn paths_for_hash(&self, hash: &Hash) -> Result<Vec<PathBuf>> {
        let paths: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, h)| h == hash)
            .map(|(p, _)| p.clone())
            .collect();

        if paths.is_empty() {
            return Err(Error::NotFound(format!("no tracked file has hash {}", hash)));
        }
        Ok(paths)
    }

    /// Distinct hashes of all tracked files, first-seen in path order
    pub fn all_hashes(&self) -> Vec<Hash> {
        crate::util::deduplicate(self.entries.iter().map(|(_, h)| *h))
    }

    pub fn hash_for_path(&self, rel: &Path) -> Option<Hash> {
        self.entries
            .binary_search_by(|(p, _)| p.as_path().cmp(rel))
            .ok()
            .map(|i| self.entries[i].1)
    }
}

/// Hash a file on disk
pub fn hash_file(path: &Path) -> Result<Hash> {
    let file = File::open(path)?;
    Ok(Hash::compute(BufReader::new(file))?)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheEntry {
    size: u64,
    mtime_secs: u64,
    mtime_nanos: u32,
    hash: Hash,
}

/// Persisted file-hash cache keyed by relative path.
///
/// An entry is trusted only while both size and modification time match
/// the file on disk; any mismatch rehashes the file and replaces the
/// entry. Entries not looked up since [`HashCache::open`] are dropped on
/// [`HashCache::save`].
pub struct HashCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    seen: HashSet<String>,
    hits: usize,
    misses: usize,
}

impl HashCache {
    /// Open the cache file at `path`. A missing or unreadable cache starts
    /// empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable hash cache");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        HashCache {
            path,
            entries,
            seen: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// The cache for a dataset, at `<root>/.data/hash-cache.bin`
    pub fn for_dataset(root: &Path) -> Self {
        Self::open(root.join(crate::config::DATA_DIR).join("hash-cache.bin"))
    }

    /// Hash `abs`, consulting the cache under the key `rel`
    pub fn hash_file(&mut self, rel: &Path, abs: &Path) -> Result<Hash> {
        let key = match path_key(rel) {
            Some(key) => key,
            None => return hash_file(abs),
        };
        self.seen.insert(key.clone());

        let meta = std::fs::metadata(abs)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok());

        if let (Some(mtime), Some(entry)) = (mtime, self.entries.get(&key)) {
            if entry.size == meta.len()
                && entry.mtime_secs == mtime.as_secs()
                && entry.mtime_nanos == mtime.subsec_nanos()
            {
                self.hits += 1;
                return Ok(entry.hash);
            }
        }

        self.misses += 1;
        let hash = hash_file(abs)?;
        match mtime {
            Some(mtime) => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        size: meta.len(),
                        mtime_secs: mtime.as_secs(),
                        mtime_nanos: mtime.subsec_nanos(),
                        hash,
                    },
                );
            }
            // no usable mtime: never cache
            None => {
                self.entries.remove(&key);
            }
        }
        Ok(hash)
    }

    pub fn save(&mut self) -> Result<()> {
        let seen = &self.seen;
        self.entries.retain(|k, _| seen.contains(k));
        let bytes = bincode::serialize(&self.entries)?;
        write_atomic(&self.path, &mut bytes.as_slice())?;
        Ok(())
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
