//! Small helpers shared by stores and the transfer engine

use std::collections::HashSet;
use std::fs::{File, Permissions};
use std::hash::Hash;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Drop later duplicates, keeping first-seen order
pub fn deduplicate<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Stream `reader` into `path` through a temp file in the same directory,
/// renaming over the destination only once every byte is on disk.
/// Returns the number of bytes written.
pub fn write_atomic<R: Read + ?Sized>(path: &Path, reader: &mut R) -> io::Result<u64> {
    write_atomic_if(path, reader, |_| Ok::<(), io::Error>(()))
}

/// [`write_atomic`] with a last look at the fully drained reader: the
/// destination is only replaced if `accept` returns `Ok`.
///
/// A replaced file keeps its permissions. A new file gets the same mode a
/// plain create would give it (`0o666` less the umask on unix).
pub fn write_atomic_if<R, F, E>(path: &Path, reader: &mut R, accept: F) -> Result<u64, E>
where
    R: Read + ?Sized,
    F: FnOnce(&mut R) -> Result<(), E>,
    E: From<io::Error>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let existing = std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.permissions());

    let mut builder = tempfile::Builder::new();
    if existing.is_none() {
        if let Some(perms) = new_file_permissions() {
            builder.permissions(perms);
        }
    }
    let mut tmp = builder.tempfile_in(parent)?;
    let written = io::copy(reader, &mut tmp)?;
    accept(reader)?;
    tmp.as_file_mut().flush()?;
    if let Some(perms) = existing {
        tmp.as_file().set_permissions(perms)?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(written)
}

// tempfile defaults to 0o600; the umask still applies to this mode
#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}

/// In-process file copy, same atomicity as [`write_atomic`]
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(src)?);
    write_atomic(dst, &mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_deduplicate_keeps_first_seen_order() {
        let out = deduplicate(vec!["b", "a", "b", "c", "a"]);
        assert_eq!(out, vec!["b", "a", "c"]);
        assert!(deduplicate(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/file.bin");

        write_atomic(&path, &mut &b"first version, longer"[..]).unwrap();
        let n = write_atomic(&path, &mut &b"second"[..]).unwrap();

        assert_eq!(n, 6);
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "broken pipe"))
            }
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("never.bin");
        assert!(write_atomic(&path, &mut Broken).is_err());
        assert!(!path.exists());
        // temp file is cleaned up on drop
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rejected_write_keeps_destination() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"original").unwrap();

        let res = write_atomic_if(&path, &mut &b"replacement"[..], |_| {
            Err(io::Error::new(io::ErrorKind::InvalidData, "rejected"))
        });
        assert!(res.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_file_modes() {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;

        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, b"plain").unwrap();

        let fresh = dir.path().join("fresh");
        write_atomic(&fresh, &mut &b"fresh"[..]).unwrap();
        assert_eq!(mode(&fresh), mode(&plain));

        let kept = dir.path().join("kept");
        std::fs::write(&kept, b"old").unwrap();
        std::fs::set_permissions(&kept, Permissions::from_mode(0o640)).unwrap();
        write_atomic(&kept, &mut &b"new"[..]).unwrap();
        assert_eq!(mode(&kept), 0o640);
        assert_eq!(std::fs::read(&kept).unwrap(), b"new");
    }

    #[test]
    fn test_copy_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("sub/b.txt");
        std::fs::write(&src, b"payload").unwrap();

        copy_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }
}
