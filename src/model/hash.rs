//! Content-addressed hash type using SHA-1

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Length of a hash in hex characters
pub const HASH_HEX_LEN: usize = 40;

/// Number of hex characters shown by [`Hash::short`]
pub const SHORT_HASH_LEN: usize = 7;

/// Checks whether a string is a well-formed hash: exactly 40 hex digits,
/// either case.
pub fn is_valid_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Display prefix of a hash string. Never use it as a lookup key.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// A 20-byte SHA-1 digest identifying a blob
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 20]);

impl Hash {
    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Hash(bytes)
    }

    /// Hash an in-memory buffer
    pub fn digest(data: &[u8]) -> Self {
        Hash::from_digest(&Sha1::digest(data))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut arr = [0u8; 20];
        arr.copy_from_slice(digest);
        Hash(arr)
    }

    /// Read a stream to its end and hash everything read
    pub fn compute<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(Hash::from_digest(&hasher.finalize()))
    }

    /// Parse a hash string. Uppercase digits are accepted and normalized.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if !is_valid_hash(s) {
            return Err(crate::Error::InvalidHash(s.to_string()));
        }
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr).map_err(|_| crate::Error::InvalidHash(s.to_string()))?;
        Ok(Hash(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form, the only form used in store keys
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..SHORT_HASH_LEN].to_string()
    }
}

/// Reader adapter that hashes everything passing through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha1,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        HashingReader {
            inner,
            hasher: Sha1::new(),
        }
    }

    /// Hash of the bytes read so far
    pub fn hash(&self) -> Hash {
        Hash::from_digest(&self.hasher.clone().finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

impl FromStr for Hash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Hash::parse(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Hex strings on the wire so manifests stay human-readable
impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_hash() {
        assert!(is_valid_hash(&"a".repeat(40)));
        assert!(is_valid_hash(&"AbCdEf0123".repeat(4)));
        assert!(!is_valid_hash(&"g".repeat(40)));
        assert!(!is_valid_hash("abc"));
        assert!(!is_valid_hash(&"a".repeat(41)));
        assert!(!is_valid_hash(""));
        // multi-byte chars must not sneak past a byte-length check
        assert!(!is_valid_hash(&format!("{}é", "a".repeat(38))));
    }

    #[test]
    fn test_known_sha1() {
        let h = Hash::compute(&b"hello world"[..]).unwrap();
        assert_eq!(h.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");

        let empty = Hash::compute(io::empty()).unwrap();
        assert_eq!(empty.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_compute_matches_digest() {
        let data = vec![7u8; 200_000];
        assert_eq!(Hash::compute(&data[..]).unwrap(), Hash::digest(&data));
        assert_ne!(Hash::digest(b"hello"), Hash::digest(b"world"));
    }

    #[test]
    fn test_hashing_reader() {
        let mut reader = HashingReader::new(&b"hello world"[..]);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink, b"hello world");
        assert_eq!(reader.hash(), Hash::digest(b"hello world"));
    }

    #[test]
    fn test_parse_normalizes_case() {
        let upper = "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED";
        let h = Hash::parse(upper).unwrap();
        assert_eq!(h.to_hex(), upper.to_ascii_lowercase());
        assert!(Hash::parse("not-a-hash").is_err());
    }

    #[test]
    fn test_short() {
        let h = Hash::digest(b"test");
        assert_eq!(h.short().len(), 7);
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash(&h.to_hex()), h.short());
    }

    #[test]
    fn test_serde_as_hex() {
        let h = Hash::digest(b"x");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
