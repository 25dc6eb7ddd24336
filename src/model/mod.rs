//! Core value types for datadex

mod handle;
mod hash;

pub use handle::Handle;
pub use hash::{is_valid_hash, short_hash, Hash, HashingReader, HASH_HEX_LEN, SHORT_HASH_LEN};
