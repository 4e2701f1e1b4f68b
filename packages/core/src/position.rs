use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Derive the position hash for a new nesting level from the value of the
/// enclosing level. Only consistency within one process matters.
pub fn hash_position(value: u64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(value);
    hasher.finish()
}
