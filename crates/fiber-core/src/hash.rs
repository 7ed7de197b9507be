//! Hashing helpers shared by props storage and hook dependency keys.
//!
//! The `std-hash` feature swaps ahash/hashbrown for the standard library
//! implementations, which keeps dependency keys stable across processes.

use std::hash::{Hash, Hasher};

use crate::Key;

#[cfg(not(feature = "std-hash"))]
type KeyHasher = ahash::AHasher;
#[cfg(feature = "std-hash")]
type KeyHasher = std::collections::hash_map::DefaultHasher;

#[cfg(not(feature = "std-hash"))]
pub type Map<K, V> = hashbrown::HashMap<K, V>;
#[cfg(feature = "std-hash")]
pub type Map<K, V> = std::collections::HashMap<K, V>;

/// Hashes a single value into a dependency key.
#[inline]
pub fn hash_key<T: Hash + ?Sized>(value: &T) -> Key {
    let mut hasher = KeyHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
