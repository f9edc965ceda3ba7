//! The hash extension module, providing the hashers and map aliases used
//! across the workspace.

use std::hash::Hash;

use siphasher::sip128::{Hasher128, SipHasher13};

/// The `BuildHasher` for [`FxHasher`].
pub type FxBuildHasher = std::hash::BuildHasherDefault<FxHasher>;
pub use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

/// A dashmap that uses the FxHasher as the underlying hasher.
pub type FxDashMap<K, V> = dashmap::DashMap<K, V, FxBuildHasher>;
/// An insertion-ordered map that uses the FxHasher as the underlying hasher.
pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;

/// Calculate a 128-bit siphash of a value.
#[inline]
pub fn hash128<T: Hash>(value: &T) -> u128 {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    state.finish128().as_u128()
}

/// A convenience function for when you need a quick 64-bit hash.
#[inline]
pub fn hash64<T: Hash + ?Sized>(v: &T) -> u64 {
    use std::hash::Hasher;
    let mut state = FxHasher::default();
    v.hash(&mut state);
    state.finish()
}

pub use fxhash::hash32;
