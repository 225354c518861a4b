//! Collection aliases tuned for the mesh kernel.
//!
//! All internal maps key on slotmap keys or small integers and never see
//! attacker-controlled data, so the non-cryptographic `FxHasher` is used
//! throughout. Cavity and facet scratch buffers are stack-allocated up to a
//! small inline capacity.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

/// Fast `HashMap` for internal, trusted keys.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Fast `HashSet` for internal, trusted keys.
pub type FastHashSet<T> = FxHashSet<T>;

/// Re-export of the map Entry API for check-and-insert patterns.
pub use std::collections::hash_map::Entry;

/// Stack-first growable buffer; spills to the heap past `N` elements.
///
/// Size guidelines: `N = 4` for per-tetrahedron face work, `N = 16` for
/// cavity boundaries, `N = 32` for edge rings and incident-tet walks.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Arena storage for mesh entities.
///
/// Slot reuse after removal is the free list required by the entity
/// lifecycle; key versioning means a stale key can never alias a
/// reallocated slot.
pub type StorageMap<K, V> = SlotMap<K, V>;
