/*!
 * In-Memory Tuple Storage
 *
 * The raw key to value mapping behind the tuple space. `Dict` itself is not
 * synchronized; [`crate::space::TupleSpace`] owns it behind the guard that
 * makes each method below one atomic step.
 */

use crate::error::SpaceError;
use smol_str::SmolStr;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

// AHash for fast lookups on short string keys
type AHash = BuildHasherDefault<ahash::AHasher>;

/// Key to value mapping with tuple space semantics
///
/// A key present in the map has exactly one value. There are no tombstones:
/// a removed key is simply absent.
#[derive(Default)]
pub struct Dict {
    pub(crate) inner: HashMap<SmolStr, String, AHash>,
}

/// Sizes of the stored tuples at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeSummary {
    pub tuples: usize,
    pub key_bytes: usize,
    pub value_bytes: usize,
}

impl SizeSummary {
    pub fn is_empty(&self) -> bool {
        self.tuples == 0
    }

    pub fn avg_key_size(&self) -> f64 {
        average(self.key_bytes, self.tuples)
    }

    pub fn avg_value_size(&self) -> f64 {
        average(self.value_bytes, self.tuples)
    }

    /// Average of key plus value length
    pub fn avg_tuple_size(&self) -> f64 {
        average(self.key_bytes + self.value_bytes, self.tuples)
    }
}

// Zero, not NaN, for an empty space.
fn average(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

impl Dict {
    /// Value stored under `k`, left in place
    #[inline]
    pub fn read(&self, k: &str) -> Result<&str, SpaceError> {
        self.inner
            .get(k)
            .map(String::as_str)
            .ok_or_else(|| SpaceError::NotFound(SmolStr::new(k)))
    }

    /// Take the value stored under `k` out of the map
    #[inline]
    pub fn remove(&mut self, k: &str) -> Result<String, SpaceError> {
        self.inner
            .remove(k)
            .ok_or_else(|| SpaceError::NotFound(SmolStr::new(k)))
    }

    /// Store `v` under `k` unless `k` is already present
    ///
    /// The existing value is never replaced.
    #[inline]
    pub fn insert(&mut self, k: SmolStr, v: String) -> Result<(), SpaceError> {
        match self.inner.entry(k) {
            Entry::Occupied(e) => Err(SpaceError::AlreadyExists(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(v);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Walk every tuple and total up key and value lengths in bytes
    pub fn summary(&self) -> SizeSummary {
        self.inner.iter().fold(
            SizeSummary {
                tuples: self.inner.len(),
                ..SizeSummary::default()
            },
            |mut s, (k, v)| {
                s.key_bytes += k.len();
                s.value_bytes += v.len();
                s
            },
        )
    }
}
