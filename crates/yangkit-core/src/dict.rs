//! Refcounted string dictionary.
//!
//! Every schema identifier, prefix, namespace URI, description, and attribute
//! value is interned here. Two interned strings are equal exactly when their
//! [`StrId`]s are equal; the rest of the library relies on this and never
//! compares string contents for interned values.
//!
//! Each `insert` must be paired with a `remove` when the referencing structure
//! is destroyed; the slot is freed once its refcount reaches zero.

use crate::ids::StrId;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// FxHash-style hash function for strings.
///
/// Fast, non-cryptographic hash with good distribution.
#[inline]
fn hash_str(s: &str) -> u64 {
    const K: u64 = 0x517c_c1b7_2722_0a95;
    let mut hash = 0u64;
    for byte in s.bytes() {
        hash = hash.rotate_left(5) ^ u64::from(byte);
        hash = hash.wrapping_mul(K);
    }
    hash
}

/// An occupied dictionary slot.
#[derive(Clone, Debug)]
struct Entry {
    value: Box<str>,
    refcount: u32,
}

/// String dictionary with hash-based deduplication and per-string refcounts.
///
/// Lookup uses a hash+verify scheme: the dedup table maps `hash(string)` to a
/// short list of candidate `StrId`s (almost always one), which are verified
/// against actual slot content. Freed slots are recycled through a free list,
/// so a `StrId` stays valid exactly as long as some live structure holds a
/// reference to it.
#[derive(Clone, Debug, Default)]
pub struct Dict {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    /// hash(string) -> candidate StrIds; collisions resolved by verify.
    dedup: BTreeMap<u64, Vec<StrId>>,
}

impl Dict {
    /// Create a new empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its identifier and incrementing its
    /// refcount. The string is copied only on first occurrence.
    #[allow(clippy::missing_panics_doc)] // Panic only on slot overflow (>4B strings)
    pub fn insert(&mut self, s: &str) -> StrId {
        let hash = hash_str(s);
        if let Some(candidates) = self.dedup.get(&hash) {
            for &id in candidates {
                if let Some(entry) = self.slots[id.to_index()].as_ref() {
                    if &*entry.value == s {
                        self.slots[id.to_index()].as_mut().unwrap().refcount += 1;
                        return id;
                    }
                }
            }
        }

        let entry = Entry {
            value: s.into(),
            refcount: 1,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        let id = StrId::from_index(idx).expect("too many strings");
        self.dedup.entry(hash).or_default().push(id);
        id
    }

    /// Take another reference to an already-interned string.
    ///
    /// Equivalent to `insert(get(id))` without the content hash.
    ///
    /// # Panics
    ///
    /// Panics if the id has been freed.
    pub fn dup(&mut self, id: StrId) -> StrId {
        let entry = self.slots[id.to_index()]
            .as_mut()
            .expect("dup of freed string");
        entry.refcount += 1;
        id
    }

    /// Release one reference. The slot is freed when the refcount hits zero.
    ///
    /// Releasing an already-freed id is a no-op.
    pub fn remove(&mut self, id: StrId) {
        let idx = id.to_index();
        let Some(Some(entry)) = self.slots.get_mut(idx) else {
            return;
        };
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return;
        }

        let hash = hash_str(&entry.value);
        self.slots[idx] = None;
        self.free.push(idx);
        if let Some(candidates) = self.dedup.get_mut(&hash) {
            candidates.retain(|&c| c != id);
            if candidates.is_empty() {
                self.dedup.remove(&hash);
            }
        }
    }

    /// Get an interned string.
    ///
    /// Returns an empty string for a freed or invalid id.
    #[must_use]
    pub fn get(&self, id: StrId) -> &str {
        self.slots
            .get(id.to_index())
            .and_then(|slot| slot.as_ref())
            .map_or("", |entry| &entry.value)
    }

    /// Find a string's id without interning it.
    #[must_use]
    pub fn find(&self, s: &str) -> Option<StrId> {
        let candidates = self.dedup.get(&hash_str(s))?;
        for &id in candidates {
            if let Some(entry) = self.slots[id.to_index()].as_ref() {
                if &*entry.value == s {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Get the current refcount of an interned string (0 if freed).
    #[must_use]
    pub fn refcount(&self, id: StrId) -> u32 {
        self.slots
            .get(id.to_index())
            .and_then(|slot| slot.as_ref())
            .map_or(0, |entry| entry.refcount)
    }

    /// Number of live interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Check if the dictionary holds no live strings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
