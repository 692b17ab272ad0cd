//! Open addressing hash table keyed by interned strings.
//!
//! Linear probing with tombstones. Used both for the globals (name to value) and the
//! string intern set (name to `nil`).

use super::value::{ObjRef, Value};

const MIN_CAPACITY: usize = 8;

/// An interned string reference together with its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub object: ObjRef,
    pub hash: u32,
}

#[derive(Debug, Clone, Copy, Default)]
enum Bucket {
    #[default]
    Empty,
    Tombstone,
    Full(Key, Value),
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    buckets: Vec<Bucket>,
    // full buckets plus tombstones, drives the load factor
    count: usize,
    len: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the bucket holding `key`, or of the bucket it should be inserted into.
    ///
    /// Needs at least one empty bucket to terminate, which the load factor guarantees.
    fn find_bucket(buckets: &[Bucket], key: Key) -> usize {
        let mask = buckets.len() - 1;
        let mut index = key.hash as usize & mask;
        let mut tombstone = None;
        loop {
            match buckets[index] {
                Bucket::Empty => return tombstone.unwrap_or(index),
                Bucket::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Bucket::Full(k, _) if k.object == key.object => return index,
                Bucket::Full(..) => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// Rehashes into a table sized for the live entries, at most half full afterwards.
    ///
    /// Only `len` counts, so a table that filled up with tombstones is rebuilt at its
    /// current size (or smaller) instead of doubling.
    fn grow(&mut self) {
        let mut capacity = MIN_CAPACITY;
        while (self.len + 1) * 2 > capacity {
            capacity *= 2;
        }
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::Empty; capacity]);
        // tombstones are not carried over
        self.count = 0;
        for bucket in old {
            if let Bucket::Full(key, value) = bucket {
                let index = Self::find_bucket(&self.buckets, key);
                self.buckets[index] = Bucket::Full(key, value);
                self.count += 1;
            }
        }
    }

    pub fn get(&self, key: Key) -> Option<Value> {
        if self.len == 0 {
            return None;
        }
        match self.buckets[Self::find_bucket(&self.buckets, key)] {
            Bucket::Full(_, value) => Some(value),
            _ => None,
        }
    }

    /// Inserts or overwrites. Returns `true` if the key was not present before.
    pub fn set(&mut self, key: Key, value: Value) -> bool {
        if (self.count + 1) * 4 > self.buckets.len() * 3 {
            self.grow();
        }
        let index = Self::find_bucket(&self.buckets, key);
        let is_new = match self.buckets[index] {
            Bucket::Empty => {
                self.count += 1;
                true
            }
            // reused tombstones are already counted
            Bucket::Tombstone => true,
            Bucket::Full(..) => false,
        };
        if is_new {
            self.len += 1;
        }
        self.buckets[index] = Bucket::Full(key, value);
        is_new
    }

    /// Removes `key`, leaving a tombstone. Returns `true` if it was present.
    pub fn delete(&mut self, key: Key) -> bool {
        if self.len == 0 {
            return false;
        }
        let index = Self::find_bucket(&self.buckets, key);
        if let Bucket::Full(..) = self.buckets[index] {
            self.buckets[index] = Bucket::Tombstone;
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Looks up a key by content instead of identity.
    ///
    /// Probes the buckets for `hash` and asks `matches` about every candidate with the
    /// same hash. This is how a string that is not a heap object yet is interned.
    pub fn find_string(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.len == 0 {
            return None;
        }
        let mask = self.buckets.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match self.buckets[index] {
                Bucket::Empty => return None,
                Bucket::Full(key, _) if key.hash == hash && matches(key.object) => {
                    return Some(key.object)
                }
                Bucket::Tombstone | Bucket::Full(..) => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// Deletes every entry for which `keep` returns `false`.
    pub fn retain(&mut self, mut keep: impl FnMut(Key, Value) -> bool) {
        for bucket in self.buckets.iter_mut() {
            if let Bucket::Full(key, value) = *bucket {
                if !keep(key, value) {
                    *bucket = Bucket::Tombstone;
                    self.len -= 1;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, Value)> + '_ {
        self.buckets.iter().filter_map(|bucket| match bucket {
            Bucket::Full(key, value) => Some((*key, *value)),
            _ => None,
        })
    }
}
