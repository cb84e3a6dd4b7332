// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! In-memory protocol state: single-use nonces and the `state` → request map.
//!
//! Both types serialize writes per key and are safe to share across concurrent protocol runs;
//! an embedding service wanting durability would replace them behind the same interface.

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    sync::{Mutex, RwLock},
};

/// Issues single-use nonce values.
///
/// A nonce is recorded on creation and consumed by the first successful
/// [`verify_and_remove`][NonceService::verify_and_remove]; every later call for the same value
/// returns `false`.
#[derive(Debug, Default)]
pub struct NonceService {
    active: Mutex<HashSet<String>>,
}

impl NonceService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and record a fresh UUID-v4 nonce.
    pub fn create(&self) -> String {
        let nonce = uuid::Uuid::new_v4().to_string();
        self.record(nonce.clone());
        nonce
    }

    /// Record an externally supplied nonce value.
    pub fn record(&self, nonce: String) {
        self.active
            .lock()
            .expect("nonce service lock poisoned")
            .insert(nonce);
    }

    /// Whether `nonce` was active; consumes it either way it was present.
    pub fn verify_and_remove(&self, nonce: &str) -> bool {
        self.active
            .lock()
            .expect("nonce service lock poisoned")
            .remove(nonce)
    }
}

/// A bounded, concurrent `K` → `V` map with no ordering guarantees.
#[derive(Debug)]
pub struct MapStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
    capacity: usize,
}

/// The default entry bound of a [`MapStore`].
const DEFAULT_CAPACITY: usize = 1 << 16;

impl<K, V> Default for MapStore<K, V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<K, V> MapStore<K, V> {
    /// An empty store with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }
}

impl<K: Eq + Hash, V: Clone> MapStore<K, V> {
    /// Insert a value, returning the previous one for the key, if any.
    ///
    /// When the store is full, the insert of a *new* key is refused and `Err` returns the
    /// value to the caller.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>, V> {
        let mut entries = self.entries.write().expect("map store lock poisoned");

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            return Err(value);
        }

        Ok(entries.insert(key, value))
    }

    /// A snapshot of the value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .expect("map store lock poisoned")
            .get(key)
            .cloned()
    }

    /// Remove and return the value for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries
            .write()
            .expect("map store lock poisoned")
            .remove(key)
    }
}
