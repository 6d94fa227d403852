//! Stable object uuids for export.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

use crate::error::{FbxError, Result};

const SHORT_UUID_MODULO: i64 = 1_000_000_000;

/// Assigns each key a unique non-negative int64 uuid, derived from the key's
/// hash so the same keys map to the same uuids from one export to the next.
///
/// Keys are hashed with [`DefaultHasher`], whose output is only fixed for a
/// given Rust release. A binary built with another toolchain may assign
/// different uuids to the same keys.
#[derive(Debug, Clone)]
pub struct UuidRegistry<K> {
    by_key: HashMap<K, i64>,
    by_uuid: HashMap<i64, K>,
}

impl<K> Default for UuidRegistry<K> {
    fn default() -> Self {
        UuidRegistry { by_key: HashMap::new(), by_uuid: HashMap::new() }
    }
}

impl<K: Hash + Eq + Clone + Debug> UuidRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The uuid of `key`, allocating one on first use.
    pub fn uuid(&mut self, key: &K) -> Result<i64> {
        if let Some(&uuid) = self.by_key.get(key) {
            return Ok(uuid);
        }
        let uuid = self.allocate(key)?;
        self.by_key.insert(key.clone(), uuid);
        self.by_uuid.insert(uuid, key.clone());
        Ok(uuid)
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        self.by_key.get(key).copied()
    }

    /// The key a uuid was generated for.
    pub fn key(&self, uuid: i64) -> Option<&K> {
        self.by_uuid.get(&uuid)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn allocate(&self, key: &K) -> Result<i64> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // uuids are signed in files, keep them below 2^63.
        let hash = hasher.finish();
        let mut uuid = (if hash >= 1 << 63 { hash / 2 } else { hash }) as i64;

        if uuid > SHORT_UUID_MODULO {
            let short = uuid % SHORT_UUID_MODULO;
            if !self.by_uuid.contains_key(&short) {
                uuid = short;
            }
        }

        let step = if uuid < 1 << 62 { 1 } else { -1 };
        while self.by_uuid.contains_key(&uuid) {
            uuid = uuid
                .checked_add(step)
                .filter(|&u| u >= 0)
                .ok_or_else(|| FbxError::UuidExhausted(format!("{:?}", key)))?;
        }
        Ok(uuid)
    }
}
