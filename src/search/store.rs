// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session-scoped key-value storage backing the result cache

use std::collections::HashMap;
use std::sync::RwLock;

/// Minimal string key-value store
///
/// The cache only needs get/set/delete plus key enumeration for sweeps, so
/// any session storage can sit behind it.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn delete(&self, key: &str);

    /// All keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Vec<String>;
}

/// In-process store, lives as long as the session that owns it
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value);
        }
    }

    fn delete(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    fn keys(&self, prefix: &str) -> Vec<String> {
        match self.entries.read() {
            Ok(entries) => entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
