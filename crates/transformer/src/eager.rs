//! Per-request eager-load cache.

use darkroom_metadata::TransformIndexRow;
use std::collections::HashMap;

/// Validated index rows preloaded for a batch of (transform, asset)
/// combinations, keyed by combined fingerprint (`assetId:geometry[:format]`).
///
/// This is an explicit context object the caller threads through the
/// request, not coordinator state: it lives exactly as long as the batch
/// operation that built it.
#[derive(Debug, Default)]
pub struct EagerCache {
    entries: HashMap<String, TransformIndexRow>,
}

impl EagerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&TransformIndexRow> {
        self.entries.get(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: String, row: TransformIndexRow) {
        self.entries.insert(fingerprint, row);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
