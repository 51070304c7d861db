/**
 * Per-Document Write Lanes
 *
 * Every mutation of a cached document runs under that document's async
 * mutex: read record → mutate chunks → append log → bump version →
 * write record. Broadcast happens after the lane is released. Lanes for
 * different documents are independent, so edits across documents run in
 * parallel.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Registry of per-document mutexes.
#[derive(Default)]
pub struct DocLanes {
    lanes: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl DocLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lane for one document, created on first use.
    pub fn lane(&self, doc_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut lanes = self.lanes.lock().expect("lane map poisoned");
        lanes.entry(doc_id).or_default().clone()
    }

    /// Drop the lane for a document that left the cache.
    pub fn remove(&self, doc_id: Uuid) {
        let mut lanes = self.lanes.lock().expect("lane map poisoned");
        lanes.remove(&doc_id);
    }
}
