use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::gateway::merge_shallow;
use crate::{Collection, Document, DocumentGateway, PersistenceError, Result};

#[derive(Debug, Default)]
struct GatewayState {
    /// Documents per collection, with an insertion sequence for stable ordering.
    collections: HashMap<Collection, BTreeMap<String, (u64, Document)>>,
    counters: HashMap<String, u64>,
    next_seq: u64,
}

/// In-memory document gateway.
///
/// Provides the same interface as the PostgreSQL implementation and is the
/// default backend for tests and local runs. Writes can be made to fail on
/// demand to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentGateway {
    state: Arc<RwLock<GatewayState>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryDocumentGateway {
    /// Creates a new empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent write to fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of documents in a collection.
    pub async fn document_count(&self, collection: Collection) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns the current value of a counter (0 if unset).
    pub async fn counter_value(&self, name: &str) -> u64 {
        self.state
            .read()
            .await
            .counters
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "write rejected by in-memory gateway".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentGateway for InMemoryDocumentGateway {
    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let mut docs: Vec<_> = state
            .collections
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by_key(|(seq, _)| *seq);
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn put(&self, collection: Collection, id: &str, body: serde_json::Value) -> Result<()> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        state.next_seq += 1;
        let seq = state.next_seq;

        let docs = state.collections.entry(collection).or_default();
        // Replacing keeps the original position
        let seq = docs.get(id).map_or(seq, |(existing, _)| *existing);
        docs.insert(
            id.to_string(),
            (
                seq,
                Document {
                    id: id.to_string(),
                    body,
                    updated_at: Utc::now(),
                },
            ),
        );
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        let (_, doc) = state
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PersistenceError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        merge_shallow(&mut doc.body, patch);
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        Ok(state
            .collections
            .get_mut(&collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn clear(&self, collection: Collection) -> Result<usize> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        Ok(state
            .collections
            .remove(&collection)
            .map_or(0, |docs| docs.len()))
    }

    async fn increment_counter(&self, name: &str) -> Result<u64> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        let value = state.counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn reset_counter(&self, name: &str) -> Result<()> {
        self.check_writable()?;

        self.state.write().await.counters.remove(name);
        Ok(())
    }
}
