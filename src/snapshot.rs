use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::state::AggregateState;
use crate::types::SequenceNumber;

/// Materialized state of an aggregate at a known version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub version: SequenceNumber,
    pub state: S,
}

/// Read side of a snapshot store. Writing snapshots is up to whoever owns the store: the
/// repository only reads them to shorten replays.
#[async_trait]
pub trait SnapshotStore<S>: Send + Sync {
    async fn get(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Option<Snapshot<S>>, SnapshotError>;
}

/// Snapshot store keeping the latest snapshot of every aggregate in memory.
pub struct InMemorySnapshotStore<S> {
    snapshots: Arc<RwLock<HashMap<(String, String), Snapshot<S>>>>,
}

impl<S> InMemorySnapshotStore<S>
where
    S: Clone,
{
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stores the snapshot unless a newer one is already there.
    pub fn save(&self, snapshot: Snapshot<S>) {
        let key = (snapshot.aggregate_type.clone(), snapshot.aggregate_id.clone());
        let mut guard = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);

        match guard.get(&key) {
            Some(current) if current.version >= snapshot.version => {}
            _ => {
                guard.insert(key, snapshot);
            }
        }
    }

    /// Snapshots the persisted part of the given aggregate. Pending events are ignored, since they
    /// are not in the event log yet.
    pub fn take_snapshot(&self, aggregate_state: &AggregateState<S>) {
        if !aggregate_state.pending_events().is_empty() {
            tracing::debug!(
                aggregate_id = aggregate_state.id(),
                "aggregate has pending events, snapshot skipped"
            );
            return;
        }

        self.save(Snapshot {
            aggregate_type: aggregate_state.aggregate_type().to_string(),
            aggregate_id: aggregate_state.id().to_string(),
            version: aggregate_state.persisted_version(),
            state: aggregate_state.inner().clone(),
        });
    }
}

impl<S> Default for InMemorySnapshotStore<S>
where
    S: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for InMemorySnapshotStore<S> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for InMemorySnapshotStore<S>
where
    S: Clone + Send + Sync,
{
    async fn get(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Option<Snapshot<S>>, SnapshotError> {
        let guard = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .get(&(aggregate_type.to_string(), aggregate_id.to_string()))
            .cloned())
    }
}
