use std::sync::Arc;

use crate::descriptor::AggregateDescriptor;
use crate::error::{CommandError, EventLogError};
use crate::message::Message;
use crate::recorder::EventRecorders;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::state::AggregateState;
use crate::store::EventLog;
use crate::types::SequenceNumber;

/// The AggregateRepository couples one aggregate type with the [`EventLog`]: it reconstructs
/// aggregate instances by applying their history sequentially, and persists newly recorded events
/// with an expected-version check.
///
/// The basic APIs are:
/// 1. load
/// 2. save
pub struct AggregateRepository<S> {
    aggregate_type: String,
    stream_name: String,
    recorders: Arc<EventRecorders<S>>,
    event_log: Arc<dyn EventLog>,
    snapshot_store: Option<Arc<dyn SnapshotStore<S>>>,
}

impl<S> AggregateRepository<S>
where
    S: Default + Send + Sync,
{
    /// Creates a new instance of an [`AggregateRepository`].
    pub fn new(
        aggregate_type: impl Into<String>,
        stream_name: impl Into<String>,
        recorders: Arc<EventRecorders<S>>,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            stream_name: stream_name.into(),
            recorders,
            event_log,
            snapshot_store: None,
        }
    }

    /// Creates the repository of the aggregate type targeted by the given descriptor.
    pub fn for_descriptor(descriptor: &AggregateDescriptor<S>, event_log: Arc<dyn EventLog>) -> Self {
        Self::new(
            descriptor.aggregate_type(),
            descriptor.stream_name(),
            Arc::clone(descriptor.recorders()),
            event_log,
        )
    }

    /// Snapshots found in the store are used as the starting point of replays.
    #[must_use]
    pub fn with_snapshot_store(mut self, snapshot_store: Arc<dyn SnapshotStore<S>>) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn recorders(&self) -> &EventRecorders<S> {
        &self.recorders
    }

    /// Loads an aggregate instance from the event log, by applying previously persisted events
    /// onto the aggregate state by order of their version. When a snapshot is available only the
    /// events after it are replayed.
    ///
    /// A snapshot is trusted only if the log holds the event at exactly the snapshotted version.
    /// Otherwise it is stale and the full history is replayed.
    ///
    /// Returns `None` if the aggregate has no history at all.
    pub async fn load(&self, aggregate_id: &str) -> Result<Option<AggregateState<S>>, CommandError> {
        if let Some(snapshot) = self.snapshot(aggregate_id).await {
            let events: Vec<Message> = self.read_from(aggregate_id, snapshot.version).await?;

            if events.first().and_then(Message::aggregate_version) == Some(snapshot.version) {
                let aggregate_state =
                    AggregateState::with_inner(&self.aggregate_type, aggregate_id, snapshot.state, snapshot.version);
                return Ok(Some(
                    aggregate_state.apply_events(events.into_iter().skip(1), &self.recorders)?,
                ));
            }

            tracing::warn!(
                aggregate_type = %self.aggregate_type,
                aggregate_id,
                snapshot_version = snapshot.version,
                "snapshot does not match the event log, replaying the full history"
            );
        }

        let events: Vec<Message> = self.read_from(aggregate_id, 1).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let aggregate_state: AggregateState<S> = AggregateState::new(&self.aggregate_type, aggregate_id);
        Ok(Some(aggregate_state.apply_events(events, &self.recorders)?))
    }

    /// Appends the pending events of the aggregate to the event log, expecting the aggregate to
    /// be still at the version it had before they were recorded. The append happens even when
    /// there is nothing pending.
    ///
    /// Pending events are consumed: on failure they are discarded, on success the persisted
    /// version moves forward and the events are returned.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::ConcurrencyConflict`] if another writer advanced the
    /// aggregate in the meantime.
    #[tracing::instrument(skip_all, fields(aggregate_type = %self.aggregate_type, aggregate_id = %aggregate_state.id()), err)]
    pub async fn save(&self, aggregate_state: &mut AggregateState<S>) -> Result<Vec<Message>, CommandError> {
        let expected_version = aggregate_state.persisted_version();
        let events = aggregate_state.take_pending_events();
        let count = events.len();

        self.event_log
            .append_to_stream(&self.stream_name, aggregate_state.id(), events.clone(), expected_version)
            .await
            .map_err(|error| match error {
                EventLogError::VersionConflict { expected, actual, .. } => CommandError::ConcurrencyConflict {
                    aggregate_type: self.aggregate_type.clone(),
                    aggregate_id: aggregate_state.id().to_string(),
                    expected,
                    actual,
                },
                other => CommandError::EventLog(other),
            })?;

        aggregate_state.mark_persisted(count);
        tracing::debug!(event_count = count, version = aggregate_state.persisted_version(), "aggregate saved");

        Ok(events)
    }

    async fn read_from(&self, aggregate_id: &str, from_version: SequenceNumber) -> Result<Vec<Message>, CommandError> {
        self.event_log
            .read_stream(&self.stream_name, aggregate_id, from_version)
            .await
            .map_err(CommandError::EventLog)
    }

    async fn snapshot(&self, aggregate_id: &str) -> Option<Snapshot<S>> {
        let snapshot_store = self.snapshot_store.as_ref()?;

        match snapshot_store.get(&self.aggregate_type, aggregate_id).await {
            Ok(snapshot) => snapshot.filter(|snapshot| snapshot.version > 0),
            Err(error) => {
                tracing::warn!(
                    aggregate_type = %self.aggregate_type,
                    aggregate_id,
                    error = ?error,
                    "snapshot store failed, replaying the full history"
                );
                None
            }
        }
    }
}

impl<S> std::fmt::Debug for AggregateRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate_type", &self.aggregate_type)
            .field("stream_name", &self.stream_name)
            .field("recorders", &self.recorders)
            .field("snapshots", &self.snapshot_store.is_some())
            .finish()
    }
}
