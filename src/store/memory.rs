use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::EventLogError;
use crate::message::Message;
use crate::store::EventLog;
use crate::types::SequenceNumber;

/// In-memory [`EventLog`] keeping every stream in a hash map.
///
/// The log is protected by an [`Arc`] that allows it to be cloneable still having the same memory
/// reference.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    streams: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored in the given stream, all aggregates included.
    pub fn len(&self, stream_name: &str) -> usize {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.get(stream_name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, stream_name: &str) -> bool {
        self.len(stream_name) == 0
    }
}

fn current_version(events: &[Message], aggregate_id: &str) -> SequenceNumber {
    events
        .iter()
        .filter(|event| event.aggregate_id() == Some(aggregate_id))
        .filter_map(Message::aggregate_version)
        .max()
        .unwrap_or(0)
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_to_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        events: Vec<Message>,
        expected_version: SequenceNumber,
    ) -> Result<(), EventLogError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let stream = streams.entry(stream_name.to_string()).or_default();

        let actual = current_version(stream, aggregate_id);
        if actual != expected_version {
            tracing::debug!(expected_version, actual, "version mismatch, rejecting append");
            return Err(EventLogError::VersionConflict {
                stream: stream_name.to_string(),
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        stream.extend(events);
        tracing::debug!("events appended to stream");
        Ok(())
    }

    async fn read_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        from_version: SequenceNumber,
    ) -> Result<Vec<Message>, EventLogError> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);

        let mut events: Vec<Message> = streams
            .get(stream_name)
            .into_iter()
            .flatten()
            .filter(|event| event.aggregate_id() == Some(aggregate_id))
            .filter(|event| match event.aggregate_version() {
                Some(version) => version >= from_version,
                None => from_version <= 1,
            })
            .cloned()
            .collect();

        events.sort_by_key(|event| event.aggregate_version());
        Ok(events)
    }

    fn read_all<'s>(&'s self, stream_name: &'s str) -> BoxStream<'s, Result<Message, EventLogError>> {
        let events: Vec<Message> = {
            let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
            streams.get(stream_name).cloned().unwrap_or_default()
        };

        stream::iter(events.into_iter().map(Ok)).boxed()
    }
}
