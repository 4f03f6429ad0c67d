use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;

use esrs_pipeline::store::InMemoryEventLog;
use esrs_pipeline::types::SequenceNumber;
use esrs_pipeline::{EventLog, EventLogError, Message};

/// In-memory log recording the size of every append it receives.
#[derive(Clone, Default)]
pub struct CountingEventLog {
    pub inner: InMemoryEventLog,
    pub appends: Arc<Mutex<Vec<usize>>>,
}

impl CountingEventLog {
    pub fn appends(&self) -> Vec<usize> {
        self.appends.lock().unwrap().clone()
    }

    pub async fn events(&self, stream_name: &str, aggregate_id: &str) -> Vec<Message> {
        self.inner.read_stream(stream_name, aggregate_id, 1).await.unwrap()
    }
}

#[async_trait]
impl EventLog for CountingEventLog {
    async fn append_to_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        events: Vec<Message>,
        expected_version: SequenceNumber,
    ) -> Result<(), EventLogError> {
        self.appends.lock().unwrap().push(events.len());
        self.inner
            .append_to_stream(stream_name, aggregate_id, events, expected_version)
            .await
    }

    async fn read_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        from_version: SequenceNumber,
    ) -> Result<Vec<Message>, EventLogError> {
        self.inner.read_stream(stream_name, aggregate_id, from_version).await
    }

    fn read_all<'s>(&'s self, stream_name: &'s str) -> BoxStream<'s, Result<Message, EventLogError>> {
        self.inner.read_all(stream_name)
    }
}
