use std::ops::Deref;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::EventLogError;
use crate::message::Message;
use crate::types::SequenceNumber;

pub use memory::InMemoryEventLog;

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// An EventLog is the append-only storage the pipeline persists events into, and reads the
/// history of aggregates from.
///
/// A stream holds the events of many aggregates: every event carries the `aggregate_id` and
/// `aggregate_version` metadata the log filters and checks against.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends the events of one aggregate, in a single all-or-nothing operation.
    ///
    /// The append succeeds only if the current version of the aggregate in the stream equals
    /// `expected_version`; otherwise it must fail with [`EventLogError::VersionConflict`] and
    /// leave the stream untouched. Appending no events is a no-op and always succeeds.
    async fn append_to_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        events: Vec<Message>,
        expected_version: SequenceNumber,
    ) -> Result<(), EventLogError>;

    /// Loads the events of one aggregate with a version greater or equal to `from_version`,
    /// ordered by version.
    async fn read_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        from_version: SequenceNumber,
    ) -> Result<Vec<Message>, EventLogError>;

    /// Streams every event of the stream, in append order. This should be mainly used to rebuild
    /// read models.
    fn read_all<'s>(&'s self, stream_name: &'s str) -> BoxStream<'s, Result<Message, EventLogError>>;
}

/// Blanket implementation making an [`EventLog`] every (smart) pointer to an [`EventLog`],
/// e.g. `&Log`, `Box<Log>`, `Arc<Log>`.
#[async_trait]
impl<L, T> EventLog for T
where
    L: EventLog + ?Sized + 'static,
    T: Deref<Target = L> + Send + Sync,
{
    /// Deref call to [`EventLog::append_to_stream`].
    async fn append_to_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        events: Vec<Message>,
        expected_version: SequenceNumber,
    ) -> Result<(), EventLogError> {
        self.deref()
            .append_to_stream(stream_name, aggregate_id, events, expected_version)
            .await
    }

    /// Deref call to [`EventLog::read_stream`].
    async fn read_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        from_version: SequenceNumber,
    ) -> Result<Vec<Message>, EventLogError> {
        self.deref().read_stream(stream_name, aggregate_id, from_version).await
    }

    /// Deref call to [`EventLog::read_all`].
    fn read_all<'s>(&'s self, stream_name: &'s str) -> BoxStream<'s, Result<Message, EventLogError>> {
        self.deref().read_all(stream_name)
    }
}
