use crate::error::CommandError;
use crate::message::{Message, AGGREGATE_ID, AGGREGATE_TYPE, AGGREGATE_VERSION};
use crate::recorder::EventRecorders;
use crate::types::SequenceNumber;

/// The internal state of an aggregate instance, together with its identity, the version it had
/// when loaded and the events recorded on it that still wait to be persisted.
///
/// The inner state is only ever produced by folding events through the [`EventRecorders`].
#[derive(Debug, Clone)]
pub struct AggregateState<S> {
    aggregate_type: String,
    id: String,
    persisted_version: SequenceNumber,
    inner: S,
    recorded: Vec<Message>,
}

impl<S> AggregateState<S>
where
    S: Default,
{
    /// Creates an empty aggregate at version 0.
    pub fn new(aggregate_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::with_inner(aggregate_type, id, S::default(), 0)
    }

    /// Replays the given history, in order, onto this instance.
    ///
    /// The persisted version becomes the highest `aggregate_version` found among the events. Events
    /// missing that metadata count as the next version.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::Configuration`] if an event has no apply function.
    pub fn apply_events(
        mut self,
        events: impl IntoIterator<Item = Message>,
        recorders: &EventRecorders<S>,
    ) -> Result<Self, CommandError> {
        for event in events {
            let apply = recorders.recorder(event.name())?;
            let version = event.aggregate_version().unwrap_or(self.persisted_version + 1);

            self.inner = apply(std::mem::take(&mut self.inner), &event);
            if version > self.persisted_version {
                self.persisted_version = version;
            }
        }

        Ok(self)
    }

    /// Records a freshly produced event: stamps the aggregate metadata on it, applies it onto the
    /// state and keeps it pending until the aggregate is saved.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::Configuration`] if the event has no apply function. In that
    /// case the state is left as it was.
    pub fn record_that(&mut self, event: Message, recorders: &EventRecorders<S>) -> Result<&Message, CommandError> {
        let apply = recorders.recorder(event.name())?;
        let event = event
            .with_metadata(AGGREGATE_ID, self.id.as_str())
            .with_metadata(AGGREGATE_TYPE, self.aggregate_type.as_str())
            .with_metadata(AGGREGATE_VERSION, self.next_sequence_number());

        self.inner = apply(std::mem::take(&mut self.inner), &event);
        self.recorded.push(event);

        Ok(&self.recorded[self.recorded.len() - 1])
    }
}

impl<S> AggregateState<S> {
    /// Creates an instance out of an already materialized state, e.g. a snapshot.
    pub fn with_inner(
        aggregate_type: impl Into<String>,
        id: impl Into<String>,
        inner: S,
        persisted_version: SequenceNumber,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.into(),
            persisted_version,
            inner,
            recorded: vec![],
        }
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Version of the aggregate in the event log, i.e. before any pending event.
    pub fn persisted_version(&self) -> SequenceNumber {
        self.persisted_version
    }

    /// Number of events ever applied, pending ones included.
    pub fn version(&self) -> SequenceNumber {
        self.persisted_version + self.recorded.len() as SequenceNumber
    }

    pub fn next_sequence_number(&self) -> SequenceNumber {
        self.version() + 1
    }

    /// Events recorded since the aggregate was loaded or created, in emission order.
    pub fn pending_events(&self) -> &[Message] {
        &self.recorded
    }

    pub(crate) fn take_pending_events(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.recorded)
    }

    pub(crate) fn mark_persisted(&mut self, count: usize) {
        self.persisted_version += count as SequenceNumber;
    }
}
