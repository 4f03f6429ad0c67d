use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::BoxDynError;
use crate::message::{Message, Payload};

/// A message object able to describe itself as a mapping.
///
/// The mapping must carry a `payload` mapping and may carry a `metadata` mapping.
pub trait PayloadAdapter: Send + Sync {
    fn to_mapping(&self) -> Payload;
}

/// What a handler puts in the payload slot of an emitted event.
pub enum EventPayload {
    /// A plain mapping. Any other json value is rejected on normalization.
    Raw(Value),
    /// An object turned into payload (and optionally metadata) through [`PayloadAdapter::to_mapping`].
    Adapted(Box<dyn PayloadAdapter>),
}

impl From<Payload> for EventPayload {
    fn from(payload: Payload) -> Self {
        EventPayload::Raw(Value::Object(payload))
    }
}

impl From<Value> for EventPayload {
    fn from(value: Value) -> Self {
        EventPayload::Raw(value)
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            EventPayload::Adapted(_) => f.write_str("Adapted(..)"),
        }
    }
}

/// An event as emitted by a command handler, before normalization: a name, a payload and
/// optional metadata.
#[derive(Debug)]
pub struct RawEvent {
    pub(crate) name: String,
    pub(crate) payload: EventPayload,
    pub(crate) metadata: Option<Value>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, payload: impl Into<EventPayload>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            metadata: None,
        }
    }

    pub fn adapted(name: impl Into<String>, adapter: impl PayloadAdapter + 'static) -> Self {
        Self::new(name, EventPayload::Adapted(Box::new(adapter)))
    }

    /// Explicit metadata for the event. It is merged on top of the adapter metadata, but can
    /// never replace the causation fields.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<Value>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a command handler hands back to the processor.
#[derive(Debug)]
pub enum HandlerOutput {
    /// Ordered emitted items. `None` stands for "no event" and is skipped.
    Events(Vec<Option<RawEvent>>),
    /// Untyped output. Only a json array of `[name, payload, metadata?]` tuples is accepted, any
    /// other value is a protocol violation. Falsy items (`null`, `false`, `0`, `""`, `[]`, `{}`)
    /// are skipped.
    Value(Value),
}

impl HandlerOutput {
    /// No event at all.
    pub fn none() -> Self {
        HandlerOutput::Events(vec![])
    }

    pub fn events(events: impl IntoIterator<Item = RawEvent>) -> Self {
        HandlerOutput::Events(events.into_iter().map(Some).collect())
    }
}

impl From<RawEvent> for HandlerOutput {
    fn from(event: RawEvent) -> Self {
        HandlerOutput::Events(vec![Some(event)])
    }
}

impl From<Vec<RawEvent>> for HandlerOutput {
    fn from(events: Vec<RawEvent>) -> Self {
        HandlerOutput::events(events)
    }
}

impl From<Vec<Option<RawEvent>>> for HandlerOutput {
    fn from(events: Vec<Option<RawEvent>>) -> Self {
        HandlerOutput::Events(events)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Value(value)
    }
}

/// Handler of an aggregate-creating command: gets the command and the optional context.
pub type CreateFn = Arc<dyn Fn(&Message, Option<&Value>) -> Result<HandlerOutput, BoxDynError> + Send + Sync>;
/// Handler of a command on an existing aggregate: gets its current state as well.
pub type MutateFn<S> = Arc<dyn Fn(&S, &Message, Option<&Value>) -> Result<HandlerOutput, BoxDynError> + Send + Sync>;

/// The function a command is routed to. The variant tells whether the command creates a new
/// aggregate or works on an existing one.
pub enum CommandHandler<S> {
    Create(CreateFn),
    Mutate(MutateFn<S>),
}

impl<S> CommandHandler<S> {
    pub fn create<F>(handler: F) -> Self
    where
        F: Fn(&Message, Option<&Value>) -> Result<HandlerOutput, BoxDynError> + Send + Sync + 'static,
    {
        CommandHandler::Create(Arc::new(handler))
    }

    pub fn mutate<F>(handler: F) -> Self
    where
        F: Fn(&S, &Message, Option<&Value>) -> Result<HandlerOutput, BoxDynError> + Send + Sync + 'static,
    {
        CommandHandler::Mutate(Arc::new(handler))
    }

    pub fn creates_aggregate(&self) -> bool {
        matches!(self, CommandHandler::Create(_))
    }
}

impl<S> Clone for CommandHandler<S> {
    fn clone(&self) -> Self {
        match self {
            CommandHandler::Create(handler) => CommandHandler::Create(Arc::clone(handler)),
            CommandHandler::Mutate(handler) => CommandHandler::Mutate(Arc::clone(handler)),
        }
    }
}

impl<S> fmt::Debug for CommandHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandHandler::Create(_) => f.write_str("CommandHandler::Create"),
            CommandHandler::Mutate(_) => f.write_str("CommandHandler::Mutate"),
        }
    }
}
