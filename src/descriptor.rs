use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use typed_builder::TypedBuilder;

use crate::error::BoxDynError;
use crate::handler::CommandHandler;
use crate::message::Message;
use crate::recorder::EventRecorders;

/// Turns a canonical message into its custom in-memory representation.
pub type MessageAdapter = Arc<dyn Fn(Message) -> Result<Message, BoxDynError> + Send + Sync>;

/// Registry of the conversions available to descriptors, keyed by name. Command adapters are
/// referenced by descriptors through [`AggregateDescriptor::command_adapter`]; event adapters
/// apply to every event carrying the registered name.
#[derive(Clone, Default)]
pub struct MessageAdapters {
    commands: HashMap<String, MessageAdapter>,
    events: HashMap<String, MessageAdapter>,
}

impl MessageAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_command_adapter<F>(mut self, name: impl Into<String>, adapter: F) -> Self
    where
        F: Fn(Message) -> Result<Message, BoxDynError> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Arc::new(adapter));
        self
    }

    #[must_use]
    pub fn with_event_adapter<F>(mut self, event_name: impl Into<String>, adapter: F) -> Self
    where
        F: Fn(Message) -> Result<Message, BoxDynError> + Send + Sync + 'static,
    {
        self.events.insert(event_name.into(), Arc::new(adapter));
        self
    }

    pub fn command(&self, name: &str) -> Option<&MessageAdapter> {
        self.commands.get(name)
    }

    pub fn event(&self, event_name: &str) -> Option<&MessageAdapter> {
        self.events.get(event_name)
    }
}

impl fmt::Debug for MessageAdapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageAdapters")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolved description of how one command is processed: which aggregate it targets, where the
/// identifier lives in its payload, the handler it is routed to and the stream events go to.
///
/// ```ignore
/// let descriptor = AggregateDescriptor::builder()
///     .command_name("RegisterUser")
///     .aggregate_type("User")
///     .handler(CommandHandler::create(register_user))
///     .recorders(user_recorders.clone())
///     .build();
/// ```
#[derive(TypedBuilder)]
pub struct AggregateDescriptor<S> {
    #[builder(setter(into))]
    command_name: String,
    #[builder(setter(into))]
    aggregate_type: String,
    /// Payload field holding the aggregate identifier.
    #[builder(default = String::from("id"), setter(into))]
    identifier: String,
    #[builder(default = String::from("event_stream"), setter(into))]
    stream_name: String,
    handler: CommandHandler<S>,
    #[builder(setter(into))]
    recorders: Arc<EventRecorders<S>>,
    /// Name of the command adapter, registered in [`MessageAdapters`], turning the command into
    /// its custom representation before it reaches the handler.
    #[builder(default, setter(strip_option, into))]
    command_adapter: Option<String>,
}

impl<S> AggregateDescriptor<S> {
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn handler(&self) -> &CommandHandler<S> {
        &self.handler
    }

    pub fn recorders(&self) -> &Arc<EventRecorders<S>> {
        &self.recorders
    }

    pub fn command_adapter(&self) -> Option<&str> {
        self.command_adapter.as_deref()
    }

    pub fn creates_aggregate(&self) -> bool {
        self.handler.creates_aggregate()
    }
}

impl<S> Clone for AggregateDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            command_name: self.command_name.clone(),
            aggregate_type: self.aggregate_type.clone(),
            identifier: self.identifier.clone(),
            stream_name: self.stream_name.clone(),
            handler: self.handler.clone(),
            recorders: Arc::clone(&self.recorders),
            command_adapter: self.command_adapter.clone(),
        }
    }
}

impl<S> fmt::Debug for AggregateDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateDescriptor")
            .field("command_name", &self.command_name)
            .field("aggregate_type", &self.aggregate_type)
            .field("identifier", &self.identifier)
            .field("stream_name", &self.stream_name)
            .field("handler", &self.handler)
            .field("command_adapter", &self.command_adapter)
            .finish()
    }
}
