use std::sync::Arc;

use serde_json::Value;

use crate::context::ContextProvider;
use crate::descriptor::{AggregateDescriptor, MessageAdapter, MessageAdapters};
use crate::error::CommandError;
use crate::handler::CommandHandler;
use crate::message::{Message, MessageFactory};
use crate::normalizer::EventNormalizer;
use crate::repository::AggregateRepository;
use crate::state::AggregateState;

/// The CommandProcessor runs one command end-to-end against the aggregate its descriptor
/// targets: it loads or creates the aggregate, invokes the handler, records the normalized events
/// and saves the aggregate.
///
/// Exactly one of these happens for every command: the produced events are persisted, no event is
/// produced and nothing is persisted, or an error is returned and nothing is persisted.
pub struct CommandProcessor<S> {
    descriptor: AggregateDescriptor<S>,
    repository: AggregateRepository<S>,
    normalizer: EventNormalizer,
    context_provider: Option<Arc<dyn ContextProvider>>,
    command_adapter: Option<MessageAdapter>,
}

impl<S> CommandProcessor<S>
where
    S: Default + Send + Sync,
{
    /// Creates a new instance of a [`CommandProcessor`], using the default message factory.
    pub fn new(descriptor: AggregateDescriptor<S>, repository: AggregateRepository<S>) -> Self {
        Self {
            descriptor,
            repository,
            normalizer: EventNormalizer::default(),
            context_provider: None,
            command_adapter: None,
        }
    }

    #[must_use]
    pub fn with_message_factory(mut self, factory: Arc<dyn MessageFactory>) -> Self {
        self.normalizer = EventNormalizer::new(factory);
        self
    }

    #[must_use]
    pub fn with_context_provider(mut self, context_provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(context_provider);
        self
    }

    /// Resolves the command adapter named by the descriptor, and installs the event adapters.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::Configuration`] if the descriptor names a command adapter
    /// missing from the registry.
    pub fn with_message_adapters(mut self, adapters: &MessageAdapters) -> Result<Self, CommandError> {
        if let Some(name) = self.descriptor.command_adapter() {
            let adapter = adapters.command(name).ok_or_else(|| {
                CommandError::Configuration(format!(
                    "command adapter `{}` of `{}` is not registered",
                    name,
                    self.descriptor.command_name()
                ))
            })?;
            self.command_adapter = Some(Arc::clone(adapter));
        }

        self.normalizer = self.normalizer.with_adapters(adapters.clone());
        Ok(self)
    }

    pub fn descriptor(&self) -> &AggregateDescriptor<S> {
        &self.descriptor
    }

    pub fn repository(&self) -> &AggregateRepository<S> {
        &self.repository
    }

    /// Handles the command and returns the events persisted because of it, in emission order.
    #[tracing::instrument(skip_all, fields(command = %command.name(), command_id = %command.uuid()), err)]
    pub async fn process(&self, command: Message) -> Result<Vec<Message>, CommandError> {
        if command.name() != self.descriptor.command_name() {
            return Err(CommandError::RoutingMismatch {
                expected: self.descriptor.command_name().to_string(),
                actual: command.name().to_string(),
            });
        }

        let aggregate_id = identifier_of(&command, self.descriptor.identifier())?;
        let command = self.adapt(command)?;
        let context = self.context(&command).await?;

        let (mut aggregate_state, output) = match self.descriptor.handler() {
            CommandHandler::Create(handler) => {
                let aggregate_state: AggregateState<S> =
                    AggregateState::new(self.descriptor.aggregate_type(), aggregate_id);
                let output = handler(&command, context.as_ref()).map_err(|source| CommandError::Handler {
                    command: command.name().to_string(),
                    source,
                })?;
                (aggregate_state, output)
            }
            CommandHandler::Mutate(handler) => {
                let aggregate_state =
                    self.repository
                        .load(&aggregate_id)
                        .await?
                        .ok_or_else(|| CommandError::AggregateNotFound {
                            aggregate_type: self.descriptor.aggregate_type().to_string(),
                            aggregate_id: aggregate_id.clone(),
                        })?;
                let output = handler(aggregate_state.inner(), &command, context.as_ref()).map_err(|source| {
                    CommandError::Handler {
                        command: command.name().to_string(),
                        source,
                    }
                })?;
                (aggregate_state, output)
            }
        };

        for raw_event in self.normalizer.unfold(output, command.name())? {
            let event = self.normalizer.normalize(raw_event, command.name(), command.uuid())?;
            aggregate_state.record_that(event, self.descriptor.recorders())?;
        }

        tracing::debug!(
            aggregate_id = aggregate_state.id(),
            event_count = aggregate_state.pending_events().len(),
            "command handled"
        );

        self.repository.save(&mut aggregate_state).await
    }

    fn adapt(&self, command: Message) -> Result<Message, CommandError> {
        match (&self.command_adapter, self.descriptor.command_adapter()) {
            (Some(adapter), _) => adapter(command).map_err(|error| {
                CommandError::Configuration(format!("command adapter of `{}` failed: {}", self.descriptor.command_name(), error))
            }),
            (None, Some(name)) => Err(CommandError::Configuration(format!(
                "command adapter `{}` of `{}` was never resolved",
                name,
                self.descriptor.command_name()
            ))),
            (None, None) => Ok(command),
        }
    }

    async fn context(&self, command: &Message) -> Result<Option<Value>, CommandError> {
        match &self.context_provider {
            Some(provider) => provider
                .provide(command)
                .await
                .map(Some)
                .map_err(|source| CommandError::Context {
                    command: command.name().to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }
}

/// Reads the aggregate identifier out of the command payload. Strings and integers are accepted.
fn identifier_of(command: &Message, field: &str) -> Result<String, CommandError> {
    match command.get(field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) if id.is_i64() || id.is_u64() => Ok(id.to_string()),
        _ => Err(CommandError::MissingIdentifier {
            command: command.name().to_string(),
            field: field.to_string(),
        }),
    }
}

impl<S> std::fmt::Debug for CommandProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("descriptor", &self.descriptor)
            .field("repository", &self.repository)
            .field("context_provider", &self.context_provider.is_some())
            .finish()
    }
}
