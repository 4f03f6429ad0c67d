use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::descriptor::MessageAdapters;
use crate::error::CommandError;
use crate::handler::{EventPayload, HandlerOutput, RawEvent};
use crate::message::{DefaultMessageFactory, Message, MessageFactory, Metadata, Payload, CAUSATION_ID, CAUSATION_NAME};

/// Turns what a command handler emitted into canonical events carrying causation metadata.
///
/// Metadata precedence, lowest first: the `metadata` mapping of an adapted payload, the explicit
/// metadata of the emitted item, the causation fields. Causation fields always win.
#[derive(Clone)]
pub struct EventNormalizer {
    factory: Arc<dyn MessageFactory>,
    adapters: MessageAdapters,
}

impl EventNormalizer {
    pub fn new(factory: Arc<dyn MessageFactory>) -> Self {
        Self {
            factory,
            adapters: MessageAdapters::default(),
        }
    }

    /// Event adapters from the registry are run on every event carrying their name.
    #[must_use]
    pub fn with_adapters(mut self, adapters: MessageAdapters) -> Self {
        self.adapters = adapters;
        self
    }

    /// Flattens the handler output into the ordered list of emitted items, dropping the empty
    /// ones.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::ProtocolViolation`] if the output is not a sequence and a
    /// [`CommandError::EventShape`] if an untyped item is not a `[name, payload, metadata?]` tuple.
    pub fn unfold(&self, output: HandlerOutput, command_name: &str) -> Result<Vec<RawEvent>, CommandError> {
        match output {
            HandlerOutput::Events(items) => Ok(items.into_iter().flatten().collect()),
            HandlerOutput::Value(Value::Array(items)) => {
                let mut events = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(event) = parse_tuple(item, command_name)? {
                        events.push(event);
                    }
                }
                Ok(events)
            }
            HandlerOutput::Value(_) => Err(CommandError::ProtocolViolation {
                command: command_name.to_string(),
            }),
        }
    }

    /// Builds the canonical event for one emitted item.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::EventShape`] if the name is empty or the payload is not a
    /// mapping, a [`CommandError::MetadataType`] if metadata is present but not a mapping.
    pub fn normalize(&self, raw: RawEvent, command_name: &str, causation_id: Uuid) -> Result<Message, CommandError> {
        let RawEvent { name, payload, metadata } = raw;

        if name.trim().is_empty() {
            return Err(shape_error(command_name, "event name cannot be empty".to_string()));
        }

        let (payload, mut merged): (Payload, Metadata) = match payload {
            EventPayload::Raw(Value::Object(payload)) => (payload, Metadata::new()),
            EventPayload::Raw(other) => {
                return Err(shape_error(
                    command_name,
                    format!("payload of `{}` must be a mapping, found {}", name, kind_of(&other)),
                ))
            }
            EventPayload::Adapted(adapter) => {
                let mut mapping = adapter.to_mapping();
                let payload = match mapping.remove("payload") {
                    Some(Value::Object(payload)) => payload,
                    Some(_) => {
                        return Err(shape_error(
                            command_name,
                            format!("adapted payload of `{}` must be a mapping", name),
                        ))
                    }
                    None => {
                        return Err(shape_error(
                            command_name,
                            format!("adapter of `{}` produced no `payload` entry", name),
                        ))
                    }
                };
                (payload, metadata_mapping(mapping.remove("metadata"), &name)?)
            }
        };

        merged.extend(metadata_mapping(metadata, &name)?);

        let event = self
            .factory
            .create_from_name_and_fields(&name, payload, stamp_causation(merged, command_name, causation_id))?;

        let event = match self.adapters.event(&name) {
            Some(adapter) => {
                let adapted = adapter(event).map_err(|error| {
                    shape_error(command_name, format!("event adapter of `{}` failed: {}", name, error))
                })?;
                let metadata = stamp_causation(adapted.metadata, command_name, causation_id);
                Message { metadata, ..adapted }
            }
            None => event,
        };

        Ok(event)
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultMessageFactory))
    }
}

impl std::fmt::Debug for EventNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNormalizer").field("adapters", &self.adapters).finish()
    }
}

fn stamp_causation(mut metadata: Metadata, command_name: &str, causation_id: Uuid) -> Metadata {
    metadata.insert(CAUSATION_ID.to_string(), Value::String(causation_id.to_string()));
    metadata.insert(CAUSATION_NAME.to_string(), Value::String(command_name.to_string()));
    metadata
}

fn metadata_mapping(metadata: Option<Value>, event_name: &str) -> Result<Metadata, CommandError> {
    match metadata {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(metadata)) => Ok(metadata),
        Some(_) => Err(CommandError::MetadataType {
            event: event_name.to_string(),
        }),
    }
}

fn parse_tuple(item: Value, command_name: &str) -> Result<Option<RawEvent>, CommandError> {
    if is_empty_item(&item) {
        return Ok(None);
    }

    let mut parts = match item {
        Value::Array(parts) if parts.len() == 2 || parts.len() == 3 => parts.into_iter(),
        other => {
            return Err(shape_error(
                command_name,
                format!("expected a [name, payload, metadata?] tuple, found {}", kind_of(&other)),
            ))
        }
    };

    let name = match parts.next() {
        Some(Value::String(name)) => name,
        _ => return Err(shape_error(command_name, "event name must be a string".to_string())),
    };
    let payload = parts.next().unwrap_or(Value::Null);
    let event = RawEvent::new(name, payload);

    Ok(Some(match parts.next() {
        Some(metadata) => event.with_metadata(metadata),
        None => event,
    }))
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` stand for "no event".
fn is_empty_item(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::Bool(value) => !value,
        Value::Number(value) => value.as_f64() == Some(0.0),
        Value::String(value) => value.is_empty(),
        Value::Array(values) => values.is_empty(),
        Value::Object(values) => values.is_empty(),
    }
}

fn shape_error(command_name: &str, reason: String) -> CommandError {
    CommandError::EventShape {
        command: command_name.to_string(),
        reason,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
