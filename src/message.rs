use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::MessageError;
use crate::types::SequenceNumber;

/// Field name to value mapping carried by every message.
pub type Payload = Map<String, Value>;
/// Free form metadata attached to a message.
pub type Metadata = Map<String, Value>;

pub const CAUSATION_ID: &str = "causation_id";
pub const CAUSATION_NAME: &str = "causation_name";
pub const AGGREGATE_ID: &str = "aggregate_id";
pub const AGGREGATE_TYPE: &str = "aggregate_type";
pub const AGGREGATE_VERSION: &str = "aggregate_version";

/// A named message: commands and events share this representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Uniquely identifies the message. For a command this is the causation id of the events it
    /// produces.
    pub uuid: Uuid,
    pub name: String,
    pub payload: Payload,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns a single payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.metadata.get(CAUSATION_ID).and_then(Value::as_str)
    }

    pub fn causation_name(&self) -> Option<&str> {
        self.metadata.get(CAUSATION_NAME).and_then(Value::as_str)
    }

    pub fn aggregate_id(&self) -> Option<&str> {
        self.metadata.get(AGGREGATE_ID).and_then(Value::as_str)
    }

    pub fn aggregate_type(&self) -> Option<&str> {
        self.metadata.get(AGGREGATE_TYPE).and_then(Value::as_str)
    }

    /// The version this event gave to its aggregate, once recorded.
    pub fn aggregate_version(&self) -> Option<SequenceNumber> {
        self.metadata
            .get(AGGREGATE_VERSION)
            .and_then(Value::as_i64)
            .and_then(|version| SequenceNumber::try_from(version).ok())
    }

    /// Sets a metadata entry, replacing any previous value for the key.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Builds canonical messages out of a name, a payload and metadata. Used the same way for commands
/// and events.
pub trait MessageFactory: Send + Sync {
    fn create_from_name_and_fields(
        &self,
        name: &str,
        payload: Payload,
        metadata: Metadata,
    ) -> Result<Message, MessageError>;
}

/// Stamps a fresh v4 uuid and the current time on every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageFactory;

impl MessageFactory for DefaultMessageFactory {
    fn create_from_name_and_fields(
        &self,
        name: &str,
        payload: Payload,
        metadata: Metadata,
    ) -> Result<Message, MessageError> {
        if name.trim().is_empty() {
            return Err(MessageError::EmptyName);
        }

        Ok(Message {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            payload,
            metadata,
            created_at: Utc::now(),
        })
    }
}
