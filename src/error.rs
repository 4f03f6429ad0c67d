use crate::types::SequenceNumber;

/// Boxed error produced by user supplied code: handlers, adapters, context providers and projectors.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way the processing of a single command can fail. None of these are retried internally:
/// they are returned to whoever submitted the command, and the event log is left untouched.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// The command reached a processor configured for another command.
    #[error("command `{actual}` routed to the processor of `{expected}`")]
    RoutingMismatch { expected: String, actual: String },
    /// No processor is registered for the command name.
    #[error("no processor registered for command `{0}`")]
    UnknownCommand(String),
    #[error("command `{command}` carries no aggregate identifier in field `{field}`")]
    MissingIdentifier { command: String, field: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("aggregate `{aggregate_type}` with id `{aggregate_id}` not found")]
    AggregateNotFound {
        aggregate_type: String,
        aggregate_id: String,
    },
    /// The handler returned a value instead of a sequence of events.
    #[error("handler of command `{command}` did not produce a sequence of events")]
    ProtocolViolation { command: String },
    #[error("malformed event emitted by the handler of `{command}`: {reason}")]
    EventShape { command: String, reason: String },
    #[error("metadata of event `{event}` must be a mapping")]
    MetadataType { event: String },
    /// Another writer appended events to the aggregate after it was loaded.
    #[error(
        "concurrency conflict on `{aggregate_type}` `{aggregate_id}`: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: String,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },
    /// The handler rejected the command.
    #[error("command `{command}` rejected: {source}")]
    Handler {
        command: String,
        #[source]
        source: BoxDynError,
    },
    #[error("context provider failed for command `{command}`: {source}")]
    Context {
        command: String,
        #[source]
        source: BoxDynError,
    },
    #[error(transparent)]
    Message(#[from] MessageError),
    /// Failure of the event log other than a version conflict.
    #[error("event log failure: {0}")]
    EventLog(#[source] EventLogError),
}

#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    #[error("message name cannot be empty")]
    EmptyName,
}

#[derive(thiserror::Error, Debug)]
pub enum EventLogError {
    /// The expected-version check failed on append.
    #[error("stream `{stream}`: aggregate `{aggregate_id}` expected at version {expected}, found {actual}")]
    VersionConflict {
        stream: String,
        aggregate_id: String,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },
    #[error("invalid or unknown stream name `{0}`")]
    InvalidStreamName(String),
    /// Sql error
    #[cfg(feature = "sql")]
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    /// Serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Custom(BoxDynError),
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Custom(BoxDynError),
}

#[derive(thiserror::Error, Debug)]
pub enum ProjectionError {
    /// A read model failed to prepare, handle an event or delete its data.
    #[error("read model `{projection}` failed: {source}")]
    ReadModel {
        projection: String,
        #[source]
        source: BoxDynError,
    },
    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

