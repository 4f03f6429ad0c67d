//! Transactional core of a cqrs/es runtime.
//!
//! A [`CommandProcessor`] turns a command into events: it loads (or creates) the aggregate through
//! an [`AggregateRepository`], runs the configured handler, normalizes what the handler emitted
//! with the [`EventNormalizer`], records the events on the [`AggregateState`] and appends them to
//! the [`EventLog`] with an expected-version check.
//!
//! Persisted events are fanned out to read models by the [`ProjectionDispatcher`].

pub use crate::context::ContextProvider;
pub use crate::descriptor::{AggregateDescriptor, MessageAdapters};
pub use crate::error::{CommandError, EventLogError, ProjectionError, SnapshotError};
pub use crate::handler::{CommandHandler, EventPayload, HandlerOutput, PayloadAdapter, RawEvent};
pub use crate::message::{DefaultMessageFactory, Message, MessageFactory, Metadata, Payload};
pub use crate::normalizer::EventNormalizer;
pub use crate::processor::CommandProcessor;
pub use crate::projection::{ProjectionDescriptor, ProjectionDispatcher, Projector, ReadModel, SourceStream};
pub use crate::recorder::EventRecorders;
pub use crate::repository::AggregateRepository;
pub use crate::router::{CommandRouter, HandleCommand};
pub use crate::snapshot::{InMemorySnapshotStore, Snapshot, SnapshotStore};
pub use crate::state::AggregateState;
pub use crate::store::EventLog;

pub mod context;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod message;
pub mod normalizer;
pub mod processor;
pub mod projection;
pub mod recorder;
pub mod repository;
pub mod router;
pub mod snapshot;
pub mod state;
pub mod store;

pub mod types {
    /// Position of an event within its aggregate instance. The first event of an aggregate has
    /// sequence number 1.
    pub type SequenceNumber = i32;
}
