use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use typed_builder::TypedBuilder;

use crate::error::{BoxDynError, ProjectionError};
use crate::message::Message;

pub use dispatcher::ProjectionDispatcher;

mod dispatcher;

/// This trait is used to implement a `Projector`: the entity maintaining one read model out of
/// the events it is handed.
///
/// Events are delivered in event log order but possibly more than once, so `project` must be
/// idempotent.
#[async_trait]
pub trait Projector: Send + Sync {
    /// One-time preparation run before the first event, e.g. creating the target collection.
    async fn prepare_for_run(&self) -> Result<(), BoxDynError> {
        Ok(())
    }

    /// Projects one event onto the read model. An error halts the fan-out of that event.
    async fn project(&self, event: &Message) -> Result<(), BoxDynError>;

    /// Drops every piece of projected data.
    async fn delete(&self) -> Result<(), BoxDynError> {
        Ok(())
    }
}

/// Builds a fresh projector every time the dispatcher initializes.
pub type ProjectorFactory = Arc<dyn Fn() -> Box<dyn Projector> + Send + Sync>;

/// Wraps a closure building projectors into a [`ProjectorFactory`].
pub fn projector_factory<P, F>(build: F) -> ProjectorFactory
where
    P: Projector + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    Arc::new(move || Box::new(build()) as Box<dyn Projector>)
}

/// The stream a projection reads from. Only projections sourcing the local event log take part
/// in the local fan-out; foreign streams are consumed elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStream {
    Local(String),
    Foreign { service: String, stream: String },
}

impl SourceStream {
    pub fn local(stream: impl Into<String>) -> Self {
        SourceStream::Local(stream.into())
    }

    pub fn foreign(service: impl Into<String>, stream: impl Into<String>) -> Self {
        SourceStream::Foreign {
            service: service.into(),
            stream: stream.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SourceStream::Local(_))
    }

    pub fn stream_name(&self) -> &str {
        match self {
            SourceStream::Local(stream) | SourceStream::Foreign { stream, .. } => stream,
        }
    }
}

/// Resolved configuration of a projection: its name, the stream it subscribes to, which event
/// names it wants (all of them when empty) and how to build its projector.
#[derive(TypedBuilder, Clone)]
pub struct ProjectionDescriptor {
    #[builder(setter(into))]
    name: String,
    source: SourceStream,
    #[builder(default, setter(transform = |events: &[&str]| events.iter().map(|e| e.to_string()).collect::<HashSet<String>>()))]
    events: HashSet<String>,
    projector: ProjectorFactory,
}

impl ProjectionDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceStream {
        &self.source
    }
}

impl fmt::Debug for ProjectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionDescriptor")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("events", &self.events)
            .finish()
    }
}

/// A named projection unit: the subscription predicate of its descriptor plus the projector
/// doing the work.
pub struct ReadModel {
    name: String,
    source: SourceStream,
    events: HashSet<String>,
    projector: Box<dyn Projector>,
}

impl ReadModel {
    pub fn from_descriptor(descriptor: &ProjectionDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            source: descriptor.source.clone(),
            events: descriptor.events.clone(),
            projector: (descriptor.projector)(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the event, read from the given stream, concerns this read model.
    pub fn is_interested_in(&self, stream_name: &str, event: &Message) -> bool {
        self.source.is_local()
            && self.source.stream_name() == stream_name
            && (self.events.is_empty() || self.events.contains(event.name()))
    }

    pub async fn prepare_for_run(&self) -> Result<(), ProjectionError> {
        self.projector.prepare_for_run().await.map_err(|source| self.error(source))
    }

    pub async fn handle(&self, event: &Message) -> Result<(), ProjectionError> {
        self.projector.project(event).await.map_err(|source| self.error(source))
    }

    pub async fn delete(&self) -> Result<(), ProjectionError> {
        self.projector.delete().await.map_err(|source| self.error(source))
    }

    fn error(&self, source: BoxDynError) -> ProjectionError {
        ProjectionError::ReadModel {
            projection: self.name.clone(),
            source,
        }
    }
}

impl fmt::Debug for ReadModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadModel")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("events", &self.events)
            .finish()
    }
}
