use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::Instrument;

use crate::error::ProjectionError;
use crate::message::Message;
use crate::projection::{ProjectionDescriptor, ReadModel};
use crate::store::EventLog;

/// Fans every event of the ordered event stream out to the read models interested in it, and
/// owns their lifecycle.
///
/// Read models are built from their descriptors on `init`; only the ones sourcing a local stream
/// are registered. `handle` may be called concurrently, while `init`, `reset` and `delete` are
/// expected to be serialized against it by the caller.
pub struct ProjectionDispatcher {
    descriptors: Vec<ProjectionDescriptor>,
    read_models: RwLock<Vec<ReadModel>>,
    initialized: AtomicBool,
}

impl ProjectionDispatcher {
    pub fn new(descriptors: Vec<ProjectionDescriptor>) -> Self {
        Self {
            descriptors,
            read_models: RwLock::new(vec![]),
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether `init` ran since the dispatcher was created or last deleted.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Names of the registered read models, in registration order.
    pub async fn read_models(&self) -> Vec<String> {
        self.read_models
            .read()
            .await
            .iter()
            .map(|read_model| read_model.name().to_string())
            .collect()
    }

    /// Builds every local read model and runs its one-time preparation.
    pub async fn init(&self) -> Result<(), ProjectionError> {
        let mut read_models = self.read_models.write().await;
        self.initialize(&mut read_models).await
    }

    /// Hands the event, read from the given stream, to every interested read model in
    /// registration order. Initializes the dispatcher first if needed.
    ///
    /// The first failing read model halts the fan-out: the following ones do not get the event.
    pub async fn handle(&self, stream_name: &str, event: &Message) -> Result<(), ProjectionError> {
        if !self.is_initialized() {
            let mut read_models = self.read_models.write().await;
            if !self.is_initialized() {
                self.initialize(&mut read_models).await?;
            }
        }

        let read_models = self.read_models.read().await;
        for read_model in read_models
            .iter()
            .filter(|read_model| read_model.is_interested_in(stream_name, event))
        {
            let span = tracing::debug_span!(
                "esrs.read_model",
                event_id = %event.uuid(),
                event_name = event.name(),
                read_model = read_model.name()
            );

            if let Err(error) = read_model.handle(event).instrument(span).await {
                tracing::error!({
                    event_id = %event.uuid(),
                    read_model = read_model.name(),
                    error = ?error,
                }, "read model failed to handle event");

                return Err(error);
            }
        }

        Ok(())
    }

    /// Drops the projected data of every read model, which get rebuilt lazily on the next event.
    pub async fn reset(&self) -> Result<(), ProjectionError> {
        tracing::info!("resetting read models");
        self.delete().await
    }

    /// Asks every registered read model to drop its projected data, and leaves the dispatcher
    /// uninitialized.
    pub async fn delete(&self) -> Result<(), ProjectionError> {
        let mut read_models = self.read_models.write().await;
        if read_models.is_empty() {
            *read_models = self.build();
        }

        self.initialized.store(false, Ordering::SeqCst);

        for read_model in read_models.iter() {
            read_model.delete().await?;
        }

        read_models.clear();
        Ok(())
    }

    /// Resets every read model and replays the whole stream from the event log into them.
    pub async fn rebuild(&self, event_log: &dyn EventLog, stream_name: &str) -> Result<(), ProjectionError> {
        self.reset().await?;
        self.init().await?;

        let mut events = event_log.read_all(stream_name);
        let mut count: usize = 0;
        while let Some(event) = events.next().await {
            self.handle(stream_name, &event?).await?;
            count += 1;
        }

        tracing::info!(stream_name, event_count = count, "read models rebuilt");
        Ok(())
    }

    async fn initialize(&self, read_models: &mut Vec<ReadModel>) -> Result<(), ProjectionError> {
        let built = self.build();
        for read_model in &built {
            read_model.prepare_for_run().await?;
        }

        *read_models = built;
        self.initialized.store(true, Ordering::SeqCst);
        tracing::debug!(read_model_count = read_models.len(), "projection dispatcher initialized");

        Ok(())
    }

    fn build(&self) -> Vec<ReadModel> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.source().is_local())
            .map(ReadModel::from_descriptor)
            .collect()
    }
}

impl std::fmt::Debug for ProjectionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionDispatcher")
            .field("descriptors", &self.descriptors)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
