use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use esrs_pipeline::error::BoxDynError;
use esrs_pipeline::projection::projector_factory;
use esrs_pipeline::{Message, ProjectionDescriptor, Projector, SourceStream};

/// Read model of the current name of every user, keyed by aggregate id. Shared between the
/// projector instances the dispatcher builds so tests can look at it.
#[derive(Clone, Default)]
pub struct UsernamesView {
    pub names: Arc<Mutex<HashMap<String, String>>>,
    pub deletes: Arc<Mutex<i32>>,
}

impl UsernamesView {
    pub fn name(&self, aggregate_id: &str) -> Option<String> {
        self.names.lock().unwrap().get(aggregate_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap().len()
    }

    pub fn deletes(&self) -> i32 {
        *self.deletes.lock().unwrap()
    }

    pub fn descriptor(&self, name: &str, source: SourceStream) -> ProjectionDescriptor {
        let view = self.clone();
        ProjectionDescriptor::builder()
            .name(name)
            .source(source)
            .events(&["UserWasRegistered", "UsernameWasChanged"])
            .projector(projector_factory(move || UsernamesProjector { view: view.clone() }))
            .build()
    }
}

pub struct UsernamesProjector {
    view: UsernamesView,
}

#[async_trait]
impl Projector for UsernamesProjector {
    async fn project(&self, event: &Message) -> Result<(), BoxDynError> {
        let aggregate_id = event.aggregate_id().ok_or("event without aggregate id")?;
        let name = event.get("name").and_then(Value::as_str).ok_or("event without name")?;

        // Upsert: the same event delivered twice leaves the view unchanged.
        self.view
            .names
            .lock()
            .unwrap()
            .insert(aggregate_id.to_string(), name.to_string());
        Ok(())
    }

    async fn delete(&self) -> Result<(), BoxDynError> {
        self.view.names.lock().unwrap().clear();
        *self.view.deletes.lock().unwrap() += 1;
        Ok(())
    }
}
