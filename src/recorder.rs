use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CommandError;
use crate::message::Message;

/// Produces the next state of an aggregate out of the previous one and an event. Must be pure:
/// replaying the same history always yields the same state.
pub type ApplyFn<S> = Arc<dyn Fn(S, &Message) -> S + Send + Sync>;

/// Maps every event name of an aggregate type to the function applying it onto the state.
///
/// Shared by all the descriptors of the same aggregate type, and used both when replaying the
/// history and when recording new events.
pub struct EventRecorders<S> {
    appliers: HashMap<String, ApplyFn<S>>,
}

impl<S> EventRecorders<S> {
    pub fn new() -> Self {
        Self {
            appliers: HashMap::new(),
        }
    }

    /// Registers the apply function of the given event name, replacing any previous one.
    #[must_use]
    pub fn on<F>(mut self, event_name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(S, &Message) -> S + Send + Sync + 'static,
    {
        self.appliers.insert(event_name.into(), Arc::new(apply));
        self
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.appliers.contains_key(event_name)
    }

    /// Returns the apply function of the given event name.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::Configuration`] if no function was registered for it.
    pub fn recorder(&self, event_name: &str) -> Result<&ApplyFn<S>, CommandError> {
        self.appliers
            .get(event_name)
            .ok_or_else(|| CommandError::Configuration(format!("no apply function registered for event `{}`", event_name)))
    }

    /// Folds the given events, in order, onto the state.
    pub fn fold<'a>(&self, state: S, events: impl IntoIterator<Item = &'a Message>) -> Result<S, CommandError> {
        events
            .into_iter()
            .try_fold(state, |state, event| {
                let apply = self.recorder(event.name())?;
                Ok(apply(state, event))
            })
    }
}

impl<S> Default for EventRecorders<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for EventRecorders<S> {
    fn clone(&self) -> Self {
        Self {
            appliers: self.appliers.clone(),
        }
    }
}

impl<S> fmt::Debug for EventRecorders<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<&String> = self.appliers.keys().collect();
        events.sort();
        f.debug_struct("EventRecorders").field("events", &events).finish()
    }
}
