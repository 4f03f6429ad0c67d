use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::message::Message;
use crate::processor::CommandProcessor;

/// Anything able to process the commands carrying a given name. Lets processors of different
/// aggregate types live behind the same [`CommandRouter`].
#[async_trait]
pub trait HandleCommand: Send + Sync {
    fn command_name(&self) -> &str;

    async fn process(&self, command: Message) -> Result<Vec<Message>, CommandError>;
}

#[async_trait]
impl<S> HandleCommand for CommandProcessor<S>
where
    S: Default + Send + Sync,
{
    fn command_name(&self) -> &str {
        self.descriptor().command_name()
    }

    async fn process(&self, command: Message) -> Result<Vec<Message>, CommandError> {
        CommandProcessor::process(self, command).await
    }
}

/// Routes every command to the processor registered for its name.
#[derive(Default)]
pub struct CommandRouter {
    processors: HashMap<String, Arc<dyn HandleCommand>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor under the command name it handles.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::Configuration`] if a processor is already registered for
    /// the same command name.
    pub fn register(&mut self, processor: impl HandleCommand + 'static) -> Result<&mut Self, CommandError> {
        let command_name = processor.command_name().to_string();
        if self.processors.contains_key(&command_name) {
            return Err(CommandError::Configuration(format!(
                "command `{}` is already routed",
                command_name
            )));
        }

        self.processors.insert(command_name, Arc::new(processor));
        Ok(self)
    }

    /// Names of the routed commands, sorted.
    pub fn routes(&self) -> Vec<&str> {
        let mut routes: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        routes.sort_unstable();
        routes
    }

    /// Hands the command over to its processor.
    ///
    /// # Errors
    ///
    /// Will return a [`CommandError::UnknownCommand`] if no processor handles the command, or
    /// whatever the processor returns.
    pub async fn dispatch(&self, command: Message) -> Result<Vec<Message>, CommandError> {
        let processor = self
            .processors
            .get(command.name())
            .ok_or_else(|| CommandError::UnknownCommand(command.name().to_string()))?;

        processor.process(command).await
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter").field("routes", &self.routes()).finish()
    }
}
