use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxDynError;
use crate::message::Message;

/// Supplies the extra argument handed to command handlers. Invoked once per command, before the
/// handler runs.
///
/// When no provider is configured handlers receive `None` as context.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn provide(&self, command: &Message) -> Result<Value, BoxDynError>;
}
