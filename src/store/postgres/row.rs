use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::message::{Message, Metadata, Payload};

/// Event representation on the event log table.
#[derive(sqlx::FromRow, Debug)]
pub struct DbMessage {
    pub id: Uuid,
    pub name: String,
    pub payload: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbMessage> for Message {
    type Error = serde_json::Error;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        Ok(Message {
            uuid: row.id,
            name: row.name,
            payload: serde_json::from_value::<Payload>(row.payload)?,
            metadata: serde_json::from_value::<Metadata>(row.metadata)?,
            created_at: row.created_at,
        })
    }
}
