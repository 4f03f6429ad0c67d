use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Transaction};

use crate::error::EventLogError;
use crate::message::Message;
use crate::store::EventLog;
use crate::types::SequenceNumber;

pub use builder::PgEventLogBuilder;

use row::DbMessage;
use statements::Statements;

mod builder;
mod row;
mod statements;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres implementation of the [`EventLog`]. Every stream is backed by its own table, with a
/// unique index on `(aggregate_id, aggregate_version)` guarding against concurrent writers.
///
/// The log is protected by an [`Arc`] that allows it to be cloneable still having the same memory
/// reference.
#[derive(Clone)]
pub struct PgEventLog {
    inner: Arc<InnerPgEventLog>,
}

struct InnerPgEventLog {
    pool: Pool<Postgres>,
    statements: HashMap<String, Statements>,
}

impl PgEventLog {
    /// Returns the name of the table backing the given stream, if the log serves it.
    pub fn table_name(&self, stream_name: &str) -> Option<&str> {
        self.inner.statements.get(stream_name).map(Statements::table_name)
    }

    fn statements(&self, stream_name: &str) -> Result<&Statements, EventLogError> {
        self.inner
            .statements
            .get(stream_name)
            .ok_or_else(|| EventLogError::InvalidStreamName(stream_name.to_string()))
    }

    async fn current_version(&self, statements: &Statements, aggregate_id: &str) -> Result<SequenceNumber, EventLogError> {
        Ok(sqlx::query_scalar::<_, SequenceNumber>(statements.current_version())
            .bind(aggregate_id)
            .fetch_one(&self.inner.pool)
            .await?)
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(error) => error.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    // Note: https://github.com/rust-lang/rust-clippy/issues/12281
    #[allow(clippy::blocks_in_conditions)]
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()), err)]
    async fn append_to_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        events: Vec<Message>,
        expected_version: SequenceNumber,
    ) -> Result<(), EventLogError> {
        if events.is_empty() {
            return Ok(());
        }

        let statements = self.statements(stream_name)?;
        let conflict = |actual: SequenceNumber| EventLogError::VersionConflict {
            stream: stream_name.to_string(),
            aggregate_id: aggregate_id.to_string(),
            expected: expected_version,
            actual,
        };

        let mut transaction: Transaction<Postgres> = self.inner.pool.begin().await?;

        let actual: SequenceNumber = sqlx::query_scalar::<_, SequenceNumber>(statements.current_version())
            .bind(aggregate_id)
            .fetch_one(&mut *transaction)
            .await?;

        if actual != expected_version {
            return Err(conflict(actual));
        }

        for (index, event) in events.iter().enumerate() {
            let version: SequenceNumber = event
                .aggregate_version()
                .unwrap_or(expected_version + index as SequenceNumber + 1);

            let result = sqlx::query(statements.insert())
                .bind(event.uuid())
                .bind(aggregate_id)
                .bind(event.aggregate_type().unwrap_or_default())
                .bind(version)
                .bind(event.name())
                .bind(Json(event.payload()))
                .bind(Json(event.metadata()))
                .bind(event.created_at)
                .execute(&mut *transaction)
                .await;

            match result {
                Ok(_) => {}
                Err(error) if is_unique_violation(&error) => {
                    // Another writer committed the same version first.
                    transaction.rollback().await?;
                    let actual = self.current_version(statements, aggregate_id).await?;
                    return Err(conflict(actual));
                }
                Err(error) => return Err(error.into()),
            }
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn read_stream(
        &self,
        stream_name: &str,
        aggregate_id: &str,
        from_version: SequenceNumber,
    ) -> Result<Vec<Message>, EventLogError> {
        let statements = self.statements(stream_name)?;

        sqlx::query_as::<_, DbMessage>(statements.by_aggregate_id())
            .bind(aggregate_id)
            .bind(from_version)
            .fetch_all(&self.inner.pool)
            .await?
            .into_iter()
            .map(|row| -> Result<Message, EventLogError> { Ok(Message::try_from(row)?) })
            .collect::<Result<Vec<Message>, EventLogError>>()
    }

    fn read_all<'s>(&'s self, stream_name: &'s str) -> BoxStream<'s, Result<Message, EventLogError>> {
        match self.statements(stream_name) {
            Ok(statements) => sqlx::query_as::<_, DbMessage>(statements.select_all())
                .fetch(&self.inner.pool)
                .map(|row| -> Result<Message, EventLogError> { Ok(Message::try_from(row?)?) })
                .boxed(),
            Err(error) => stream::once(async move { Err(error) }).boxed(),
        }
    }
}

/// Debug implementation for [`PgEventLog`]. It just shows the statements, that are the only thing
/// that might be useful to debug.
impl std::fmt::Debug for PgEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventLog")
            .field("statements", &self.inner.statements)
            .finish()
    }
}
