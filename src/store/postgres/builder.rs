use std::collections::HashMap;
use std::sync::Arc;

use sqlx::postgres::PgQueryResult;
use sqlx::{Pool, Postgres, Transaction};

use crate::error::EventLogError;

use super::statements::Statements;
use super::{InnerPgEventLog, PgEventLog};

/// Struct used to build a brand new [`PgEventLog`].
pub struct PgEventLogBuilder {
    pool: Pool<Postgres>,
    streams: Vec<String>,
    run_migrations: bool,
}

impl PgEventLogBuilder {
    /// Creates a new instance of a [`PgEventLogBuilder`] serving no stream yet.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            streams: vec![],
            run_migrations: true,
        }
    }

    /// Set the list of streams served by the log
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.streams = streams;
        self
    }

    /// Add a single stream
    pub fn add_stream(mut self, stream_name: impl Into<String>) -> Self {
        self.streams.push(stream_name.into());
        self
    }

    /// Calling this function the caller avoid running migrations. It is recommend to run migrations
    /// at least once per stream per startup.
    pub fn without_running_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    /// Validates every stream name and, unless `without_running_migrations` was called,
    /// atomically creates the tables backing the streams.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if a stream name cannot be used as a table name, or if running the
    /// migrations fails.
    pub async fn try_build(self) -> Result<PgEventLog, EventLogError> {
        let statements: HashMap<String, Statements> = self
            .streams
            .iter()
            .map(|stream_name| -> Result<(String, Statements), EventLogError> {
                Ok((stream_name.clone(), Statements::new(stream_name)?))
            })
            .collect::<Result<_, EventLogError>>()?;

        if self.run_migrations {
            let mut transaction: Transaction<Postgres> = self.pool.begin().await?;

            for stream_statements in statements.values() {
                for migration in stream_statements.migrations() {
                    let _: PgQueryResult = sqlx::query(migration).execute(&mut *transaction).await?;
                }
            }

            transaction.commit().await?;
        }

        Ok(PgEventLog {
            inner: Arc::new(InnerPgEventLog {
                pool: self.pool,
                statements,
            }),
        })
    }
}
