use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;
use sqlx::{Pool, Postgres};

use esrs_pipeline::store::postgres::{PgEventLog, PgEventLogBuilder};
use esrs_pipeline::{AggregateRepository, CommandError, CommandProcessor, EventLog, EventLogError, Message};

use crate::aggregate::{
    change_username, command, register_user, UserState, CHANGE_USERNAME, REGISTER_USER, USERNAME_WAS_CHANGED,
    USER_WAS_REGISTERED,
};

const STREAM: &str = "event_stream";

async fn event_log(pool: Pool<Postgres>) -> PgEventLog {
    PgEventLogBuilder::new(pool).add_stream(STREAM).try_build().await.unwrap()
}

fn pg_processor(
    descriptor: esrs_pipeline::AggregateDescriptor<UserState>,
    event_log: &PgEventLog,
) -> CommandProcessor<UserState> {
    let repository = AggregateRepository::for_descriptor(&descriptor, Arc::new(event_log.clone()));
    CommandProcessor::new(descriptor, repository)
}

#[sqlx::test]
async fn process_appends_and_load_replays(pool: Pool<Postgres>) {
    let event_log = event_log(pool).await;

    let registered = pg_processor(register_user(), &event_log)
        .process(command(REGISTER_USER, json!({ "id": "U1", "name": "Alex" })))
        .await
        .unwrap();
    let changed = pg_processor(change_username(), &event_log)
        .process(command(CHANGE_USERNAME, json!({ "id": "U1", "name": "Max" })))
        .await
        .unwrap();

    assert_eq!(registered[0].aggregate_version(), Some(1));
    assert_eq!(changed[0].aggregate_version(), Some(2));

    let events: Vec<Message> = event_log.read_stream(STREAM, "U1", 1).await.unwrap();
    let names: Vec<&str> = events.iter().map(Message::name).collect();
    assert_eq!(names, vec![USER_WAS_REGISTERED, USERNAME_WAS_CHANGED]);
    assert_eq!(events[1].causation_name(), Some(CHANGE_USERNAME));
    assert_eq!(events[1].get("name"), Some(&json!("Max")));

    let state = pg_processor(change_username(), &event_log)
        .repository()
        .load("U1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.persisted_version(), 2);
    assert_eq!(state.inner().name, "Max");
}

#[sqlx::test]
async fn stale_expected_version_is_a_conflict(pool: Pool<Postgres>) {
    let event_log = event_log(pool).await;
    let events = pg_processor(register_user(), &event_log)
        .process(command(REGISTER_USER, json!({ "id": "U1", "name": "Alex" })))
        .await
        .unwrap();

    let result = event_log.append_to_stream(STREAM, "U1", events, 0).await;

    assert!(matches!(
        result,
        Err(EventLogError::VersionConflict { expected: 0, actual: 1, .. })
    ));
    assert_eq!(event_log.read_stream(STREAM, "U1", 1).await.unwrap().len(), 1);
}

#[sqlx::test]
async fn registering_twice_is_a_concurrency_conflict(pool: Pool<Postgres>) {
    let event_log = event_log(pool).await;
    let processor = pg_processor(register_user(), &event_log);

    processor
        .process(command(REGISTER_USER, json!({ "id": "U1", "name": "Alex" })))
        .await
        .unwrap();
    let result = processor
        .process(command(REGISTER_USER, json!({ "id": "U1", "name": "Kim" })))
        .await;

    assert!(matches!(result, Err(CommandError::ConcurrencyConflict { expected: 0, actual: 1, .. })));
}

#[sqlx::test]
async fn read_all_streams_every_aggregate_in_append_order(pool: Pool<Postgres>) {
    let event_log = event_log(pool).await;
    for (id, name) in [("U1", "Alex"), ("U2", "Kim")] {
        pg_processor(register_user(), &event_log)
            .process(command(REGISTER_USER, json!({ "id": id, "name": name })))
            .await
            .unwrap();
    }
    pg_processor(change_username(), &event_log)
        .process(command(CHANGE_USERNAME, json!({ "id": "U1", "name": "Max" })))
        .await
        .unwrap();

    let events: Vec<Message> = event_log.read_all(STREAM).try_collect().await.unwrap();
    let ids: Vec<Option<&str>> = events.iter().map(Message::aggregate_id).collect();
    assert_eq!(ids, vec![Some("U1"), Some("U2"), Some("U1")]);

    let unknown: Result<Vec<Message>, EventLogError> = event_log.read_all("payments").try_collect().await;
    assert!(matches!(unknown, Err(EventLogError::InvalidStreamName(_))));
}
