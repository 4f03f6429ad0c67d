use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use esrs_pipeline::error::SnapshotError;
use esrs_pipeline::{
    AggregateRepository, AggregateState, CommandError, CommandProcessor, InMemorySnapshotStore, Snapshot, SnapshotStore,
};

use crate::aggregate::{
    change_username, command, processor, register_user, user_recorders, CountingEventLog, UserState, CHANGE_USERNAME,
    REGISTER_USER, USER,
};

const STREAM: &str = "event_stream";

async fn history(event_log: &CountingEventLog, id: &str, names: &[&str]) {
    processor(register_user(), event_log)
        .process(command(REGISTER_USER, json!({ "id": id, "name": names[0] })))
        .await
        .unwrap();

    for name in &names[1..] {
        processor(change_username(), event_log)
            .process(command(CHANGE_USERNAME, json!({ "id": id, "name": name })))
            .await
            .unwrap();
    }
}

fn repository(event_log: &CountingEventLog) -> AggregateRepository<UserState> {
    AggregateRepository::new(USER, STREAM, user_recorders(), Arc::new(event_log.clone()))
}

#[tokio::test]
async fn load_without_history_returns_none() {
    let event_log = CountingEventLog::default();

    assert!(repository(&event_log).load("U1").await.unwrap().is_none());
}

#[tokio::test]
async fn load_folds_the_history_in_version_order() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max", "Sam"]).await;
    history(&event_log, "U2", &["Kim"]).await;

    let state: AggregateState<UserState> = repository(&event_log).load("U1").await.unwrap().unwrap();

    assert_eq!(state.id(), "U1");
    assert_eq!(state.aggregate_type(), USER);
    assert_eq!(state.persisted_version(), 3);
    assert_eq!(state.version(), 3);
    assert!(state.pending_events().is_empty());
    assert_eq!(
        state.inner(),
        &UserState {
            name: "Sam".to_string(),
            renames: 2,
        }
    );
}

#[tokio::test]
async fn replaying_the_same_history_twice_yields_the_same_state() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max", "Sam"]).await;
    let repository = repository(&event_log);

    let first = repository.load("U1").await.unwrap().unwrap();
    let second = repository.load("U1").await.unwrap().unwrap();

    assert_eq!(first.inner(), second.inner());
    assert_eq!(first.persisted_version(), second.persisted_version());

    let events = event_log.events(STREAM, "U1").await;
    let folded = user_recorders().fold(UserState::default(), &events).unwrap();
    assert_eq!(&folded, first.inner());
}

#[tokio::test]
async fn snapshot_shortens_the_replay() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max", "Sam"]).await;

    let snapshots: InMemorySnapshotStore<UserState> = InMemorySnapshotStore::new();
    // Deliberately different from what the first two events produce, to tell replay and snapshot apart.
    snapshots.save(Snapshot {
        aggregate_type: USER.to_string(),
        aggregate_id: "U1".to_string(),
        version: 2,
        state: UserState {
            name: "Snapshotted".to_string(),
            renames: 10,
        },
    });

    let state = repository(&event_log)
        .with_snapshot_store(Arc::new(snapshots))
        .load("U1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.persisted_version(), 3);
    assert_eq!(state.inner().name, "Sam");
    assert_eq!(state.inner().renames, 11);
}

#[tokio::test]
async fn snapshot_of_a_loaded_aggregate_is_used_on_next_load() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max"]).await;
    let snapshots: Arc<InMemorySnapshotStore<UserState>> = Arc::new(InMemorySnapshotStore::new());
    let repository = repository(&event_log).with_snapshot_store(snapshots.clone());

    let state = repository.load("U1").await.unwrap().unwrap();
    snapshots.take_snapshot(&state);

    let snapshot = snapshots.get(USER, "U1").await.unwrap().unwrap();
    assert_eq!(snapshot.version, 2);

    let reloaded = repository.load("U1").await.unwrap().unwrap();
    assert_eq!(reloaded.inner(), state.inner());
    assert_eq!(reloaded.persisted_version(), 2);
}

fn ghost_snapshot(aggregate_id: &str, version: i32) -> Arc<InMemorySnapshotStore<UserState>> {
    let snapshots: InMemorySnapshotStore<UserState> = InMemorySnapshotStore::new();
    snapshots.save(Snapshot {
        aggregate_type: USER.to_string(),
        aggregate_id: aggregate_id.to_string(),
        version,
        state: UserState {
            name: "Ghost".to_string(),
            renames: 10,
        },
    });
    Arc::new(snapshots)
}

#[tokio::test]
async fn snapshot_ahead_of_the_log_falls_back_to_full_replay() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max"]).await;

    let state = repository(&event_log)
        .with_snapshot_store(ghost_snapshot("U1", 5))
        .load("U1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.persisted_version(), 2);
    assert_eq!(state.inner().name, "Max");
    assert_eq!(state.inner().renames, 1);
}

#[tokio::test]
async fn commands_succeed_despite_a_snapshot_ahead_of_the_log() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max"]).await;
    let descriptor = change_username();
    let repository = AggregateRepository::for_descriptor(&descriptor, Arc::new(event_log.clone()))
        .with_snapshot_store(ghost_snapshot("U1", 5));

    let events = CommandProcessor::new(descriptor, repository)
        .process(command(CHANGE_USERNAME, json!({ "id": "U1", "name": "Sam" })))
        .await
        .unwrap();

    assert_eq!(events[0].aggregate_version(), Some(3));
}

#[tokio::test]
async fn snapshot_without_history_is_not_found() {
    let event_log = CountingEventLog::default();
    let descriptor = change_username();
    let repository = AggregateRepository::for_descriptor(&descriptor, Arc::new(event_log.clone()))
        .with_snapshot_store(ghost_snapshot("U404", 3));

    assert!(repository.load("U404").await.unwrap().is_none());

    let result = CommandProcessor::new(descriptor, repository)
        .process(command(CHANGE_USERNAME, json!({ "id": "U404", "name": "Sam" })))
        .await;

    assert!(matches!(result, Err(CommandError::AggregateNotFound { .. })));
    assert!(event_log.appends().is_empty());
}

struct BrokenSnapshots;

#[async_trait]
impl SnapshotStore<UserState> for BrokenSnapshots {
    async fn get(&self, _aggregate_type: &str, _aggregate_id: &str) -> Result<Option<Snapshot<UserState>>, SnapshotError> {
        Err(SnapshotError::Custom("snapshot store is down".into()))
    }
}

#[tokio::test]
async fn failing_snapshot_store_falls_back_to_full_replay() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex", "Max"]).await;

    let state = repository(&event_log)
        .with_snapshot_store(Arc::new(BrokenSnapshots))
        .load("U1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.persisted_version(), 2);
    assert_eq!(state.inner().name, "Max");
}

#[tokio::test]
async fn saving_without_pending_events_changes_nothing() {
    let event_log = CountingEventLog::default();
    history(&event_log, "U1", &["Alex"]).await;
    let repository = repository(&event_log);

    let mut state = repository.load("U1").await.unwrap().unwrap();
    let events = repository.save(&mut state).await.unwrap();

    assert!(events.is_empty());
    assert_eq!(state.persisted_version(), 1);
    assert_eq!(event_log.events(STREAM, "U1").await.len(), 1);
}
