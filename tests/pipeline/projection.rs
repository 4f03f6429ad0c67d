use serde_json::json;

use esrs_pipeline::{Message, ProjectionDispatcher, SourceStream};

use crate::aggregate::{
    change_username, command, processor, register_user, CountingEventLog, UsernamesView, CHANGE_USERNAME,
    REGISTER_USER,
};

const STREAM: &str = "event_stream";

async fn produce(event_log: &CountingEventLog) -> Vec<Message> {
    let mut events = processor(register_user(), event_log)
        .process(command(REGISTER_USER, json!({ "id": "U1", "name": "Alex" })))
        .await
        .unwrap();
    events.extend(
        processor(register_user(), event_log)
            .process(command(REGISTER_USER, json!({ "id": "U2", "name": "Kim" })))
            .await
            .unwrap(),
    );
    events.extend(
        processor(change_username(), event_log)
            .process(command(CHANGE_USERNAME, json!({ "id": "U1", "name": "Max" })))
            .await
            .unwrap(),
    );
    events
}

#[tokio::test]
async fn processed_events_reach_interested_read_models() {
    let event_log = CountingEventLog::default();
    let local = UsernamesView::default();
    let foreign = UsernamesView::default();
    let dispatcher = ProjectionDispatcher::new(vec![
        local.descriptor("usernames", SourceStream::local(STREAM)),
        foreign.descriptor("billing_usernames", SourceStream::foreign("billing", STREAM)),
    ]);

    for event in produce(&event_log).await {
        dispatcher.handle(STREAM, &event).await.unwrap();
    }

    assert_eq!(local.name("U1"), Some("Max".to_string()));
    assert_eq!(local.name("U2"), Some("Kim".to_string()));
    assert_eq!(foreign.len(), 0);
    assert_eq!(dispatcher.read_models().await, vec!["usernames"]);
}

#[tokio::test]
async fn redelivered_events_leave_the_read_model_unchanged() {
    let event_log = CountingEventLog::default();
    let view = UsernamesView::default();
    let dispatcher = ProjectionDispatcher::new(vec![view.descriptor("usernames", SourceStream::local(STREAM))]);
    let events = produce(&event_log).await;

    for event in &events {
        dispatcher.handle(STREAM, event).await.unwrap();
    }
    // At-least-once delivery: the whole batch shows up again.
    for event in &events {
        dispatcher.handle(STREAM, event).await.unwrap();
    }

    assert_eq!(view.len(), 2);
    assert_eq!(view.name("U1"), Some("Max".to_string()));
}

#[tokio::test]
async fn events_from_other_streams_are_ignored() {
    let event_log = CountingEventLog::default();
    let view = UsernamesView::default();
    let dispatcher = ProjectionDispatcher::new(vec![view.descriptor("usernames", SourceStream::local(STREAM))]);

    for event in produce(&event_log).await {
        dispatcher.handle("payments", &event).await.unwrap();
    }

    assert_eq!(view.len(), 0);
    assert!(dispatcher.is_initialized());
}

#[tokio::test]
async fn delete_reaches_every_read_model_exactly_once() {
    let first = UsernamesView::default();
    let second = UsernamesView::default();
    let foreign = UsernamesView::default();
    let dispatcher = ProjectionDispatcher::new(vec![
        first.descriptor("first", SourceStream::local(STREAM)),
        second.descriptor("second", SourceStream::local("payments")),
        foreign.descriptor("foreign", SourceStream::foreign("billing", STREAM)),
    ]);
    dispatcher.init().await.unwrap();

    dispatcher.delete().await.unwrap();

    assert_eq!(first.deletes(), 1);
    assert_eq!(second.deletes(), 1);
    assert_eq!(foreign.deletes(), 0);
    assert!(!dispatcher.is_initialized());
}

#[tokio::test]
async fn rebuild_replays_the_log_into_fresh_read_models() {
    let event_log = CountingEventLog::default();
    produce(&event_log).await;
    let view = UsernamesView::default();
    let dispatcher = ProjectionDispatcher::new(vec![view.descriptor("usernames", SourceStream::local(STREAM))]);

    // Stale data the rebuild must drop.
    view.names
        .lock()
        .unwrap()
        .insert("U9".to_string(), "Ghost".to_string());

    dispatcher.rebuild(&event_log, STREAM).await.unwrap();

    assert_eq!(view.deletes(), 1);
    assert_eq!(view.name("U9"), None);
    assert_eq!(view.name("U1"), Some("Max".to_string()));
    assert_eq!(view.name("U2"), Some("Kim".to_string()));
    assert!(dispatcher.is_initialized());
}
