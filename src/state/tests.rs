use super::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_message_log_keeps_most_recent_lines() {
    let mut log = MessageLog::new(3);
    for i in 0..10 {
        log.push(format!("line {}", i));
        assert!(log.len() <= 3);
    }

    assert_eq!(log.lines(), vec!["line 7", "line 8", "line 9"]);
    assert_eq!(log.last(), Some("line 9"));
}

#[test]
fn test_message_log_under_capacity() {
    let mut log = MessageLog::default();
    assert!(log.is_empty());
    assert_eq!(log.capacity(), DEFAULT_MAX_MESSAGES);

    log.push("a".to_string());
    log.push("b".to_string());
    assert_eq!(log.lines(), vec!["a", "b"]);
}

#[test]
fn test_zero_capacity_is_clamped() {
    let mut log = MessageLog::new(0);
    log.push("only".to_string());
    log.push("latest".to_string());
    assert_eq!(log.lines(), vec!["latest"]);
}

#[test]
fn test_error_cleared_when_leaving_error_status() {
    let mut state = ComponentState::default();
    state.apply(StatePatch::error("boom"));
    assert_eq!(state.status, Status::Error);
    assert_eq!(state.error.as_deref(), Some("boom"));

    state.apply(StatePatch::status(Status::Starting));
    assert_eq!(state.status, Status::Starting);
    assert!(state.error.is_none());
}

#[test]
fn test_error_without_error_status_is_dropped() {
    let mut state = ComponentState::default();
    state.apply(StatePatch {
        error: Some("stray".to_string()),
        ..StatePatch::default()
    });
    assert_eq!(state.status, Status::Waiting);
    assert!(state.error.is_none());
}

#[test]
fn test_patch_merges_only_present_fields() {
    let mut state = ComponentState::default();
    state.apply(StatePatch::running(Some(json!({"milestone": 42}))));
    state.apply(StatePatch::downloading(150));

    assert_eq!(state.status, Status::Downloading);
    assert_eq!(state.progress, Some(100));
    assert_eq!(state.info, Some(json!({"milestone": 42})));
}

#[test]
fn test_store_has_fixed_key_set() {
    let store = StateStore::new(10);
    let snapshot = store.snapshot();

    assert_eq!(snapshot.len(), ComponentId::ALL.len());
    for id in ComponentId::ALL {
        assert_eq!(snapshot[&id].status, Status::Waiting);
        assert!(store.messages(id).is_empty());
    }
}

#[test]
fn test_store_notifies_observers() {
    let seen_states: Arc<Mutex<Vec<StateMap>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_messages: Arc<Mutex<Vec<(ComponentId, String, usize)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let states = Arc::clone(&seen_states);
    let messages = Arc::clone(&seen_messages);
    let store = StateStore::new(2).with_observers(
        Some(Arc::new(move |map: &StateMap| states.lock().push(map.clone()))),
        Some(Arc::new(move |id: ComponentId, text: &str, log: &[String]| {
            messages.lock().push((id, text.to_string(), log.len()))
        })),
    );

    store.update(ComponentId::Iri, StatePatch::status(Status::Starting));
    store.append(ComponentId::Iri, "one");
    store.append(ComponentId::Iri, "two");
    store.append(ComponentId::Iri, "three");

    let states = seen_states.lock();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0][&ComponentId::Iri].status, Status::Starting);
    assert_eq!(states[0].len(), ComponentId::ALL.len());

    let messages = seen_messages.lock();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2], (ComponentId::Iri, "three".to_string(), 2));
    assert_eq!(store.messages(ComponentId::Iri), vec!["two", "three"]);
}

#[test]
fn test_component_names_serialize() {
    assert_eq!(ComponentId::TransactionStream.to_string(), "iota-transaction-stream");
    let value = serde_json::to_value(ComponentId::ChatangleBackend).unwrap();
    assert_eq!(value, json!("chatangle-backend"));
    let status = serde_json::to_value(Status::Downloading).unwrap();
    assert_eq!(status, json!("downloading"));
}

#[test]
fn test_installing_statuses() {
    assert!(Status::Checking.is_installing());
    assert!(Status::Downloading.is_installing());
    assert!(!Status::Ready.is_installing());
    assert!(!Status::Running.is_installing());
}
