//! End-to-end traces through the replay driver

use imbridge_im::replay::{HostEvent, HostEventKind, Trace, replay};
use imbridge_im::{CompositionState, KeyHandlingState, Settings};

fn run(json: &str) -> imbridge_im::replay::ReplayReport {
    let trace = Trace::from_json(json).unwrap();
    replay(&trace, &Settings::default())
}

fn kinds(events: &[HostEvent]) -> Vec<HostEventKind> {
    events.iter().map(HostEvent::kind).collect()
}

#[test]
fn test_async_backend_commit_after_filtered_key() {
    let report = run(r#"{
        "backend": "fcitx5",
        "steps": [
            {"focus": {"window": 1}},
            {"key": {"window": 1, "event": {"time": 10, "kind": "press", "keysym": 97}, "filtered": true}},
            {"signal": {"signal": {"commit": {"text": "a"}}}}
        ]
    }"#);

    assert_eq!(report.key_results, vec![KeyHandlingState::Handled]);
    assert_eq!(
        kinds(&report.events),
        vec![
            HostEventKind::SyntheticKey,
            HostEventKind::CompositionStart,
            HostEventKind::CompositionCommit
        ]
    );
    assert_eq!(report.document.text, "a");
}

#[test]
fn test_destroy_while_composing() {
    let report = run(r#"{
        "steps": [
            {"focus": {"window": 1}},
            {"signal": {"signal": "preedit_start"}},
            {"signal": {"signal": {"preedit_changed": {"preedit": {"text": "xyz", "cursor": 3}}}}},
            {"destroy": {"window": 1}},
            {"signal": {"signal": {"commit": {"text": "late"}}}}
        ]
    }"#);

    assert_eq!(
        report.events.last(),
        Some(&HostEvent::CompositionCommit {
            text: "xyz".to_string()
        })
    );
    assert_eq!(report.events.len(), 3);
    assert_eq!(report.protocol_violations, 0);
    assert_eq!(report.final_state, CompositionState::NotComposing);
}

#[test]
fn test_delete_surrounding_edits_document() {
    let report = run(r#"{
        "document": {"text": "hello", "caret": 5},
        "steps": [
            {"focus": {"window": 1}},
            {"signal": {"signal": "retrieve_surrounding"}},
            {"signal": {"signal": {"delete_surrounding": {"offset": -2, "n_chars": 2}}}}
        ]
    }"#);

    assert_eq!(report.events, vec![HostEvent::DeleteContent { start: 3, len: 2 }]);
    assert_eq!(report.document.text, "hel");
    assert_eq!(report.document.caret, 3);
}

#[test]
fn test_host_fault_aborts_composition() {
    let report = run(r#"{
        "steps": [
            {"focus": {"window": 1}},
            {"host_fault": {"on": "composition_start"}},
            {"signal": {"signal": "preedit_start"}},
            {"signal": {"signal": {"preedit_changed": {"preedit": {"text": "a"}}}}}
        ]
    }"#);

    assert_eq!(kinds(&report.events), vec![HostEventKind::CompositionStart]);
    assert_eq!(report.protocol_violations, 1);
    assert_eq!(report.final_state, CompositionState::NotComposing);
}

#[test]
fn test_password_field_routes_keys_to_simple_context() {
    let report = run(r#"{
        "steps": [
            {"focus": {"window": 1}},
            {"set_input_context": {"window": 1, "context": {"enabled": "password", "purpose": "password"}}},
            {"key": {
                "window": 1,
                "event": {"time": 1, "kind": "press", "keysym": 112},
                "emits": [{"context": "simple", "signal": {"commit": {"text": "p"}}}],
                "filtered": true
            }},
            {"signal": {"signal": "preedit_start"}}
        ]
    }"#);

    // The simple context typed exactly the key's character.
    assert_eq!(report.key_results, vec![KeyHandlingState::NotHandled]);
    assert!(report.events.is_empty());
    // The primary context is not active in a password field.
    assert_eq!(report.protocol_violations, 1);
}

#[test]
fn test_caret_move_during_composition_is_followed_by_reset() {
    let report = run(r#"{
        "document": {"text": "abc", "caret": 3},
        "steps": [
            {"focus": {"window": 1}},
            {"signal": {"signal": "preedit_start"}},
            {"signal": {"signal": {"preedit_changed": {"preedit": {"text": "d", "cursor": 1}}}}},
            {"move_caret": {"window": 1, "caret": 0}},
            {"signal": {"signal": "preedit_end"}}
        ]
    }"#);

    assert_eq!(
        kinds(&report.events),
        vec![
            HostEventKind::CompositionStart,
            HostEventKind::CompositionUpdate,
            HostEventKind::CompositionCommit
        ]
    );
    assert_eq!(report.document.text, "abcd");
}

#[test]
fn test_report_serializes_for_the_cli() {
    let report = run(r#"{
        "steps": [
            {"focus": {"window": 1}},
            {"signal": {"signal": {"commit": {"text": "ok"}}}}
        ]
    }"#);
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains(r#""event":"composition_commit""#));
    assert!(json.contains(r#""final_state":"not_composing""#));
}
