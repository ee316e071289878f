use super::*;

fn retrieve(bridge: &mut TestBridge) -> bool {
    let h = primary(bridge);
    bridge.on_native_retrieve_surrounding(h)
}

fn delete(bridge: &mut TestBridge, offset: i32, n_chars: u32) -> bool {
    let h = primary(bridge);
    bridge.on_native_delete_surrounding(h, offset, n_chars)
}

fn served(bridge: &TestBridge) -> Option<(String, usize)> {
    primary_context(bridge).surrounding.clone()
}

#[test]
fn test_retrieve_serves_text_and_caret() {
    let mut bridge = make_bridge_with_text("hello world", 5);
    assert!(retrieve(&mut bridge));
    assert_eq!(served(&bridge), Some(("hello world".to_string(), 5)));
}

#[test]
fn test_caret_is_served_as_byte_offset() {
    let mut bridge = make_bridge_with_text("日本語", 2);
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("日本語".to_string(), 6)));
}

#[test]
fn test_retrieve_without_selection_fails() {
    let mut bridge = make_bridge("wayland");
    bridge.host_mut().set_has_selection(false);
    assert!(!retrieve(&mut bridge));
    assert_eq!(served(&bridge), None);
}

#[test]
fn test_repeated_retrieve_queries_host_once() {
    let mut bridge = make_bridge_with_text("abc", 1);
    retrieve(&mut bridge);
    retrieve(&mut bridge);
    retrieve(&mut bridge);
    assert_eq!(bridge.host().selection_queries(), 1);
    assert_eq!(bridge.surrounding_cache().query_count(), 1);
}

#[test]
fn test_self_caused_change_keeps_cache() {
    let mut bridge = make_bridge_with_text("abc", 1);
    retrieve(&mut bridge);
    bridge.on_selection_change(OWNER, SelectionChange::self_caused());
    assert!(bridge.surrounding_cache().is_valid());
    retrieve(&mut bridge);
    assert_eq!(bridge.host().selection_queries(), 1);
    assert_eq!(primary_context(&bridge).resets, 0);

    bridge.on_selection_change(OWNER, SelectionChange::external());
    assert!(!bridge.surrounding_cache().is_valid());
    assert_eq!(primary_context(&bridge).resets, 1);
    retrieve(&mut bridge);
    assert_eq!(bridge.host().selection_queries(), 2);
}

#[test]
fn test_caret_move_is_seen_after_external_change() {
    let mut bridge = make_bridge_with_text("hello", 5);
    retrieve(&mut bridge);
    bridge.host_mut().move_caret(1);
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("hello".to_string(), 5)));

    bridge.on_selection_change(OWNER, SelectionChange::external());
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("hello".to_string(), 1)));
}

#[test]
fn test_composition_start_refreshes_cache() {
    let mut bridge = make_bridge_with_text("abc", 3);
    retrieve(&mut bridge);
    signal(&mut bridge, NativeSignal::PreeditStart);
    assert_eq!(bridge.host().selection_queries(), 2);
}

#[test]
fn test_commit_drops_cache() {
    let mut bridge = make_bridge_with_text("abc", 3);
    compose(&mut bridge, "d");
    signal(&mut bridge, NativeSignal::commit("d"));
    assert!(!bridge.surrounding_cache().is_valid());
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("abcd".to_string(), 4)));
}

#[test]
fn test_surrounding_excludes_composition() {
    let mut bridge = make_bridge_with_text("ab", 2);
    compose(&mut bridge, "xy");
    assert_eq!(bridge.host().text(), "abxy");

    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("ab".to_string(), 2)));

    // Snapshot taken while the composition string is in the document.
    let change = SelectionChange {
        caused_by_composition: false,
        occurred_during_composition: true,
    };
    bridge.on_selection_change(OWNER, change);
    assert!(!bridge.has_pending_reset());
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("ab".to_string(), 2)));
    assert_eq!(bridge.host().selection_queries(), 2);
}

#[test]
fn test_only_caret_paragraph_is_served() {
    let config = BridgeConfig {
        max_paragraph_chars: 3,
        ..BridgeConfig::default()
    };
    let host = RecordingHost::with_text("first\nsecond line\nthird", 12);
    let mut bridge = make_bridge_with("wayland", host, config);
    retrieve(&mut bridge);
    assert_eq!(served(&bridge), Some(("ond li".to_string(), 3)));
}

#[test]
fn test_delete_before_caret() {
    let mut bridge = make_bridge_with_text("hello", 5);
    retrieve(&mut bridge);
    assert!(delete(&mut bridge, -2, 2));
    assert_eq!(
        bridge.host().events(),
        &[HostEvent::DeleteContent { start: 3, len: 2 }]
    );
    assert_eq!(bridge.host().text(), "hel");
    assert!(!bridge.surrounding_cache().is_valid());
}

#[test]
fn test_delete_without_cache_fails() {
    let mut bridge = make_bridge_with_text("hello", 5);
    assert!(!delete(&mut bridge, -1, 1));
    assert!(bridge.host().events().is_empty());
}

#[test]
fn test_delete_out_of_range_fails() {
    let mut bridge = make_bridge_with_text("hello", 5);
    retrieve(&mut bridge);
    assert!(!delete(&mut bridge, 0, 1));
    assert!(!delete(&mut bridge, -6, 1));
    assert!(bridge.host().events().is_empty());
    assert_eq!(bridge.host().text(), "hello");
}

#[test]
fn test_delete_nothing_succeeds() {
    let mut bridge = make_bridge_with_text("hello", 5);
    retrieve(&mut bridge);
    assert!(delete(&mut bridge, -1, 0));
    assert!(bridge.host().events().is_empty());
}

#[test]
fn test_delete_while_composing_restarts_composition() {
    let mut bridge = make_bridge_with_text("abc", 3);
    compose(&mut bridge, "x");
    assert_eq!(bridge.host().text(), "abcx");
    bridge.host_mut().take_events();

    assert!(delete(&mut bridge, -1, 1));
    assert_eq!(
        kinds(&bridge),
        vec![
            HostEventKind::CompositionCommit,
            HostEventKind::DeleteContent,
            HostEventKind::CompositionStart,
            HostEventKind::CompositionUpdate
        ]
    );
    assert_eq!(commits(&bridge), vec![""]);
    assert_eq!(bridge.host().text(), "abx");
    assert!(bridge.is_composing());
    assert_eq!(bridge.dispatched_string(), "x");
}

#[test]
fn test_external_change_while_composing_resets_after_commit() {
    let mut bridge = make_bridge("wayland");
    compose(&mut bridge, "ab");
    bridge.on_selection_change(OWNER, SelectionChange::external());
    assert!(bridge.has_pending_reset());
    assert_eq!(primary_context(&bridge).resets, 0);
    assert!(bridge.is_composing());

    signal(&mut bridge, NativeSignal::commit("ab"));
    assert!(!bridge.has_pending_reset());
    assert_eq!(primary_context(&bridge).resets, 1);
}

#[test]
fn test_selection_change_in_other_window_is_ignored() {
    let mut bridge = make_bridge_with_text("abc", 1);
    retrieve(&mut bridge);
    bridge.on_selection_change(WindowId(3), SelectionChange::external());
    assert!(bridge.surrounding_cache().is_valid());
}
