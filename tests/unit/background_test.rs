//! Unit tests for the background context: toolbar clicks, badge updates and
//! the global enabled flag.

use serde_json::json;

use mark_as_read::dom::Document;
use mark_as_read::managers::annotation_engine::ContentEngine;
use mark_as_read::managers::badge_manager::{
    render_state, BackgroundContext, BadgeManagerTrait, DISABLED_BADGE_MESSAGE,
    PRESS_TO_MARK_AS_READ_BADGE_MESSAGE,
};
use mark_as_read::services::messaging::RuntimeBus;
use mark_as_read::services::store::{patch, SharedStore, SharedStoreTrait, StoreLimits};
use mark_as_read::services::url_preprocessor::UrlPreprocessor;
use mark_as_read::types::badge::{BadgeIcon, BadgeState, ClickData, ClickOutcome, Modifier};
use mark_as_read::types::errors::{BackgroundError, ProtocolError};
use mark_as_read::types::message::Envelope;
use mark_as_read::types::read_page::StorageKeys;

fn setup() -> (SharedStore, RuntimeBus, BackgroundContext) {
    let store = SharedStore::in_memory(StoreLimits::default()).unwrap();
    let bus = RuntimeBus::new();
    let mut background = BackgroundContext::new(store.clone(), bus.clone());
    background.on_installed().unwrap();
    background.start().unwrap();
    (store, bus, background)
}

fn click(modifiers: Vec<Modifier>) -> ClickData {
    ClickData::with_modifiers(modifiers)
}

fn envelope(tab: Option<u32>, message: serde_json::Value) -> Envelope {
    Envelope {
        sender_tab: tab,
        message,
    }
}

#[test]
fn test_install_writes_defaults_and_listens() {
    let (store, bus, background) = setup();
    let values = store.get_all().unwrap();
    assert_eq!(values.get(StorageKeys::IS_ENABLED), Some(&json!(true)));
    assert_eq!(values.get(StorageKeys::READ_PAGES), Some(&json!([])));
    assert!(values.contains_key(StorageKeys::CSS_STYLE));
    assert!(values.contains_key(StorageKeys::URL_PREPROCESSOR));
    assert!(background.is_listening());
    assert!(bus.has_background_listener());
}

#[test]
fn test_shift_click_opens_settings_without_writing() {
    let (store, _bus, mut background) = setup();
    let before = store.get_all().unwrap();
    let mut sub = store.subscribe("observer");

    let outcome = background
        .handle_click(Some(1), Some(&click(vec![Modifier::Shift, Modifier::Ctrl])))
        .unwrap();

    assert_eq!(outcome, ClickOutcome::OpenSettings);
    assert_eq!(store.get_all().unwrap(), before);
    assert!(sub.drain().is_empty());
}

#[test]
fn test_ctrl_click_flips_enabled_flag() {
    let (store, bus, mut background) = setup();

    let outcome = background
        .handle_click(Some(3), Some(&click(vec![Modifier::Ctrl])))
        .unwrap();
    assert_eq!(outcome, ClickOutcome::EnabledToggled(false));
    assert_eq!(
        store.get(&[StorageKeys::IS_ENABLED]).unwrap()[StorageKeys::IS_ENABLED],
        json!(false)
    );
    assert_eq!(background.badge(3), Some(&BadgeState::Disabled));
    assert!(!background.is_listening());
    assert!(!bus.has_background_listener());

    let outcome = background
        .handle_click(Some(3), Some(&click(vec![Modifier::Ctrl])))
        .unwrap();
    assert_eq!(outcome, ClickOutcome::EnabledToggled(true));
    assert!(background.is_listening());
}

#[test]
fn test_enabled_flag_written_elsewhere_is_followed() {
    let (store, _bus, mut background) = setup();

    store.set(patch(StorageKeys::IS_ENABLED, json!(false))).unwrap();
    background.process_pending();
    assert!(!background.is_listening());

    store.set(patch(StorageKeys::IS_ENABLED, json!(true))).unwrap();
    background.process_pending();
    assert!(background.is_listening());
}

#[test]
fn test_click_without_tab_or_data_is_rejected() {
    let (_store, _bus, mut background) = setup();
    let data = click(vec![]);

    let empty = ClickData::default();

    for (tab, data) in [(None, Some(&data)), (Some(1), None), (None, None), (Some(1), Some(&empty))] {
        let err = background.handle_click(tab, data).unwrap_err();
        assert!(matches!(
            err,
            BackgroundError::Protocol(ProtocolError::ClickDataUndefined)
        ));
    }
}

#[test]
fn test_plain_click_forwards_toggle_to_tab() {
    let (_store, bus, mut background) = setup();
    let mut tab_inbox = bus.listen_tab(4);

    let outcome = background
        .handle_click(Some(4), Some(&click(vec![])))
        .unwrap();
    assert_eq!(outcome, ClickOutcome::ToggleForwarded { delivered: true });
    assert!(tab_inbox.try_recv().is_ok());

    // Alt is not a recognized action modifier: behaves like a plain click.
    let outcome = background
        .handle_click(Some(5), Some(&click(vec![Modifier::Alt])))
        .unwrap();
    assert_eq!(outcome, ClickOutcome::ToggleForwarded { delivered: false });
}

#[test]
fn test_plain_click_while_disabled_is_ignored() {
    let (store, bus, mut background) = setup();
    store.set(patch(StorageKeys::IS_ENABLED, json!(false))).unwrap();
    let mut tab_inbox = bus.listen_tab(4);

    let outcome = background
        .handle_click(Some(4), Some(&click(vec![])))
        .unwrap();
    assert_eq!(outcome, ClickOutcome::Ignored);
    assert!(tab_inbox.try_recv().is_err());
}

#[test]
fn test_reports_update_badges() {
    let (_store, _bus, mut background) = setup();

    let state = background
        .handle_message(envelope(
            Some(1),
            json!({"isRead": true, "match": {"url": "https://a.test/", "datetime": "2024-03-02T09:05:00"}}),
        ))
        .unwrap();
    assert_eq!(state, Some(BadgeState::Read("2024-03-02T09:05:00".to_string())));

    background
        .handle_message(envelope(Some(2), json!({"isRead": false})))
        .unwrap();
    assert_eq!(background.badge(2), Some(&BadgeState::Unread));

    let render = background.render(1).unwrap();
    assert_eq!(render.title, "marked as read at 02-03-2024 09:05");
    assert_eq!(render.icon, BadgeIcon::Read);
}

#[test]
fn test_malformed_reports_are_rejected() {
    let (_store, _bus, mut background) = setup();

    let err = background
        .handle_message(envelope(Some(1), json!({"isRead": true})))
        .unwrap_err();
    assert!(matches!(
        err,
        BackgroundError::Protocol(ProtocolError::IsReadButNoMatch)
    ));

    let err = background
        .handle_message(envelope(None, json!({"isRead": false})))
        .unwrap_err();
    assert!(matches!(
        err,
        BackgroundError::Protocol(ProtocolError::TabUndefined)
    ));
    assert!(background.badge(1).is_none());
}

#[test]
fn test_non_report_messages_are_ignored() {
    let (_store, _bus, mut background) = setup();
    let state = background
        .handle_message(envelope(Some(1), json!({"hello": "world"})))
        .unwrap();
    assert_eq!(state, None);
    assert!(background.badge(1).is_none());
}

#[test]
fn test_render_titles_for_each_state() {
    assert_eq!(render_state(&BadgeState::Disabled).title, DISABLED_BADGE_MESSAGE);
    assert_eq!(
        render_state(&BadgeState::Unread).title,
        PRESS_TO_MARK_AS_READ_BADGE_MESSAGE
    );
    let unread = render_state(&BadgeState::Unread);
    assert_eq!(
        unread.icon_paths.get(&16).map(String::as_str),
        Some("icons/unread-16.svg")
    );
}

#[test]
fn test_tab_closed_forgets_badge() {
    let (_store, _bus, mut background) = setup();
    background
        .handle_message(envelope(Some(9), json!({"isRead": false})))
        .unwrap();
    background.tab_closed(9);
    assert!(background.badge(9).is_none());
    assert!(background.render(9).is_none());
}

#[test]
fn test_ctrl_click_detaches_running_tab_and_reattaches() {
    let (store, bus, mut background) = setup();
    let mut doc = Document::new("https://a.test/x");
    let mut engine = ContentEngine::new(3, store.clone(), bus.clone(), UrlPreprocessor::default());
    engine.boot(&mut doc).unwrap();
    background.process_pending();
    assert_eq!(background.badge(3), Some(&BadgeState::Unread));
    assert!(engine.is_listening());

    background
        .handle_click(Some(3), Some(&click(vec![Modifier::Ctrl])))
        .unwrap();
    engine.process_pending(&mut doc);
    background.process_pending();
    assert_eq!(background.badge(3), Some(&BadgeState::Disabled));
    assert!(!engine.is_listening());

    background
        .handle_click(Some(3), Some(&click(vec![Modifier::Ctrl])))
        .unwrap();
    engine.process_pending(&mut doc);
    background.process_pending();
    assert!(engine.is_listening());
    assert_eq!(background.badge(3), Some(&BadgeState::Unread));
}
