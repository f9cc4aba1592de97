//! Unit tests for the shared store: reads, atomic writes, quotas and change fan-out.

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use mark_as_read::services::store::{patch, SharedStore, SharedStoreTrait, StoreLimits};
use mark_as_read::types::errors::StoreError;

fn store() -> SharedStore {
    SharedStore::in_memory(StoreLimits::default()).expect("in-memory store")
}

fn store_with(quota_bytes: usize, item_quota_bytes: Option<usize>) -> SharedStore {
    SharedStore::in_memory(StoreLimits {
        quota_bytes,
        item_quota_bytes,
    })
    .expect("in-memory store")
}

fn two_keys(a: Value, b: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("a".to_string(), a);
    map.insert("b".to_string(), b);
    map
}

#[test]
fn test_get_omits_missing_keys() {
    let store = store();
    store.set(patch("isEnabled", json!(false))).unwrap();

    let values = store.get(&["isEnabled", "cssStyle"]).unwrap();
    assert_eq!(values.get("isEnabled"), Some(&json!(false)));
    assert!(!values.contains_key("cssStyle"));
}

#[test]
fn test_writer_receives_its_own_notification() {
    let store = store();
    let mut sub = store.subscribe("writer");

    store.set(patch("readPages", json!([]))).unwrap();
    store
        .set(patch("readPages", json!([{"url": "https://a.test/", "datetime": "d"}])))
        .unwrap();

    let batches = sub.drain();
    assert_eq!(batches.len(), 2);
    let change = &batches[1]["readPages"];
    assert_eq!(change.old_value, Some(json!([])));
    assert_eq!(
        change.new_value,
        Some(json!([{"url": "https://a.test/", "datetime": "d"}]))
    );
}

#[test]
fn test_every_subscriber_is_notified() {
    let store = store();
    let mut first = store.subscribe("tab:1");
    let mut second = store.subscribe("tab:2");

    store.set(patch("cssStyle", json!("a { }"))).unwrap();

    assert_eq!(first.drain().len(), 1);
    assert_eq!(second.drain().len(), 1);
}

#[test]
fn test_only_changed_keys_are_announced() {
    let store = store();
    store.set(two_keys(json!(1), json!(2))).unwrap();

    let mut sub = store.subscribe("observer");
    store.set(two_keys(json!(1), json!(3))).unwrap();

    let batches = sub.drain();
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].contains_key("a"));
    assert_eq!(batches[0]["b"].old_value, Some(json!(2)));
}

#[test]
fn test_quota_exceeded_writes_nothing() {
    let store = store_with(32, None);
    let mut sub = store.subscribe("observer");

    let err = store
        .set(patch("readPages", json!("x".repeat(64))))
        .unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { quota: 32, .. }));

    assert!(store.get(&["readPages"]).unwrap().is_empty());
    assert!(sub.drain().is_empty());
}

#[test]
fn test_quota_counts_replaced_values_once() {
    // "k" + "\"0123456789\"" = 13 bytes; rewriting it must not double count.
    let store = store_with(13, None);
    store.set(patch("k", json!("0123456789"))).unwrap();
    store.set(patch("k", json!("9876543210"))).unwrap();
    assert_eq!(store.bytes_in_use().unwrap(), 13);
}

#[test]
fn test_item_quota_rejects_whole_patch() {
    let store = store_with(1024, Some(8));
    let err = store
        .set(two_keys(json!(1), json!("far too long for the item quota")))
        .unwrap_err();

    match err {
        StoreError::ItemQuotaExceeded { key, quota, .. } => {
            assert_eq!(key, "b");
            assert_eq!(quota, 8);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.get(&["a", "b"]).unwrap().is_empty());
}

#[test]
fn test_remove_announces_absent_new_value() {
    let store = store();
    store.set(patch("cssStyle", json!("a { }"))).unwrap();
    let mut sub = store.subscribe("observer");

    store.remove(&["cssStyle", "never-set"]).unwrap();

    let batches = sub.drain();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0]["cssStyle"].new_value, None);
    assert!(store.get(&["cssStyle"]).unwrap().is_empty());
}

#[test]
fn test_values_persist_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.db");

    {
        let store = SharedStore::open(&path, StoreLimits::default()).unwrap();
        store.set(patch("isEnabled", json!(false))).unwrap();
    }

    let store = SharedStore::open(&path, StoreLimits::default()).unwrap();
    assert_eq!(
        store.get_all().unwrap().get("isEnabled"),
        Some(&json!(false))
    );
}

#[test]
fn test_clones_share_state_and_subscribers() {
    let store = store();
    let other = store.clone();
    let mut sub = store.subscribe("origin");

    other.set(patch("k", json!(true))).unwrap();

    assert_eq!(store.get(&["k"]).unwrap().get("k"), Some(&json!(true)));
    assert_eq!(sub.try_next().map(|c| c.len()), Some(1));
}
