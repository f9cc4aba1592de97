//! Shared Store: the single source of truth every context reads and writes.
//!
//! Values are JSON documents keyed by string and persisted in SQLite. Every
//! committed change is fanned out to all live subscriptions, including the
//! writer's own, through per-subscriber queues that each context drains when
//! it gets to run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{HostConfig, DEFAULT_QUOTA_BYTES};
use crate::database::connection::Database;
use crate::types::errors::StoreError;

/// Old and new value of one key. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// One notification: every key a single `set` or `remove` changed.
pub type StorageChanges = BTreeMap<String, StorageChange>;

/// Size limits enforced on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub quota_bytes: usize,
    pub item_quota_bytes: Option<usize>,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_QUOTA_BYTES,
            item_quota_bytes: None,
        }
    }
}

impl From<&HostConfig> for StoreLimits {
    fn from(config: &HostConfig) -> Self {
        Self {
            quota_bytes: config.quota_bytes,
            item_quota_bytes: config.item_quota_bytes,
        }
    }
}

/// Trait defining the shared store interface.
pub trait SharedStoreTrait {
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError>;
    fn get_all(&self) -> Result<Map<String, Value>, StoreError>;
    fn set(&self, patch: Map<String, Value>) -> Result<(), StoreError>;
    fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
    fn subscribe(&self, context: &str) -> StoreSubscription;
    fn bytes_in_use(&self) -> Result<usize, StoreError>;
}

struct Subscriber {
    id: Uuid,
    context: String,
    tx: UnboundedSender<StorageChanges>,
}

struct StoreInner {
    db: Database,
    limits: StoreLimits,
    subscribers: Vec<Subscriber>,
}

/// Cloneable handle to the shared store. Every context holds its own clone.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<StoreInner>>,
}

/// A context's change feed. Dropping it unsubscribes.
pub struct StoreSubscription {
    id: Uuid,
    rx: UnboundedReceiver<StorageChanges>,
    store: SharedStore,
}

impl StoreSubscription {
    /// Pops the next pending notification without waiting.
    pub fn try_next(&mut self) -> Option<StorageChanges> {
        self.rx.try_recv().ok()
    }

    /// Takes every pending notification in delivery order.
    pub fn drain(&mut self) -> Vec<StorageChanges> {
        let mut out = Vec::new();
        while let Ok(changes) = self.rx.try_recv() {
            out.push(changes);
        }
        out
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn entry_size(key: &str, value_json: &str) -> usize {
    key.len() + value_json.len()
}

impl SharedStore {
    pub fn new(db: Database, limits: StoreLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                db,
                limits,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Opens a store persisted at `path`.
    pub fn open<P: AsRef<Path>>(path: P, limits: StoreLimits) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?, limits))
    }

    /// Opens a store that lives only as long as this handle and its clones.
    pub fn in_memory(limits: StoreLimits) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?, limits))
    }

    pub fn limits(&self) -> Result<StoreLimits, StoreError> {
        Ok(self.lock()?.limits)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().map(|inner| inner.subscribers.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::DatabaseError(format!("store lock poisoned: {}", e)))
    }

    fn unsubscribe(&self, id: Uuid) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.retain(|s| s.id != id);
        }
    }

    fn read_raw(inner: &StoreInner, key: &str) -> Result<Option<String>, StoreError> {
        let raw = inner
            .db
            .connection()
            .query_row(
                "SELECT value FROM storage WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn total_bytes(inner: &StoreInner) -> Result<usize, StoreError> {
        let total: i64 = inner.db.connection().query_row(
            "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) FROM storage",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as usize)
    }

    /// Sends `changes` to every subscriber, forgetting those whose receiver is gone.
    fn broadcast(inner: &mut StoreInner, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        inner.subscribers.retain(|s| {
            let delivered = s.tx.send(changes.clone()).is_ok();
            if !delivered {
                debug!(context = %s.context, "dropping closed store subscription");
            }
            delivered
        });
    }
}

impl SharedStoreTrait for SharedStore {
    /// Returns the stored values for `keys`; absent keys are omitted.
    fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let inner = self.lock()?;
        let mut out = Map::new();
        for key in keys {
            if let Some(raw) = Self::read_raw(&inner, key)? {
                out.insert((*key).to_string(), serde_json::from_str(&raw)?);
            }
        }
        Ok(out)
    }

    fn get_all(&self) -> Result<Map<String, Value>, StoreError> {
        let inner = self.lock()?;
        let conn = inner.db.connection();
        let mut stmt = conn.prepare("SELECT key, value FROM storage ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Map::new();
        for row in rows {
            let (key, raw) = row?;
            out.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(out)
    }

    /// Writes every key in `patch` atomically.
    ///
    /// Fails without writing anything if the result would exceed the total
    /// quota or a value exceeds the per-item quota. Only keys whose value
    /// actually changed are committed and announced.
    fn set(&self, patch: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let limits = inner.limits;

        let mut pending: Vec<(String, Option<Value>, Value, String)> = Vec::new();
        let mut delta: i64 = 0;

        for (key, new_value) in patch {
            let new_json = serde_json::to_string(&new_value)?;
            let new_size = entry_size(&key, &new_json);

            if let Some(item_quota) = limits.item_quota_bytes {
                if new_size > item_quota {
                    warn!(key = %key, size = new_size, quota = item_quota, "storage item quota exceeded");
                    return Err(StoreError::ItemQuotaExceeded {
                        key,
                        size: new_size,
                        quota: item_quota,
                    });
                }
            }

            let old_raw = Self::read_raw(&inner, &key)?;
            if old_raw.as_deref() == Some(new_json.as_str()) {
                continue;
            }
            let old_size = old_raw.as_ref().map(|raw| entry_size(&key, raw)).unwrap_or(0);
            delta += new_size as i64 - old_size as i64;

            let old_value = match old_raw {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            pending.push((key, old_value, new_value, new_json));
        }

        if pending.is_empty() {
            return Ok(());
        }

        let requested = (Self::total_bytes(&inner)? as i64 + delta).max(0) as usize;
        if requested > limits.quota_bytes {
            warn!(requested, quota = limits.quota_bytes, "storage quota exceeded");
            return Err(StoreError::QuotaExceeded {
                requested,
                quota: limits.quota_bytes,
            });
        }

        let timestamp = now();
        {
            let tx = inner.db.connection().unchecked_transaction()?;
            for (key, _, _, new_json) in &pending {
                tx.execute(
                    "INSERT INTO storage (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, new_json, timestamp],
                )?;
            }
            tx.commit()?;
        }

        let mut changes = StorageChanges::new();
        for (key, old_value, new_value, _) in pending {
            changes.insert(
                key,
                StorageChange {
                    old_value,
                    new_value: Some(new_value),
                },
            );
        }
        debug!(keys = ?changes.keys().collect::<Vec<_>>(), "storage committed");
        Self::broadcast(&mut inner, changes);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let mut changes = StorageChanges::new();
        {
            let tx = inner.db.connection().unchecked_transaction()?;
            for key in keys {
                let old_raw = tx
                    .query_row(
                        "SELECT value FROM storage WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                if let Some(raw) = old_raw {
                    tx.execute("DELETE FROM storage WHERE key = ?1", params![key])?;
                    changes.insert(
                        (*key).to_string(),
                        StorageChange {
                            old_value: Some(serde_json::from_str(&raw)?),
                            new_value: None,
                        },
                    );
                }
            }
            tx.commit()?;
        }
        Self::broadcast(&mut inner, changes);
        Ok(())
    }

    fn subscribe(&self, context: &str) -> StoreSubscription {
        let (tx, rx) = unbounded_channel();
        let id = Uuid::new_v4();
        match self.inner.lock() {
            Ok(mut inner) => inner.subscribers.push(Subscriber {
                id,
                context: context.to_string(),
                tx,
            }),
            Err(e) => warn!(context, error = %e, "store lock poisoned; subscription will stay silent"),
        }
        StoreSubscription {
            id,
            rx,
            store: self.clone(),
        }
    }

    fn bytes_in_use(&self) -> Result<usize, StoreError> {
        let inner = self.lock()?;
        Self::total_bytes(&inner)
    }
}

/// Shorthand for building a single-key patch.
pub fn patch(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}
