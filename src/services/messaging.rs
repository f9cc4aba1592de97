//! Runtime message bus between the background and the tabs.
//!
//! Delivery is fire-and-forget: a message to a context with no listener is
//! dropped and the sender only learns that nobody received it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::types::message::{Envelope, TabId};

#[derive(Default)]
struct BusInner {
    background: Option<UnboundedSender<Envelope>>,
    tabs: HashMap<TabId, UnboundedSender<Value>>,
}

/// Cloneable handle to the message bus.
#[derive(Clone, Default)]
pub struct RuntimeBus {
    inner: Arc<Mutex<BusInner>>,
}

impl RuntimeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === Background side ===

    /// Registers the background listener, replacing any previous one.
    pub fn listen_background(&self) -> UnboundedReceiver<Envelope> {
        let (tx, rx) = unbounded_channel();
        self.lock().background = Some(tx);
        rx
    }

    pub fn unlisten_background(&self) {
        self.lock().background = None;
    }

    pub fn has_background_listener(&self) -> bool {
        self.lock()
            .background
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Sends `message` to the background, tagged with the sending tab.
    /// Returns false if nobody is listening.
    pub fn send_to_background(&self, sender_tab: Option<TabId>, message: Value) -> bool {
        let mut inner = self.lock();
        let Some(tx) = inner.background.as_ref() else {
            debug!(?sender_tab, "no background listener; message dropped");
            return false;
        };
        if tx.send(Envelope { sender_tab, message }).is_err() {
            inner.background = None;
            debug!(?sender_tab, "background listener gone; message dropped");
            return false;
        }
        true
    }

    // === Tab side ===

    /// Registers the listener for `tab`, replacing any previous one.
    pub fn listen_tab(&self, tab: TabId) -> UnboundedReceiver<Value> {
        let (tx, rx) = unbounded_channel();
        self.lock().tabs.insert(tab, tx);
        rx
    }

    pub fn unlisten_tab(&self, tab: TabId) {
        self.lock().tabs.remove(&tab);
    }

    pub fn has_tab_listener(&self, tab: TabId) -> bool {
        self.lock()
            .tabs
            .get(&tab)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Sends `message` to the content engine in `tab`.
    /// Returns false if nobody is listening there.
    pub fn send_to_tab(&self, tab: TabId, message: Value) -> bool {
        let mut inner = self.lock();
        let Some(tx) = inner.tabs.get(&tab) else {
            debug!(tab, "no listener in tab; message dropped");
            return false;
        };
        if tx.send(message).is_err() {
            inner.tabs.remove(&tab);
            debug!(tab, "tab listener gone; message dropped");
            return false;
        }
        true
    }
}
