use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::format::{format_datetime, format_message, parse_datetime};
use crate::services::messaging::RuntimeBus;
use crate::services::store::{patch, SharedStore, SharedStoreTrait, StoreSubscription};
use crate::types::badge::{BadgeIcon, BadgeRender, BadgeState, ClickData, ClickOutcome, Modifier};
use crate::types::errors::{BackgroundError, ProtocolError, StoreError};
use crate::types::message::{toggle_command, Envelope, ReportMessage, TabId};
use crate::types::read_page::{Settings, StorageKeys};

pub const PRESS_TO_MARK_AS_READ_BADGE_MESSAGE: &str = "press to mark as read";
pub const READ_BADGE_MESSAGE: &str = "marked as read at {}";
pub const DISABLED_BADGE_MESSAGE: &str = "press while holding Control to enable";

/// Trait defining the background context interface.
pub trait BadgeManagerTrait {
    fn start(&mut self) -> Result<(), BackgroundError>;
    fn on_installed(&mut self) -> Result<(), BackgroundError>;
    fn handle_click(
        &mut self,
        tab: Option<TabId>,
        click: Option<&ClickData>,
    ) -> Result<ClickOutcome, BackgroundError>;
    fn handle_message(&mut self, envelope: Envelope) -> Result<Option<BadgeState>, BackgroundError>;
    fn process_pending(&mut self) -> usize;
    fn badge(&self, tab: TabId) -> Option<&BadgeState>;
    fn render(&self, tab: TabId) -> Option<BadgeRender>;
    fn tab_closed(&mut self, tab: TabId);
}

/// The long-lived background context: owns every tab's badge and routes
/// toolbar clicks.
pub struct BackgroundContext {
    store: SharedStore,
    bus: RuntimeBus,
    badges: HashMap<TabId, BadgeState>,
    inbox: Option<UnboundedReceiver<Envelope>>,
    subscription: Option<StoreSubscription>,
}

impl BackgroundContext {
    pub fn new(store: SharedStore, bus: RuntimeBus) -> Self {
        Self {
            store,
            bus,
            badges: HashMap::new(),
            inbox: None,
            subscription: None,
        }
    }

    /// Whether reports are currently being received.
    pub fn is_listening(&self) -> bool {
        self.inbox.is_some()
    }

    pub fn is_enabled(&self) -> Result<bool, StoreError> {
        let values = self.store.get(&[StorageKeys::IS_ENABLED])?;
        Ok(values
            .get(StorageKeys::IS_ENABLED)
            .and_then(Value::as_bool)
            .unwrap_or_else(|| Settings::default().is_enabled))
    }

    fn attach(&mut self) {
        if self.inbox.is_none() {
            self.inbox = Some(self.bus.listen_background());
            debug!("background listener attached");
        }
    }

    fn detach(&mut self) {
        if self.inbox.take().is_some() {
            self.bus.unlisten_background();
            debug!("background listener detached");
        }
    }

    fn toggle_enabled(&mut self, tab: TabId) -> Result<ClickOutcome, BackgroundError> {
        let was_enabled = self.is_enabled()?;
        self.store
            .set(patch(StorageKeys::IS_ENABLED, Value::Bool(!was_enabled)))?;

        if was_enabled {
            self.badges.insert(tab, BadgeState::Disabled);
            self.detach();
        } else {
            self.attach();
        }
        info!(tab_id = tab, enabled = !was_enabled, "extension enabled state toggled");
        Ok(ClickOutcome::EnabledToggled(!was_enabled))
    }

    fn forward_toggle(&mut self, tab: TabId) -> Result<ClickOutcome, BackgroundError> {
        if !self.is_enabled()? {
            return Ok(ClickOutcome::Ignored);
        }
        let delivered = self.bus.send_to_tab(tab, toggle_command());
        Ok(ClickOutcome::ToggleForwarded { delivered })
    }
}

/// Builds the toolbar title and icon set for a badge state.
pub fn render_state(state: &BadgeState) -> BadgeRender {
    let (title, icon) = match state {
        BadgeState::Disabled => (DISABLED_BADGE_MESSAGE.to_string(), BadgeIcon::Disabled),
        BadgeState::Unread => (
            PRESS_TO_MARK_AS_READ_BADGE_MESSAGE.to_string(),
            BadgeIcon::Unread,
        ),
        BadgeState::Read(datetime) => {
            let shown = parse_datetime(datetime)
                .map(|dt| format_datetime(&dt))
                .unwrap_or_else(|| datetime.clone());
            let title = format_message(READ_BADGE_MESSAGE, &[shown.as_str()])
                .unwrap_or_else(|_| READ_BADGE_MESSAGE.to_string());
            (title, BadgeIcon::Read)
        }
    };
    BadgeRender {
        title,
        icon,
        icon_paths: icon_paths(icon),
    }
}

fn icon_paths(icon: BadgeIcon) -> BTreeMap<u32, String> {
    let template = icon.path_template();
    BadgeIcon::SIZES
        .iter()
        .map(|size| {
            let size_str = size.to_string();
            let path = format_message(template, &[size_str.as_str()])
                .unwrap_or_else(|_| template.to_string());
            (*size, path)
        })
        .collect()
}

impl BadgeManagerTrait for BackgroundContext {
    /// Subscribes to the store and starts listening if the extension is enabled.
    fn start(&mut self) -> Result<(), BackgroundError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.store.subscribe("background"));
        }
        if self.is_enabled()? {
            self.attach();
        }
        Ok(())
    }

    /// Writes the default settings and starts listening.
    fn on_installed(&mut self) -> Result<(), BackgroundError> {
        self.store.set(Settings::default().to_values()?)?;
        self.attach();
        info!("default settings installed");
        Ok(())
    }

    /// Dispatches a toolbar click on the first reported modifier.
    fn handle_click(
        &mut self,
        tab: Option<TabId>,
        click: Option<&ClickData>,
    ) -> Result<ClickOutcome, BackgroundError> {
        let modifiers = click.and_then(|c| c.modifiers.as_deref());
        let (Some(tab), Some(modifiers)) = (tab, modifiers) else {
            warn!(?tab, "{}", ProtocolError::ClickDataUndefined);
            return Err(ProtocolError::ClickDataUndefined.into());
        };

        match modifiers.first() {
            Some(Modifier::Shift) => {
                debug!(tab_id = tab, "opening settings");
                Ok(ClickOutcome::OpenSettings)
            }
            Some(Modifier::Ctrl) => self.toggle_enabled(tab),
            _ => self.forward_toggle(tab),
        }
    }

    /// Applies one report to the sender's badge. Messages that are not reports are ignored.
    fn handle_message(&mut self, envelope: Envelope) -> Result<Option<BadgeState>, BackgroundError> {
        let tab = envelope.sender_tab.ok_or(ProtocolError::TabUndefined)?;
        let Some(report) = ReportMessage::from_value(&envelope.message)? else {
            return Ok(None);
        };

        let state = match report.matched {
            Some(page) if report.is_read => BadgeState::Read(page.datetime),
            _ => BadgeState::Unread,
        };
        debug!(tab_id = tab, state = ?state, "badge updated");
        self.badges.insert(tab, state.clone());
        Ok(Some(state))
    }

    /// Follows enabled-flag changes and drains the report inbox.
    fn process_pending(&mut self) -> usize {
        let mut handled = 0;

        let batches = self
            .subscription
            .as_mut()
            .map(|s| s.drain())
            .unwrap_or_default();
        for changes in batches {
            if let Some(change) = changes.get(StorageKeys::IS_ENABLED) {
                handled += 1;
                let enabled = change
                    .new_value
                    .as_ref()
                    .and_then(Value::as_bool)
                    .unwrap_or_else(|| Settings::default().is_enabled);
                if enabled {
                    self.attach();
                } else {
                    self.detach();
                }
            }
        }

        let mut envelopes = Vec::new();
        if let Some(inbox) = self.inbox.as_mut() {
            while let Ok(envelope) = inbox.try_recv() {
                envelopes.push(envelope);
            }
        }
        for envelope in envelopes {
            handled += 1;
            let sender = envelope.sender_tab;
            if let Err(e) = self.handle_message(envelope) {
                warn!(tab_id = ?sender, error = %e, "report discarded");
            }
        }

        handled
    }

    fn badge(&self, tab: TabId) -> Option<&BadgeState> {
        self.badges.get(&tab)
    }

    fn render(&self, tab: TabId) -> Option<BadgeRender> {
        self.badges.get(&tab).map(render_state)
    }

    fn tab_closed(&mut self, tab: TabId) {
        self.badges.remove(&tab);
    }
}
