//! Extension host.
//!
//! Owns the shared store and message bus, the background context, every open
//! tab (document plus content engine) and the settings surface when open.
//! Contexts never call each other directly; [`App::run_until_idle`] lets each
//! one drain its queues in turn until nothing is left to do.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::dom::Document;
use crate::managers::annotation_engine::ContentEngine;
use crate::managers::badge_manager::{BackgroundContext, BadgeManagerTrait};
use crate::managers::toggle_controller::{self, ToggleOutcome};
use crate::services::messaging::RuntimeBus;
use crate::services::settings_surface::{SettingsSurface, SettingsSurfaceTrait};
use crate::services::store::{SharedStore, StoreLimits};
use crate::services::url_preprocessor::{PreprocessorConfig, UrlPreprocessor};
use crate::types::badge::{ClickData, ClickOutcome};
use crate::types::errors::{BackgroundError, EngineError, StoreError};
use crate::types::message::TabId;

/// Upper bound on pump rounds so two contexts can never ping-pong forever.
const MAX_PUMP_ROUNDS: usize = 64;

/// One browsing tab: its page and the engine annotating it.
pub struct Tab {
    pub document: Document,
    pub engine: ContentEngine,
}

pub struct App {
    pub config: HostConfig,
    pub store: SharedStore,
    pub bus: RuntimeBus,
    pub preprocessor: UrlPreprocessor,
    pub background: BackgroundContext,
    pub tabs: BTreeMap<TabId, Tab>,
    pub settings: Option<SettingsSurface>,
    next_tab_id: TabId,
}

impl App {
    /// Opens the on-disk store described by `config` and starts the background context.
    pub fn new(config: HostConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = SharedStore::open(config.database_path(), StoreLimits::from(&config))?;
        Self::with_store(config, store)
    }

    /// Like [`App::new`] but with a throwaway in-memory store.
    pub fn in_memory(config: HostConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = SharedStore::in_memory(StoreLimits::from(&config))?;
        Self::with_store(config, store)
    }

    fn with_store(config: HostConfig, store: SharedStore) -> Result<Self, Box<dyn std::error::Error>> {
        let bus = RuntimeBus::new();
        let preprocessor = UrlPreprocessor::new(PreprocessorConfig::from(&config));
        let mut background = BackgroundContext::new(store.clone(), bus.clone());
        background.start()?;

        Ok(Self {
            config,
            store,
            bus,
            preprocessor,
            background,
            tabs: BTreeMap::new(),
            settings: None,
            next_tab_id: 1,
        })
    }

    /// First-install hook: writes the default settings.
    pub fn install(&mut self) -> Result<(), BackgroundError> {
        self.background.on_installed()?;
        self.run_until_idle();
        Ok(())
    }

    /// Opens a tab on `url` and boots its content engine.
    pub fn open_tab(&mut self, url: &str) -> Result<TabId, EngineError> {
        let id = self.next_tab_id;
        self.next_tab_id += 1;

        let mut document = Document::new(url);
        let mut engine = ContentEngine::new(
            id,
            self.store.clone(),
            self.bus.clone(),
            self.preprocessor.clone(),
        );
        engine.boot(&mut document)?;
        self.tabs.insert(id, Tab { document, engine });
        debug!(tab_id = id, url, "tab opened");

        self.run_until_idle();
        Ok(id)
    }

    /// Closes a tab. Returns false if no such tab was open.
    pub fn close_tab(&mut self, id: TabId) -> bool {
        let Some(mut tab) = self.tabs.remove(&id) else {
            return false;
        };
        if let Err(e) = tab.engine.shutdown(&mut tab.document) {
            warn!(tab_id = id, error = %e, "content engine did not shut down cleanly");
        }
        self.background.tab_closed(id);
        debug!(tab_id = id, "tab closed");
        true
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.get(&id)
    }

    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.get_mut(&id)
    }

    /// Toggles the current page of tab `id` directly, as the keyboard shortcut would.
    pub fn toggle_tab(&mut self, id: TabId) -> Option<Result<ToggleOutcome, EngineError>> {
        let tab = self.tabs.get_mut(&id)?;
        let outcome = toggle_controller::toggle_current_page(&mut tab.engine, &tab.document);
        self.run_until_idle();
        Some(outcome)
    }

    /// Delivers a toolbar click to the background context.
    pub fn click_toolbar(
        &mut self,
        tab: Option<TabId>,
        click: Option<ClickData>,
    ) -> Result<ClickOutcome, BackgroundError> {
        let outcome = self.background.handle_click(tab, click.as_ref())?;
        if outcome == ClickOutcome::OpenSettings {
            if let Err(e) = self.open_settings() {
                warn!(error = %e, "could not open settings");
            }
        }
        self.run_until_idle();
        Ok(outcome)
    }

    /// Opens the settings surface (loading it on first use) and returns it.
    pub fn open_settings(&mut self) -> Result<&mut SettingsSurface, StoreError> {
        if self.settings.is_none() {
            let mut surface = SettingsSurface::new(self.store.clone(), self.preprocessor.clone());
            surface.load()?;
            self.settings = Some(surface);
        }
        self.settings
            .as_mut()
            .ok_or_else(|| StoreError::DatabaseError("settings surface unavailable".to_string()))
    }

    pub fn close_settings(&mut self) {
        self.settings = None;
    }

    /// Lets every context handle its queued work until all queues are empty.
    /// Returns the number of callbacks run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut handled = self.background.process_pending();
            for tab in self.tabs.values_mut() {
                handled += tab.engine.process_pending(&mut tab.document);
            }
            if handled == 0 {
                return total;
            }
            total += handled;
        }
        warn!(rounds = MAX_PUMP_ROUNDS, "contexts still busy after pump limit");
        total
    }
}
