//! Content engine: marks links to read pages inside one tab's document.
//!
//! The engine follows an explicit lifecycle (`Stopped → Starting → Running →
//! Stopping → Stopped`). While running it owns an injected `<style>` element,
//! a subtree observer on the body and a child-list observer on the head.
//! Store notifications, mutation records and toggle commands are queued and
//! handled one at a time by [`ContentEngine::process_pending`].

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId, ObserverId};
use crate::managers::toggle_controller;
use crate::services::messaging::RuntimeBus;
use crate::services::read_state_index::ReadStateIndex;
use crate::services::store::{
    patch, SharedStore, SharedStoreTrait, StorageChanges, StoreSubscription,
};
use crate::services::url_preprocessor::{UrlPreprocessor, UrlPreprocessorTrait, UrlTransform};
use crate::types::errors::{EngineError, PreprocessorError, StoreError};
use crate::types::message::{ReportMessage, TabId};
use crate::types::read_page::{
    ReadPage, Settings, StorageKeys, DEFAULT_CSS_STYLE, DEFAULT_URL_PREPROCESSOR,
    MARK_AS_READ_CSS_CLASS,
};

const LINK_TAG_NAME: &str = "a";
const STYLE_TAG_NAME: &str = "style";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Nodes walked while looking for links.
    pub nodes_visited: u64,
    /// Links whose marker was (re)computed.
    pub links_classified: u64,
    pub reports_sent: u64,
    /// Times the style element was put back after a third party removed it.
    pub reinjections: u64,
    pub preprocessor_compiles: u64,
}

pub struct ContentEngine {
    tab: TabId,
    store: SharedStore,
    bus: RuntimeBus,
    preprocessor: UrlPreprocessor,
    state: EngineState,
    is_enabled: bool,
    css_style: Option<String>,
    read_pages: Option<Vec<ReadPage>>,
    preprocessor_source: Option<String>,
    preprocessor_error: Option<PreprocessorError>,
    transform: Option<UrlTransform>,
    index: Option<ReadStateIndex>,
    style_element: Option<NodeId>,
    body_observer: Option<ObserverId>,
    head_observer: Option<ObserverId>,
    subscription: Option<StoreSubscription>,
    commands: Option<UnboundedReceiver<Value>>,
    stats: EngineStats,
}

impl ContentEngine {
    pub fn new(tab: TabId, store: SharedStore, bus: RuntimeBus, preprocessor: UrlPreprocessor) -> Self {
        Self {
            tab,
            store,
            bus,
            preprocessor,
            state: EngineState::Stopped,
            is_enabled: false,
            css_style: None,
            read_pages: None,
            preprocessor_source: None,
            preprocessor_error: None,
            transform: None,
            index: None,
            style_element: None,
            body_observer: None,
            head_observer: None,
            subscription: None,
            commands: None,
            stats: EngineStats::default(),
        }
    }

    // === Accessors ===

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn style_element(&self) -> Option<NodeId> {
        self.style_element
    }

    pub fn css_style(&self) -> Option<&str> {
        self.css_style.as_deref()
    }

    pub fn read_pages(&self) -> Option<&[ReadPage]> {
        self.read_pages.as_deref()
    }

    pub fn preprocessor_source(&self) -> Option<&str> {
        self.preprocessor_source.as_deref()
    }

    /// The last compile failure, cleared by the next successful compile.
    pub fn preprocessor_error(&self) -> Option<&PreprocessorError> {
        self.preprocessor_error.as_ref()
    }

    pub fn is_listening(&self) -> bool {
        self.commands.is_some() && self.bus.has_tab_listener(self.tab)
    }

    // === Lifecycle ===

    /// Subscribes to the store, loads settings and starts if enabled.
    pub fn boot(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.store.subscribe(&format!("tab:{}", self.tab)));
        }
        self.load_snapshot()?;
        debug!(tab_id = self.tab, enabled = self.is_enabled, "content engine booted");
        if self.is_enabled {
            self.start(doc)?;
        }
        Ok(())
    }

    /// Starts annotating `doc`. Starting a running engine does nothing.
    pub fn start(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        if self.state == EngineState::Running {
            return Ok(());
        }
        self.state = EngineState::Starting;
        match self.start_inner(doc) {
            Ok(()) => {
                self.state = EngineState::Running;
                info!(tab_id = self.tab, url = doc.url(), "content engine started");
                Ok(())
            }
            Err(e) => {
                warn!(tab_id = self.tab, error = %e, "content engine failed to start");
                self.stop(doc)?;
                Err(e)
            }
        }
    }

    fn start_inner(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        self.load_snapshot()?;
        self.commands = Some(self.bus.listen_tab(self.tab));
        self.inject_style(doc)?;
        self.classify_all(doc)?;
        self.report(doc)?;
        self.body_observer = Some(doc.observe(doc.body(), true)?);
        self.head_observer = Some(doc.observe(doc.head(), false)?);
        Ok(())
    }

    /// Removes every trace of the engine from `doc`. Safe to call in any state.
    pub fn stop(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        let was = self.state;
        self.state = EngineState::Stopping;

        // Observers go first so the engine's own removals are never seen.
        if let Some(id) = self.body_observer.take() {
            doc.disconnect(id);
        }
        if let Some(id) = self.head_observer.take() {
            doc.disconnect(id);
        }
        if let Some(style) = self.style_element.take() {
            if doc.node(style).is_some() {
                doc.remove(style)?;
            }
        }
        for link in doc.links() {
            doc.remove_class(link, MARK_AS_READ_CSS_CLASS)?;
        }
        if self.commands.take().is_some() {
            self.bus.unlisten_tab(self.tab);
        }

        self.state = EngineState::Stopped;
        if was != EngineState::Stopped {
            info!(tab_id = self.tab, "content engine stopped");
        }
        Ok(())
    }

    /// Stops the engine and drops its store subscription. Used when the tab closes.
    pub fn shutdown(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        self.stop(doc)?;
        self.subscription = None;
        Ok(())
    }

    // === Settings ===

    fn load_snapshot(&mut self) -> Result<(), EngineError> {
        let values = self.store.get(&StorageKeys::ALL)?;
        let settings = Settings::from_values(&values)?;

        self.is_enabled = settings.is_enabled;
        self.css_style = Some(settings.css_style);
        self.set_read_pages(settings.read_pages);
        self.apply_preprocessor_source(&settings.url_preprocessor)?;
        Ok(())
    }

    fn set_read_pages(&mut self, pages: Vec<ReadPage>) {
        self.index = Some(ReadStateIndex::build(&pages));
        self.read_pages = Some(pages);
    }

    /// Compiles `source` and makes it the active transform.
    ///
    /// On failure the previous transform stays active; with no previous one
    /// the default transform is used instead. An unchanged source is not
    /// compiled again.
    fn apply_preprocessor_source(&mut self, source: &str) -> Result<(), EngineError> {
        if self.transform.is_some() && self.preprocessor_source.as_deref() == Some(source) {
            return Ok(());
        }
        self.preprocessor_source = Some(source.to_string());
        self.stats.preprocessor_compiles += 1;
        match self.preprocessor.compile(source) {
            Ok(transform) => {
                self.transform = Some(transform);
                self.preprocessor_error = None;
            }
            Err(e) => {
                if self.transform.is_some() {
                    warn!(tab_id = self.tab, error = %e, "keeping previous url preprocessor");
                } else {
                    warn!(tab_id = self.tab, error = %e, "falling back to default url preprocessor");
                    self.transform = Some(self.preprocessor.default_transform()?);
                }
                self.preprocessor_error = Some(e);
            }
        }
        Ok(())
    }

    /// Writes `pages` to the store and, once committed, adopts them locally.
    pub(crate) fn commit_read_pages(&mut self, pages: Vec<ReadPage>) -> Result<(), EngineError> {
        let value = serde_json::to_value(&pages).map_err(StoreError::from)?;
        self.store.set(patch(StorageKeys::READ_PAGES, value))?;
        self.set_read_pages(pages);
        Ok(())
    }

    // === Classification ===

    /// Runs the active transform on `url`.
    pub fn normalize(&self, url: &str) -> Result<String, EngineError> {
        let transform = self
            .transform
            .as_ref()
            .ok_or(EngineError::NotInitialized("urlPreprocessor"))?;
        Ok(transform.apply(url)?)
    }

    /// The read record matching `url`, if any.
    pub fn lookup(&self, url: &str) -> Result<Option<ReadPage>, EngineError> {
        let index = self
            .index
            .as_ref()
            .ok_or(EngineError::NotInitialized("readPages"))?;
        let normalized = self.normalize(url)?;
        Ok(index.lookup(&normalized).cloned())
    }

    /// The read record matching the page itself.
    pub fn current_read_page(&self, doc: &Document) -> Result<Option<ReadPage>, EngineError> {
        self.lookup(doc.url())
    }

    fn classify_link(&mut self, doc: &mut Document, link: NodeId) -> Result<(), EngineError> {
        self.stats.links_classified += 1;
        let Some(href) = doc.resolve_href(link) else {
            doc.remove_class(link, MARK_AS_READ_CSS_CLASS)?;
            return Ok(());
        };
        let is_read = match self.lookup(&href) {
            Ok(found) => found.is_some(),
            Err(EngineError::Preprocessor(e)) => {
                debug!(tab_id = self.tab, href = %href, error = %e, "link left unmarked");
                false
            }
            Err(e) => return Err(e),
        };
        if is_read {
            doc.add_class(link, MARK_AS_READ_CSS_CLASS)?;
        } else {
            doc.remove_class(link, MARK_AS_READ_CSS_CLASS)?;
        }
        Ok(())
    }

    /// Classifies every link under `root`, `root` included.
    fn classify_subtree(&mut self, doc: &mut Document, root: NodeId) -> Result<(), EngineError> {
        let nodes = doc.descendants_and_self(root);
        self.stats.nodes_visited += nodes.len() as u64;
        for node in nodes {
            let is_link = doc
                .node(node)
                .map(|n| n.is_element() && n.tag_name == LINK_TAG_NAME)
                .unwrap_or(false);
            if is_link {
                self.classify_link(doc, node)?;
            }
        }
        Ok(())
    }

    fn classify_all(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        let root = doc.root();
        self.classify_subtree(doc, root)
    }

    /// Re-checks every link and re-reports the page.
    fn refresh(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        self.classify_all(doc)?;
        self.report(doc)?;
        Ok(())
    }

    /// Tells the background whether the current page is read and returns what was sent.
    ///
    /// A preprocessor failure on the page URL reports the page as unread.
    pub fn report(&mut self, doc: &Document) -> Result<ReportMessage, EngineError> {
        let message = match self.current_read_page(doc) {
            Ok(Some(page)) => ReportMessage::read(page),
            Ok(None) => ReportMessage::unread(),
            Err(EngineError::Preprocessor(e)) => {
                warn!(tab_id = self.tab, error = %e, "could not normalize page url");
                ReportMessage::unread()
            }
            Err(e) => return Err(e),
        };
        self.bus.send_to_background(Some(self.tab), message.to_value());
        self.stats.reports_sent += 1;
        Ok(message)
    }

    // === Style element ===

    fn inject_style(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        let css = self
            .css_style
            .clone()
            .ok_or(EngineError::NotInitialized("cssStyle"))?;
        let style = match self.style_element {
            Some(id) if doc.node(id).is_some() => id,
            _ => {
                let id = doc.create_element(STYLE_TAG_NAME);
                self.style_element = Some(id);
                id
            }
        };
        doc.set_text_content(style, &css)?;
        if doc.parent(style) != Some(doc.head()) {
            doc.append_child(doc.head(), style)?;
        }
        Ok(())
    }

    fn update_style(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        let style = self
            .style_element
            .ok_or(EngineError::NotInitialized("cssStyleElement"))?;
        let css = self.css_style.as_deref().unwrap_or(DEFAULT_CSS_STYLE);
        doc.set_text_content(style, css)?;
        Ok(())
    }

    // === Event handling ===

    /// Handles every queued store notification, mutation batch and toggle
    /// command. Returns how many were handled.
    ///
    /// A failing callback is logged and does not stop the others.
    pub fn process_pending(&mut self, doc: &mut Document) -> usize {
        let mut handled = 0;

        let batches = self
            .subscription
            .as_mut()
            .map(|s| s.drain())
            .unwrap_or_default();
        for changes in batches {
            handled += 1;
            if let Err(e) = self.on_storage_changes(doc, &changes) {
                warn!(tab_id = self.tab, error = %e, "failed to apply storage change");
            }
        }

        if let Some(observer) = self.body_observer {
            let records = doc.take_records(observer);
            if !records.is_empty() {
                handled += 1;
                let added: Vec<NodeId> = records.into_iter().flat_map(|r| r.added_nodes).collect();
                if let Err(e) = self.on_body_change(doc, &added) {
                    warn!(tab_id = self.tab, error = %e, "failed to classify added nodes");
                }
            }
        }

        if let Some(observer) = self.head_observer {
            let records = doc.take_records(observer);
            if !records.is_empty() {
                handled += 1;
                let removed = self
                    .style_element
                    .map(|style| records.iter().any(|r| r.removed_nodes.contains(&style)))
                    .unwrap_or(false);
                if removed {
                    if let Err(e) = self.reinject_style(doc) {
                        warn!(tab_id = self.tab, error = %e, "failed to reinject style");
                    }
                }
            }
        }

        let mut commands = Vec::new();
        if let Some(rx) = self.commands.as_mut() {
            while let Ok(command) = rx.try_recv() {
                commands.push(command);
            }
        }
        for _command in commands {
            handled += 1;
            if let Err(e) = toggle_controller::toggle_current_page(self, doc) {
                warn!(tab_id = self.tab, error = %e, "toggle failed");
            }
        }

        handled
    }

    fn on_body_change(&mut self, doc: &mut Document, added: &[NodeId]) -> Result<(), EngineError> {
        for node in added {
            // Skip nodes detached again before this batch ran.
            if doc.is_connected(*node) {
                self.classify_subtree(doc, *node)?;
            }
        }
        Ok(())
    }

    fn reinject_style(&mut self, doc: &mut Document) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        self.inject_style(doc)?;
        self.stats.reinjections += 1;
        info!(tab_id = self.tab, "style element reinjected");
        Ok(())
    }

    fn on_storage_changes(
        &mut self,
        doc: &mut Document,
        changes: &StorageChanges,
    ) -> Result<(), EngineError> {
        if let Some(change) = changes.get(StorageKeys::IS_ENABLED) {
            let enabled = change
                .new_value
                .as_ref()
                .and_then(Value::as_bool)
                .unwrap_or_else(|| Settings::default().is_enabled);
            self.is_enabled = enabled;
            if enabled {
                // start() reloads every key, covering the rest of this batch.
                return self.start(doc);
            }
            return self.stop(doc);
        }

        if self.state != EngineState::Running {
            return Ok(());
        }

        let mut needs_refresh = false;

        if let Some(change) = changes.get(StorageKeys::CSS_STYLE) {
            self.css_style = Some(
                change
                    .new_value
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_CSS_STYLE)
                    .to_string(),
            );
            self.update_style(doc)?;
            needs_refresh = true;
        }

        if let Some(change) = changes.get(StorageKeys::READ_PAGES) {
            let pages: Vec<ReadPage> = match &change.new_value {
                Some(value) => serde_json::from_value(value.clone()).map_err(StoreError::from)?,
                None => Vec::new(),
            };
            self.set_read_pages(pages);
            needs_refresh = true;
        }

        if let Some(change) = changes.get(StorageKeys::URL_PREPROCESSOR) {
            let source = change
                .new_value
                .as_ref()
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_URL_PREPROCESSOR)
                .to_string();
            self.apply_preprocessor_source(&source)?;
            needs_refresh = true;
        }

        if needs_refresh {
            self.refresh(doc)?;
        }
        Ok(())
    }
}
