//! RPC method handler for the extension host's JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches JSON-RPC method calls to the
//! contexts owned by the `App` struct.

use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::app::App;
use crate::dom::NodeId;
use crate::managers::badge_manager::BadgeManagerTrait;
use crate::services::settings_surface::SettingsSurfaceTrait;
use crate::services::store::SharedStoreTrait;
use crate::types::badge::{ClickData, ClickOutcome};
use crate::types::message::TabId;
use crate::types::read_page::{StorageKeys, DEFAULT_URL_PREPROCESSOR, MARK_AS_READ_CSS_CLASS};

fn tab_param(params: &Value) -> Result<TabId, String> {
    let raw = params
        .get("tab_id")
        .and_then(|v| v.as_u64())
        .ok_or("missing tab_id")?;
    TabId::try_from(raw).map_err(|_| format!("invalid tab_id: {}", raw))
}

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn outcome_json(outcome: &ClickOutcome) -> Value {
    match outcome {
        ClickOutcome::OpenSettings => json!({"outcome": "openSettings"}),
        ClickOutcome::EnabledToggled(enabled) => {
            json!({"outcome": "enabledToggled", "enabled": enabled})
        }
        ClickOutcome::ToggleForwarded { delivered } => {
            json!({"outcome": "toggleForwarded", "delivered": delivered})
        }
        ClickOutcome::Ignored => json!({"outcome": "ignored"}),
    }
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        "extension.install" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            a.install().map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Tabs ───
        "tab.open" => {
            let url = str_param(params, "url")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let id = a.open_tab(url).map_err(|e| e.to_string())?;
            let state = a.tab(id).map(|t| t.engine.state());
            Ok(json!({"tab_id": id, "state": state}))
        }
        "tab.close" => {
            let id = tab_param(params)?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            Ok(json!({"ok": a.close_tab(id)}))
        }
        "tab.toggle" => {
            let id = tab_param(params)?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let outcome = a
                .toggle_tab(id)
                .ok_or_else(|| format!("unknown tab: {}", id))?
                .map_err(|e| e.to_string())?;
            serde_json::to_value(outcome).map_err(|e| e.to_string())
        }
        "tab.links" => {
            let id = tab_param(params)?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let tab = a.tab(id).ok_or_else(|| format!("unknown tab: {}", id))?;
            let doc = &tab.document;
            let links: Vec<Value> = doc
                .links()
                .into_iter()
                .map(|link| {
                    json!({
                        "node_id": link.0,
                        "href": doc.resolve_href(link),
                        "marked": doc.has_class(link, MARK_AS_READ_CSS_CLASS),
                    })
                })
                .collect();
            Ok(json!(links))
        }

        // ─── Page DOM ───
        "dom.append_link" => {
            let id = tab_param(params)?;
            let href = str_param(params, "href")?;
            let parent = params.get("parent_id").and_then(|v| v.as_u64()).map(NodeId);
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let tab = a.tab_mut(id).ok_or_else(|| format!("unknown tab: {}", id))?;
            let parent = parent.unwrap_or_else(|| tab.document.body());
            let link = tab.document.create_link(href);
            tab.document
                .append_child(parent, link)
                .map_err(|e| e.to_string())?;
            a.run_until_idle();
            Ok(json!({"node_id": link.0}))
        }
        "dom.clear_head" => {
            let id = tab_param(params)?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let tab = a.tab_mut(id).ok_or_else(|| format!("unknown tab: {}", id))?;
            let head = tab.document.head();
            tab.document.clear_children(head).map_err(|e| e.to_string())?;
            a.run_until_idle();
            Ok(json!({"ok": true}))
        }

        // ─── Toolbar ───
        "toolbar.click" => {
            let tab = params
                .get("tab_id")
                .and_then(|v| v.as_u64())
                .and_then(|raw| TabId::try_from(raw).ok());
            let click = match params.get("click") {
                Some(Value::Null) | None => None,
                Some(raw) => Some(
                    serde_json::from_value::<ClickData>(raw.clone())
                        .map_err(|e| format!("invalid click data: {}", e))?,
                ),
            };
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let outcome = a.click_toolbar(tab, click).map_err(|e| e.to_string())?;
            Ok(outcome_json(&outcome))
        }
        "badge.get" => {
            let id = tab_param(params)?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let state = a.background.badge(id).cloned();
            let render = a.background.render(id);
            Ok(json!({"state": state, "render": render}))
        }

        // ─── Storage ───
        "storage.get" => {
            let keys: Option<Vec<String>> = match params.get("keys") {
                Some(Value::Array(arr)) => Some(
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            };
            let a = app.lock().map_err(|e| e.to_string())?;
            let values: Map<String, Value> = match keys {
                Some(keys) => {
                    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                    a.store.get(&refs).map_err(|e| e.to_string())?
                }
                None => a.store.get_all().map_err(|e| e.to_string())?,
            };
            Ok(Value::Object(values))
        }

        // ─── Settings surface ───
        "settings.css.save" => {
            let css = str_param(params, "css")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let surface = a.open_settings().map_err(|e| e.to_string())?;
            surface.edit_css(css);
            surface.save_css().map_err(|e| e.to_string())?;
            a.run_until_idle();
            Ok(json!({"ok": true}))
        }
        "settings.preprocessor.save" => {
            let source = str_param(params, "source")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let surface = a.open_settings().map_err(|e| e.to_string())?;
            surface.edit_preprocessor(source);
            let saved = surface.save_preprocessor();
            if saved.is_err() {
                surface.discard_preprocessor();
            }
            saved.map_err(|e| e.to_string())?;
            a.run_until_idle();
            Ok(json!({"ok": true}))
        }
        "settings.preprocessor.test" => {
            let url = str_param(params, "url")?;
            let a = app.lock().map_err(|e| e.to_string())?;
            let result = match params.get("source").and_then(|v| v.as_str()) {
                Some(source) => a.preprocessor.test(source, url),
                None => match a.settings.as_ref() {
                    Some(surface) => surface.test_preprocessor(url),
                    None => {
                        let stored = a
                            .store
                            .get(&[StorageKeys::URL_PREPROCESSOR])
                            .map_err(|e| e.to_string())?;
                        let source = stored
                            .get(StorageKeys::URL_PREPROCESSOR)
                            .and_then(|v| v.as_str())
                            .unwrap_or(DEFAULT_URL_PREPROCESSOR)
                            .to_string();
                        a.preprocessor.test(&source, url)
                    }
                },
            };
            match result {
                Ok(normalized) => Ok(json!({"ok": true, "result": normalized})),
                Err(e) => Ok(json!({"ok": false, "error": e.to_string()})),
            }
        }
        "settings.export" => {
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let surface = a.open_settings().map_err(|e| e.to_string())?;
            let export = surface.export_read_pages().map_err(|e| e.to_string())?;
            serde_json::to_value(export).map_err(|e| e.to_string())
        }
        "settings.import" => {
            let json_text = str_param(params, "json")?;
            let mut a = app.lock().map_err(|e| e.to_string())?;
            let surface = a.open_settings().map_err(|e| e.to_string())?;
            let count = surface
                .import_read_pages(json_text)
                .map_err(|e| e.to_string())?;
            a.run_until_idle();
            Ok(json!({"imported": count}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
