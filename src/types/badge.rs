use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Toolbar state for one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "datetime")]
pub enum BadgeState {
    Disabled,
    Unread,
    Read(String),
}

/// Icon set shown on the toolbar button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadgeIcon {
    Disabled,
    Read,
    Unread,
}

impl BadgeIcon {
    pub const SIZES: [u32; 2] = [16, 32];

    /// Path template; `{}` receives the icon size.
    pub fn path_template(&self) -> &'static str {
        match self {
            BadgeIcon::Disabled => "icons/disabled-{}.svg",
            BadgeIcon::Read => "icons/read-{}.svg",
            BadgeIcon::Unread => "icons/unread-{}.svg",
        }
    }
}

/// What the toolbar should display for a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeRender {
    pub title: String,
    pub icon: BadgeIcon,
    pub icon_paths: BTreeMap<u32, String>,
}

/// Modifier keys a toolbar click can report, using the browser's names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    Shift,
    Alt,
    Command,
    Ctrl,
    MacCtrl,
}

/// Data attached to a toolbar click. Missing `modifiers` counts as missing data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickData {
    #[serde(default)]
    pub modifiers: Option<Vec<Modifier>>,
    #[serde(default)]
    pub button: Option<u8>,
}

impl ClickData {
    pub fn with_modifiers(modifiers: Vec<Modifier>) -> Self {
        Self {
            modifiers: Some(modifiers),
            button: Some(0),
        }
    }
}

/// What a toolbar click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Shift-click: the settings surface should open.
    OpenSettings,
    /// Ctrl-click: the global enabled flag now has this value.
    EnabledToggled(bool),
    /// Plain click: a toggle command went to the tab. `delivered` is false if nobody listened.
    ToggleForwarded { delivered: bool },
    /// Plain click while disabled: nothing was sent.
    Ignored,
}
