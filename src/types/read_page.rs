use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::StoreError;

/// CSS class applied to links that point at read pages.
pub const MARK_AS_READ_CSS_CLASS: &str = "mark-as-read-4e3b3eef-af02-4d4a-979d-a6e44b8d7165";

/// Default marker style: bold green link with a checkmark overlay.
pub const DEFAULT_CSS_STYLE: &str = ".mark-as-read-4e3b3eef-af02-4d4a-979d-a6e44b8d7165 {\n  color: green !important;\n  font-weight: bold !important;\n  position: relative !important;\n}\n\n.mark-as-read-4e3b3eef-af02-4d4a-979d-a6e44b8d7165::before {\n  content: '✅';\n  position: absolute;\n  top: -0.5em;\n  right: -0.5em;\n}\n";

/// Default URL preprocessor: drops the query string and the fragment.
pub const DEFAULT_URL_PREPROCESSOR: &str =
    "// ignores hash and URL params\n\nstrip_fragment(strip_query($url))\n";

/// Name of the single free variable a preprocessor script receives.
pub const URL_PREPROCESSOR_ARGUMENT_NAME: &str = "$url";

/// Keys under which settings live in the shared store.
pub struct StorageKeys;

impl StorageKeys {
    pub const IS_ENABLED: &'static str = "isEnabled";
    pub const CSS_STYLE: &'static str = "cssStyle";
    pub const READ_PAGES: &'static str = "readPages";
    pub const URL_PREPROCESSOR: &'static str = "urlPreprocessor";

    pub const ALL: [&'static str; 4] = [
        Self::IS_ENABLED,
        Self::CSS_STYLE,
        Self::READ_PAGES,
        Self::URL_PREPROCESSOR,
    ];
}

/// A page the user marked as read, keyed by its normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReadPage {
    pub url: String,
    pub datetime: String,
}

impl ReadPage {
    pub fn new(url: impl Into<String>, datetime: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            datetime: datetime.into(),
        }
    }
}

/// Everything the extension persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub is_enabled: bool,
    pub css_style: String,
    pub read_pages: Vec<ReadPage>,
    pub url_preprocessor: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            css_style: DEFAULT_CSS_STYLE.to_string(),
            read_pages: Vec::new(),
            url_preprocessor: DEFAULT_URL_PREPROCESSOR.to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from a store snapshot, using defaults for missing keys.
    ///
    /// A key that is present but holds the wrong shape is an error rather than
    /// silently replaced.
    pub fn from_values(values: &Map<String, Value>) -> Result<Self, StoreError> {
        let defaults = Settings::default();

        let is_enabled = match values.get(StorageKeys::IS_ENABLED) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => defaults.is_enabled,
        };
        let css_style = match values.get(StorageKeys::CSS_STYLE) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => defaults.css_style,
        };
        let read_pages = match values.get(StorageKeys::READ_PAGES) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => defaults.read_pages,
        };
        let url_preprocessor = match values.get(StorageKeys::URL_PREPROCESSOR) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => defaults.url_preprocessor,
        };

        Ok(Self {
            is_enabled,
            css_style,
            read_pages,
            url_preprocessor,
        })
    }

    /// Flattens settings into a store patch.
    pub fn to_values(&self) -> Result<Map<String, Value>, StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::SerializationError(format!(
                "settings serialized to a non-object: {}",
                other
            ))),
        }
    }
}
