// Mark-as-read Settings Surface
// Edits the marker CSS and the URL preprocessor as drafts that are only
// written to the shared store on save, and imports/exports the read-page list.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::format::{current_date, format_message, parse_datetime};
use crate::services::store::{patch, SharedStore, SharedStoreTrait};
use crate::services::url_preprocessor::{UrlPreprocessor, UrlPreprocessorTrait, PROBE_URL};
use crate::types::errors::{ImportError, PreprocessorError, SettingsError, StoreError};
use crate::types::read_page::{ReadPage, StorageKeys, DEFAULT_CSS_STYLE, DEFAULT_URL_PREPROCESSOR};

/// Download name of an export; `{}` receives the current date.
pub const EXPORT_JSON_FILE_NAME: &str = "mark-as-read-{}.json";

const JSON_CONTENT_TYPE: &str = "application/json";
const DATA_URL: &str = "data:{};charset=utf-8;base64,{}";

/// A saved value and the edit in progress on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    saved: String,
    draft: String,
}

impl Draft {
    fn new(value: String) -> Self {
        Self {
            saved: value.clone(),
            draft: value,
        }
    }

    pub fn saved(&self) -> &str {
        &self.saved
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_dirty(&self) -> bool {
        self.saved != self.draft
    }

    fn discard(&mut self) {
        self.draft = self.saved.clone();
    }

    fn commit(&mut self) {
        self.saved = self.draft.clone();
    }
}

/// An export ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub json: String,
    pub data_url: String,
}

/// Trait defining the settings surface interface.
pub trait SettingsSurfaceTrait {
    fn load(&mut self) -> Result<(), StoreError>;
    fn css(&self) -> &Draft;
    fn edit_css(&mut self, text: &str);
    fn save_css(&mut self) -> Result<(), SettingsError>;
    fn discard_css(&mut self);
    fn restore_default_css(&mut self);
    fn preprocessor(&self) -> &Draft;
    fn edit_preprocessor(&mut self, source: &str);
    fn save_preprocessor(&mut self) -> Result<(), SettingsError>;
    fn discard_preprocessor(&mut self);
    fn restore_default_preprocessor(&mut self);
    fn test_preprocessor(&self, url: &str) -> Result<String, PreprocessorError>;
    fn has_unsaved_changes(&self) -> bool;
    fn export_read_pages(&self) -> Result<ExportFile, StoreError>;
    fn import_read_pages(&mut self, json: &str) -> Result<usize, ImportError>;
}

/// Settings surface backed by the shared store.
pub struct SettingsSurface {
    store: SharedStore,
    preprocessor: UrlPreprocessor,
    css: Draft,
    url_preprocessor: Draft,
}

impl SettingsSurface {
    pub fn new(store: SharedStore, preprocessor: UrlPreprocessor) -> Self {
        Self {
            store,
            preprocessor,
            css: Draft::new(DEFAULT_CSS_STYLE.to_string()),
            url_preprocessor: Draft::new(DEFAULT_URL_PREPROCESSOR.to_string()),
        }
    }

    /// URL the preprocessor preview runs against before the user picks one.
    pub fn default_test_url() -> &'static str {
        PROBE_URL
    }
}

fn string_or(values: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    values
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Checks that `json` is an array of `{url, datetime}` objects with a parsable URL and date.
pub fn parse_read_pages(json: &str) -> Result<Vec<ReadPage>, ImportError> {
    let parsed: Value =
        serde_json::from_str(json).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
    let Value::Array(entries) = parsed else {
        return Err(ImportError::InvalidJson("expected an array".to_string()));
    };

    let mut pages = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let invalid = |reason: &str| ImportError::InvalidEntry {
            index,
            reason: reason.to_string(),
        };
        let Some(obj) = entry.as_object() else {
            return Err(invalid("not an object"));
        };
        let url = obj
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("'url' must be a string"))?;
        if Url::parse(url).is_err() {
            return Err(invalid("'url' is not a valid URL"));
        }
        let datetime = obj
            .get("datetime")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("'datetime' must be a string"))?;
        if parse_datetime(datetime).is_none() {
            return Err(invalid("'datetime' is not a valid date"));
        }
        pages.push(ReadPage::new(url, datetime));
    }
    Ok(pages)
}

impl SettingsSurfaceTrait for SettingsSurface {
    /// Loads the saved CSS and preprocessor, using defaults for missing keys.
    /// Any draft in progress is replaced.
    fn load(&mut self) -> Result<(), StoreError> {
        let values = self
            .store
            .get(&[StorageKeys::CSS_STYLE, StorageKeys::URL_PREPROCESSOR])?;
        self.css = Draft::new(string_or(&values, StorageKeys::CSS_STYLE, DEFAULT_CSS_STYLE));
        self.url_preprocessor = Draft::new(string_or(
            &values,
            StorageKeys::URL_PREPROCESSOR,
            DEFAULT_URL_PREPROCESSOR,
        ));
        Ok(())
    }

    fn css(&self) -> &Draft {
        &self.css
    }

    fn edit_css(&mut self, text: &str) {
        self.css.draft = text.to_string();
    }

    fn save_css(&mut self) -> Result<(), SettingsError> {
        self.store.set(patch(
            StorageKeys::CSS_STYLE,
            Value::String(self.css.draft.clone()),
        ))?;
        self.css.commit();
        Ok(())
    }

    fn discard_css(&mut self) {
        self.css.discard();
    }

    fn restore_default_css(&mut self) {
        self.edit_css(DEFAULT_CSS_STYLE);
    }

    fn preprocessor(&self) -> &Draft {
        &self.url_preprocessor
    }

    fn edit_preprocessor(&mut self, source: &str) {
        self.url_preprocessor.draft = source.to_string();
    }

    /// Stores the drafted source if it compiles; an invalid draft is refused.
    fn save_preprocessor(&mut self) -> Result<(), SettingsError> {
        if let Err(e) = self.preprocessor.compile(&self.url_preprocessor.draft) {
            warn!(error = %e, "refusing to save invalid url preprocessor");
            return Err(e.into());
        }
        self.store.set(patch(
            StorageKeys::URL_PREPROCESSOR,
            Value::String(self.url_preprocessor.draft.clone()),
        ))?;
        self.url_preprocessor.commit();
        Ok(())
    }

    fn discard_preprocessor(&mut self) {
        self.url_preprocessor.discard();
    }

    fn restore_default_preprocessor(&mut self) {
        self.edit_preprocessor(DEFAULT_URL_PREPROCESSOR);
    }

    /// Runs the drafted source against `url`.
    fn test_preprocessor(&self, url: &str) -> Result<String, PreprocessorError> {
        self.preprocessor.test(&self.url_preprocessor.draft, url)
    }

    fn has_unsaved_changes(&self) -> bool {
        self.css.is_dirty() || self.url_preprocessor.is_dirty()
    }

    fn export_read_pages(&self) -> Result<ExportFile, StoreError> {
        let values = self.store.get(&[StorageKeys::READ_PAGES])?;
        let pages = values
            .get(StorageKeys::READ_PAGES)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let json = serde_json::to_string(&pages)?;

        let date = current_date();
        let encoded = STANDARD.encode(&json);
        let file_name = format_message(EXPORT_JSON_FILE_NAME, &[date.as_str()])
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let data_url = format_message(DATA_URL, &[JSON_CONTENT_TYPE, encoded.as_str()])
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        Ok(ExportFile {
            file_name,
            json,
            data_url,
        })
    }

    /// Replaces the stored read pages with the validated file contents.
    /// Nothing is written unless every entry is valid.
    fn import_read_pages(&mut self, json: &str) -> Result<usize, ImportError> {
        let pages = parse_read_pages(json)?;
        let count = pages.len();
        let value = serde_json::to_value(&pages).map_err(StoreError::from)?;
        self.store.set(patch(StorageKeys::READ_PAGES, value))?;
        info!(count, "read pages imported");
        Ok(count)
    }
}
