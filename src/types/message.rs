use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ProtocolError;
use super::read_page::ReadPage;

/// Identifier the host assigns to each browsing tab.
pub type TabId = u32;

/// Report sent by a content engine: is the current page read, and by which record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportMessage {
    pub is_read: bool,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<ReadPage>,
}

impl ReportMessage {
    pub fn read(page: ReadPage) -> Self {
        Self {
            is_read: true,
            matched: Some(page),
        }
    }

    pub fn unread() -> Self {
        Self {
            is_read: false,
            matched: None,
        }
    }

    /// Decodes a raw message.
    ///
    /// Returns `Ok(None)` for messages that are not reports at all (not an
    /// object, or no `isRead` field); those are ignored by the receiver.
    pub fn from_value(value: &Value) -> Result<Option<Self>, ProtocolError> {
        let Some(obj) = value.as_object() else {
            return Ok(None);
        };
        if !obj.contains_key("isRead") {
            return Ok(None);
        }

        let report: ReportMessage = serde_json::from_value(value.clone())
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

        if report.is_read && report.matched.is_none() {
            return Err(ProtocolError::IsReadButNoMatch);
        }
        Ok(Some(report))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A message as the background receives it, tagged with the sending tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender_tab: Option<TabId>,
    pub message: Value,
}

/// The background-to-content toggle command. The payload is ignored by the receiver.
pub fn toggle_command() -> Value {
    Value::Null
}
