use std::fmt;

// === StoreError ===

/// Errors raised by the shared key-value store.
#[derive(Debug)]
pub enum StoreError {
    /// The write would grow the store past its total byte quota.
    QuotaExceeded { requested: usize, quota: usize },
    /// A single value is larger than the per-item quota.
    ItemQuotaExceeded { key: String, size: usize, quota: usize },
    /// The backing database failed.
    DatabaseError(String),
    /// A stored value could not be encoded or decoded.
    SerializationError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::QuotaExceeded { requested, quota } => write!(
                f,
                "Storage quota exceeded: {} bytes requested, quota is {} bytes",
                requested, quota
            ),
            StoreError::ItemQuotaExceeded { key, size, quota } => write!(
                f,
                "Storage item quota exceeded for '{}': {} bytes, quota is {} bytes",
                key, size, quota
            ),
            StoreError::DatabaseError(msg) => write!(f, "Storage database error: {}", msg),
            StoreError::SerializationError(msg) => {
                write!(f, "Storage serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

// === PreprocessorError ===

/// Errors raised while compiling or running a user-supplied URL preprocessor.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessorError {
    /// The source text does not parse.
    Compile(String),
    /// The script threw or hit a sandbox limit while running.
    Evaluation(String),
    /// The script finished but did not produce a string.
    InvalidReturn(String),
}

impl fmt::Display for PreprocessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessorError::Compile(msg) => {
                write!(f, "Invalid preprocessor: compile error: {}", msg)
            }
            PreprocessorError::Evaluation(msg) => {
                write!(f, "Invalid preprocessor: evaluation error: {}", msg)
            }
            PreprocessorError::InvalidReturn(type_name) => write!(
                f,
                "Invalid preprocessor: expected a string result, got {}",
                type_name
            ),
        }
    }
}

impl std::error::Error for PreprocessorError {}

// === ProtocolError ===

/// Malformed traffic between contexts. Only the offending message or click is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A toolbar click arrived without a tab id or without modifier data.
    ClickDataUndefined,
    /// A message arrived without a sender tab.
    TabUndefined,
    /// A report claimed `isRead: true` without a `match`.
    IsReadButNoMatch,
    /// A report could not be decoded.
    MalformedMessage(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ClickDataUndefined => write!(f, "Click data is undefined."),
            ProtocolError::TabUndefined => write!(f, "Browser tab is undefined."),
            ProtocolError::IsReadButNoMatch => write!(
                f,
                "Message with 'isRead' set to true but no 'match' property."
            ),
            ProtocolError::MalformedMessage(msg) => write!(f, "Malformed message: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

// === DocumentError ===

/// Errors related to document tree manipulation.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// No node with the given id exists.
    NodeNotFound(u64),
    /// The requested insertion would break the tree (e.g. a node into its own subtree).
    HierarchyRequest(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::NodeNotFound(id) => write!(f, "Node not found: {}", id),
            DocumentError::HierarchyRequest(msg) => write!(f, "Hierarchy request error: {}", msg),
        }
    }
}

impl std::error::Error for DocumentError {}

// === EngineError ===

/// Errors raised by a tab's content engine.
#[derive(Debug)]
pub enum EngineError {
    /// A field that `start()` should have initialized is missing.
    NotInitialized(&'static str),
    /// The operation needs a running engine and the engine is stopped.
    NotRunning,
    /// The URL preprocessor failed.
    Preprocessor(PreprocessorError),
    /// The shared store rejected a read or write.
    Store(StoreError),
    /// The document rejected a mutation.
    Document(DocumentError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotInitialized(field) => {
                write!(f, "Mark as read is not initialized: {} is missing", field)
            }
            EngineError::NotRunning => write!(f, "Mark as read is disabled in this tab"),
            EngineError::Preprocessor(e) => write!(f, "{}", e),
            EngineError::Store(e) => write!(f, "{}", e),
            EngineError::Document(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PreprocessorError> for EngineError {
    fn from(e: PreprocessorError) -> Self {
        EngineError::Preprocessor(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl From<DocumentError> for EngineError {
    fn from(e: DocumentError) -> Self {
        EngineError::Document(e)
    }
}

// === BackgroundError ===

/// Errors raised by the background context.
#[derive(Debug)]
pub enum BackgroundError {
    /// A click or message violated the protocol.
    Protocol(ProtocolError),
    /// The shared store rejected a read or write.
    Store(StoreError),
}

impl fmt::Display for BackgroundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundError::Protocol(e) => write!(f, "{}", e),
            BackgroundError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BackgroundError {}

impl From<ProtocolError> for BackgroundError {
    fn from(e: ProtocolError) -> Self {
        BackgroundError::Protocol(e)
    }
}

impl From<StoreError> for BackgroundError {
    fn from(e: StoreError) -> Self {
        BackgroundError::Store(e)
    }
}

// === ImportError ===

/// Errors related to importing a read-pages file.
#[derive(Debug)]
pub enum ImportError {
    /// The file is not JSON or not an array.
    InvalidJson(String),
    /// An array entry lacks a valid `url` or `datetime`.
    InvalidEntry { index: usize, reason: String },
    /// The validated pages could not be stored.
    Store(StoreError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::InvalidJson(msg) => write!(
                f,
                "The provided JSON is invalid. It should be an array of objects with 'url' and 'datetime' properties: {}",
                msg
            ),
            ImportError::InvalidEntry { index, reason } => {
                write!(f, "Invalid read page at index {}: {}", index, reason)
            }
            ImportError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        ImportError::Store(e)
    }
}

// === FormatError ===

/// Errors related to `{}` placeholder formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    /// The template has a different number of placeholders than values supplied.
    PlaceholderMismatch { template: String, values: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::PlaceholderMismatch { template, values } => write!(
                f,
                "The number of placeholders does not match the number of values ({} values for '{}').",
                values, template
            ),
        }
    }
}

impl std::error::Error for FormatError {}

// === SettingsError ===

/// Errors raised by the settings surface.
#[derive(Debug)]
pub enum SettingsError {
    /// The drafted preprocessor source was rejected; nothing was stored.
    InvalidPreprocessor(PreprocessorError),
    /// The shared store rejected a read or write.
    Store(StoreError),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::InvalidPreprocessor(e) => write!(f, "{}", e),
            SettingsError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<PreprocessorError> for SettingsError {
    fn from(e: PreprocessorError) -> Self {
        SettingsError::InvalidPreprocessor(e)
    }
}

impl From<StoreError> for SettingsError {
    fn from(e: StoreError) -> Self {
        SettingsError::Store(e)
    }
}
