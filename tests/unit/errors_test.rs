use mark_as_read::types::errors::*;

// === StoreError Tests ===

#[test]
fn store_error_quota_display() {
    let err = StoreError::QuotaExceeded {
        requested: 120,
        quota: 100,
    };
    assert_eq!(
        err.to_string(),
        "Storage quota exceeded: 120 bytes requested, quota is 100 bytes"
    );
}

#[test]
fn store_error_item_quota_display() {
    let err = StoreError::ItemQuotaExceeded {
        key: "readPages".to_string(),
        size: 9000,
        quota: 8192,
    };
    assert_eq!(
        err.to_string(),
        "Storage item quota exceeded for 'readPages': 9000 bytes, quota is 8192 bytes"
    );
}

#[test]
fn store_error_from_serde() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: StoreError = json_err.into();
    assert!(matches!(err, StoreError::SerializationError(_)));
}

#[test]
fn store_error_implements_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(StoreError::DatabaseError("locked".to_string()));
    assert!(err.source().is_none());
    assert_eq!(err.to_string(), "Storage database error: locked");
}

// === ProtocolError Tests ===

#[test]
fn protocol_error_messages() {
    assert_eq!(
        ProtocolError::ClickDataUndefined.to_string(),
        "Click data is undefined."
    );
    assert_eq!(
        ProtocolError::TabUndefined.to_string(),
        "Browser tab is undefined."
    );
    assert_eq!(
        ProtocolError::IsReadButNoMatch.to_string(),
        "Message with 'isRead' set to true but no 'match' property."
    );
}

// === PreprocessorError Tests ===

#[test]
fn preprocessor_error_is_reported_as_invalid_preprocessor() {
    for err in [
        PreprocessorError::Compile("x".to_string()),
        PreprocessorError::Evaluation("x".to_string()),
        PreprocessorError::InvalidReturn("i64".to_string()),
    ] {
        assert!(err.to_string().starts_with("Invalid preprocessor"), "{}", err);
    }
}

// === EngineError Tests ===

#[test]
fn engine_error_not_initialized_names_field() {
    let err = EngineError::NotInitialized("readPages");
    assert_eq!(
        err.to_string(),
        "Mark as read is not initialized: readPages is missing"
    );
}

#[test]
fn engine_error_not_running_message() {
    assert_eq!(
        EngineError::NotRunning.to_string(),
        "Mark as read is disabled in this tab"
    );
}

#[test]
fn engine_error_wraps_sources() {
    let err: EngineError = PreprocessorError::Compile("oops".to_string()).into();
    assert!(matches!(err, EngineError::Preprocessor(_)));

    let err: EngineError = DocumentError::NodeNotFound(7).into();
    assert_eq!(err.to_string(), "Node not found: 7");

    let err: EngineError = StoreError::DatabaseError("gone".to_string()).into();
    assert!(matches!(err, EngineError::Store(_)));
}

// === BackgroundError / SettingsError / ImportError Tests ===

#[test]
fn background_error_passes_through_protocol_message() {
    let err: BackgroundError = ProtocolError::TabUndefined.into();
    assert_eq!(err.to_string(), "Browser tab is undefined.");
}

#[test]
fn settings_error_wraps_preprocessor() {
    let err: SettingsError = PreprocessorError::Evaluation("boom".to_string()).into();
    assert!(matches!(err, SettingsError::InvalidPreprocessor(_)));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn import_error_entry_display() {
    let err = ImportError::InvalidEntry {
        index: 3,
        reason: "'url' is not a valid URL".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid read page at index 3: 'url' is not a valid URL"
    );
}

// === FormatError Tests ===

#[test]
fn format_error_mismatch_display() {
    let err = FormatError::PlaceholderMismatch {
        template: "{}-{}".to_string(),
        values: 1,
    };
    assert!(err.to_string().contains("1 values for '{}-{}'"));
}
