//! Host configuration: where the store lives and how much it may hold.

use std::env;
use std::path::PathBuf;

use crate::platform;

/// Total storage quota, matching the browser's local storage area.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Operation budget for one preprocessor evaluation.
pub const DEFAULT_MAX_SCRIPT_OPERATIONS: u64 = 100_000;

/// Runtime configuration for the extension host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub quota_bytes: usize,
    pub item_quota_bytes: Option<usize>,
    pub max_script_operations: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir: platform::get_data_dir(),
            database_file: "mark-as-read.db".to_string(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            item_quota_bytes: None,
            max_script_operations: DEFAULT_MAX_SCRIPT_OPERATIONS,
        }
    }
}

impl HostConfig {
    /// Reads overrides from `MARK_AS_READ_*` environment variables.
    ///
    /// Unparsable numeric values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("MARK_AS_READ_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(quota) = parse_env("MARK_AS_READ_QUOTA_BYTES") {
            config.quota_bytes = quota;
        }
        if let Some(item_quota) = parse_env("MARK_AS_READ_ITEM_QUOTA_BYTES") {
            config.item_quota_bytes = Some(item_quota);
        }
        if let Some(ops) = parse_env("MARK_AS_READ_MAX_SCRIPT_OPS") {
            config.max_script_operations = ops;
        }

        config
    }

    /// Full path of the storage database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
