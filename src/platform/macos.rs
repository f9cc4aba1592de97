// Data: ~/Library/Application Support/mark-as-read

use std::env;
use std::path::PathBuf;

use super::APP_DIR_NAME;

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
        .join("Library")
        .join("Application Support")
        .join(APP_DIR_NAME)
}
