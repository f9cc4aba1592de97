// Data: ~/.local/share/mark-as-read

use std::env;
use std::path::PathBuf;

use super::APP_DIR_NAME;

/// Uses `$XDG_DATA_HOME/mark-as-read` if set, otherwise `~/.local/share/mark-as-read`.
pub fn get_data_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join(APP_DIR_NAME)
    } else {
        let home = env::var("HOME").unwrap_or_else(|_| String::from("/tmp"));
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME)
    }
}
