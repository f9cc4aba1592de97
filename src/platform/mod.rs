// Mark-as-read platform abstraction
// Resolves where the host keeps its storage database on each OS.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Directory name used under the platform data root.
pub const APP_DIR_NAME: &str = "mark-as-read";

/// Returns the platform-specific data directory.
///
/// - **Linux**: `~/.local/share/mark-as-read` (or `$XDG_DATA_HOME/mark-as-read`)
/// - **macOS**: `~/Library/Application Support/mark-as-read`
/// - **Windows**: `%APPDATA%/mark-as-read`
pub fn get_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
}
