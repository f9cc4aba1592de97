// Mark-as-read managers
// Stateful per-context machines: the content engine of each tab, its toggle
// controller, and the background badge manager.

pub mod annotation_engine;
pub mod badge_manager;
pub mod toggle_controller;
