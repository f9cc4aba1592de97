// Mark-as-read shared type definitions
// Each submodule defines types used across the contexts.

pub mod badge;
pub mod errors;
pub mod message;
pub mod read_page;
