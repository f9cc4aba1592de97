//! Mark as read: tracks pages the user has read and marks links to them.
//!
//! This library crate exposes all modules for use by the host binary and integration tests.

pub mod app;
pub mod config;
pub mod database;
pub mod dom;
pub mod format;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
