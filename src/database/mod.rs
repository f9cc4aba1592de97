//! Storage database layer.
//!
//! Provides the SQLite connection and schema migrations behind the shared store.
//!
//! # Usage
//!
//! ```no_run
//! use mark_as_read::database::Database;
//!
//! // Open a persistent database
//! let db = Database::open("mark-as-read.db").expect("failed to open database");
//!
//! // Or use an in-memory database for testing
//! let db = Database::open_in_memory().expect("failed to open in-memory database");
//!
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
