//! Persistent storage for documents, chunks and conversations

mod sqlite;

pub use sqlite::SqliteStore;
