//! Document store collaborators.
//!
//! The loader and the analytics queries only see the [`DocumentStore`] trait:
//! batched insert into a named collection, and pipeline execution over it.
//! Any backend with those two capabilities can stand in.
//!
//! - [`memory::MemoryStore`] keeps collections in process (tests, fakes).
//! - [`sqlite::SqliteStore`] persists each collection as a table of JSON text.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::pipeline::{EvalError, Pipeline};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors surfaced by a store. All of them are fatal for the invocation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create store directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document could not be (de)serialized: {0}")]
    Json(#[from] serde_json::Error),

    #[error("aggregation failed: {0}")]
    Pipeline(#[from] EvalError),

    #[error("invalid collection name '{0}': use letters, digits and underscores")]
    InvalidCollection(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capability contract of the backing document store.
pub trait DocumentStore {
    /// Insert `docs` into `collection` as one bulk operation, creating the
    /// collection if it does not exist yet. Returns the number inserted.
    ///
    /// A batch either lands completely or not at all.
    fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> StoreResult<usize>;

    /// Run `pipeline` over `collection`. A missing collection behaves as an
    /// empty one.
    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StoreResult<Vec<Value>>;
}

/// Collection names double as table names, so keep them to `[A-Za-z0-9_]`.
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}
