//! In-process document store.

use std::collections::HashMap;

use serde_json::Value;

use super::{DocumentStore, StoreResult, validate_collection_name};
use crate::pipeline::{Pipeline, run_pipeline};

/// Collections held in memory, in insertion order.
///
/// Also records the size of every `insert_many` call, which is how batch
/// boundaries are observed in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Value>>,
    insert_log: Vec<(String, usize)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents of `collection`, or an empty slice when it was never created.
    pub fn documents(&self, collection: &str) -> &[Value] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Batch sizes of every insert call against `collection`, in call order.
    pub fn batch_sizes(&self, collection: &str) -> Vec<usize> {
        self.insert_log
            .iter()
            .filter(|(name, _)| name == collection)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> StoreResult<usize> {
        validate_collection_name(collection)?;
        let n = docs.len();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        self.insert_log.push((collection.to_string(), n));
        Ok(n)
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StoreResult<Vec<Value>> {
        validate_collection_name(collection)?;
        let docs = self.documents(collection).to_vec();
        Ok(run_pipeline(pipeline, docs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Accumulator, Expr};
    use serde_json::json;

    #[test]
    fn first_insert_creates_collection() {
        let mut store = MemoryStore::new();
        assert!(!store.has_collection("reviews"));
        store
            .insert_many("reviews", vec![json!({"asin": "A"})])
            .unwrap();
        assert!(store.has_collection("reviews"));
        assert_eq!(store.documents("reviews").len(), 1);
    }

    #[test]
    fn aggregate_on_missing_collection_is_empty() {
        let store = MemoryStore::new();
        let p = Pipeline::new().group(Expr::field("asin"), [("n", Accumulator::count())]);
        assert!(store.aggregate("reviews", &p).unwrap().is_empty());
    }

    #[test]
    fn batch_sizes_are_recorded_per_collection() {
        let mut store = MemoryStore::new();
        store.insert_many("a", vec![json!({}); 3]).unwrap();
        store.insert_many("b", vec![json!({})]).unwrap();
        store.insert_many("a", vec![json!({}); 2]).unwrap();
        assert_eq!(store.batch_sizes("a"), vec![3, 2]);
        assert_eq!(store.batch_sizes("b"), vec![1]);
    }

    #[test]
    fn rejects_bad_collection_names() {
        let mut store = MemoryStore::new();
        assert!(store.insert_many("no spaces", vec![json!({})]).is_err());
    }
}
