//! SQLite-backed document store.
//!
//! Each collection is a table `docs_<name>(id INTEGER PRIMARY KEY, body TEXT)`
//! holding one JSON document per row. `insert_many` runs in a single
//! transaction; `aggregate` streams documents in insertion order through the
//! shared pipeline evaluator. A leading exact-match on top-level string fields
//! is pushed into the SQL `WHERE` clause so per-product queries do not decode
//! the whole collection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde_json::Value;
use tracing::debug;

use super::{DocumentStore, StoreError, StoreResult, validate_collection_name};
use crate::pipeline::{CmpOp, Filter, Pipeline, Stage, run_pipeline};

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the store file at `path`, creating parent directories.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // SQLite opens lazily; read the schema now so an unreadable file fails here.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "Opened sqlite store");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn table_name(collection: &str) -> String {
        format!("docs_{collection}")
    }

    /// Check whether a collection has been created.
    pub fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        validate_collection_name(collection)?;
        // Only "no row" means absent; any other error is a store failure.
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                [Self::table_name(collection)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of documents in `collection` (0 when it does not exist).
    pub fn count(&self, collection: &str) -> StoreResult<u64> {
        if !self.collection_exists(collection)? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", Self::table_name(collection));
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn ensure_collection(&self, collection: &str) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL
            )",
            Self::table_name(collection)
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn load_documents(&self, collection: &str, pushdown: &[(String, String)]) -> StoreResult<Vec<Value>> {
        let mut sql = format!("SELECT body FROM \"{}\"", Self::table_name(collection));
        let mut bind_values: Vec<String> = Vec::new();
        let mut where_parts: Vec<String> = Vec::new();
        for (field, value) in pushdown {
            bind_values.push(format!("$.\"{field}\""));
            let path_idx = bind_values.len();
            bind_values.push(value.clone());
            where_parts.push(format!("json_extract(body, ?{path_idx}) = ?{}", bind_values.len()));
        }
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        let mut docs = Vec::new();
        for body in rows {
            docs.push(serde_json::from_str(&body?)?);
        }
        Ok(docs)
    }
}

/// Top-level `field == "string"` conditions of a leading match stage.
///
/// The full pipeline still runs afterwards, so this only has to be a
/// superset filter: fields that could need quoting are left to the evaluator.
fn pushdown_equalities(pipeline: &Pipeline) -> Vec<(String, String)> {
    fn collect(filter: &Filter, out: &mut Vec<(String, String)>) {
        match filter {
            Filter::Compare {
                field,
                op: CmpOp::Eq,
                value: Value::String(s),
            } if field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                out.push((field.clone(), s.clone()));
            }
            Filter::And(children) => {
                for child in children {
                    collect(child, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    if let Some(Stage::Match(filter)) = pipeline.stages().first() {
        collect(filter, &mut out);
    }
    out
}

impl DocumentStore for SqliteStore {
    fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> StoreResult<usize> {
        validate_collection_name(collection)?;
        self.ensure_collection(collection)?;
        let sql = format!(
            "INSERT INTO \"{}\" (body) VALUES (?1)",
            Self::table_name(collection)
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for doc in &docs {
                stmt.execute([serde_json::to_string(doc)?])?;
            }
        }
        tx.commit()?;
        Ok(docs.len())
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StoreResult<Vec<Value>> {
        let docs = if self.collection_exists(collection)? {
            let pushdown = pushdown_equalities(pipeline);
            self.load_documents(collection, &pushdown)?
        } else {
            Vec::new()
        };
        debug!(collection, docs = docs.len(), %pipeline, "Running pipeline");
        Ok(run_pipeline(pipeline, docs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Accumulator, Expr, SortOrder};
    use serde_json::json;
    use tempfile::TempDir;

    fn seeded() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_many(
                "reviews",
                vec![
                    json!({"asin": "A", "overall": 5.0}),
                    json!({"asin": "B", "overall": 1.0}),
                    json!({"asin": "A", "overall": 3.0}),
                    json!({"asin": ["A"], "overall": 1.0}),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn first_insert_creates_table() {
        let store = seeded();
        assert!(store.collection_exists("reviews").unwrap());
        assert!(!store.collection_exists("other").unwrap());
        assert_eq!(store.count("reviews").unwrap(), 4);
        assert_eq!(store.count("other").unwrap(), 0);
    }

    #[test]
    fn documents_round_trip_unchanged() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let doc = json!({"asin": "X", "helpful": [1, 2], "nested": {"k": null}, "weird key": 1.5});
        store.insert_many("reviews", vec![doc.clone()]).unwrap();
        let out = store.aggregate("reviews", &Pipeline::new()).unwrap();
        assert_eq!(out, vec![doc]);
    }

    #[test]
    fn pushdown_matches_evaluator() {
        let store = seeded();
        let p = Pipeline::new()
            .filter(Filter::eq("asin", "A"))
            .group(
                Expr::field("asin"),
                [
                    ("avg", Accumulator::Avg(Expr::field("overall"))),
                    ("n", Accumulator::count()),
                ],
            );
        let out = store.aggregate("reviews", &p).unwrap();
        assert_eq!(out, vec![json!({"_id": "A", "avg": 4.0, "n": 2})]);
    }

    #[test]
    fn pushdown_only_reads_leading_string_equalities() {
        let p = Pipeline::new()
            .filter(Filter::and([
                Filter::eq("asin", "A"),
                Filter::gte("overall", 4.5),
                Filter::eq("odd field", "x"),
            ]))
            .filter(Filter::eq("reviewerID", "r"));
        assert_eq!(
            pushdown_equalities(&p),
            vec![("asin".to_string(), "A".to_string())]
        );
        let p = Pipeline::new().sort([("asin", SortOrder::Ascending)]);
        assert!(pushdown_equalities(&p).is_empty());
    }

    #[test]
    fn missing_collection_aggregates_to_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        let p = Pipeline::new().group(Expr::field("asin"), [("n", Accumulator::count())]);
        assert!(store.aggregate("reviews", &p).unwrap().is_empty());
    }

    #[test]
    fn open_creates_parent_dirs_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("port-27017").join("291db.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .insert_many("reviews", vec![json!({"asin": "A"}); 3])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count("reviews").unwrap(), 3);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    fn corrupt_file(tmp: &TempDir) -> PathBuf {
        let path = tmp.path().join("291db.db");
        std::fs::write(&path, vec![b'x'; 8 * 1024]).unwrap();
        path
    }

    #[test]
    fn open_rejects_unreadable_file() {
        let tmp = TempDir::new().unwrap();
        let err = SqliteStore::open(&corrupt_file(&tmp)).err().unwrap();
        assert!(matches!(err, StoreError::Open { .. }));
    }

    #[test]
    fn unreadable_store_fails_aggregate_instead_of_reading_empty() {
        let tmp = TempDir::new().unwrap();
        // Bypass the check in `open` to reach the query path.
        let store = SqliteStore {
            conn: Connection::open(corrupt_file(&tmp)).unwrap(),
            path: None,
        };
        assert!(store.collection_exists("reviews").is_err());
        let p = Pipeline::new().group(Expr::field("asin"), [("n", Accumulator::count())]);
        let err = store.aggregate("reviews", &p).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();
        let err = SqliteStore::open(&blocker.join("db.sqlite")).err().unwrap();
        assert!(matches!(err, StoreError::CreateDir { .. }));
    }
}
