use serde_json::{Value, json};
use std::path::PathBuf;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Temp data dir plus a place to write input files.
#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Write `lines` as a newline-delimited file and return its path.
    pub fn write_lines(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(&path, body).expect("write fixture");
        path
    }

    pub fn store_file(&self, port: u16) -> PathBuf {
        self.data_dir().join(format!("port-{port}")).join("291db.db")
    }
}

/// Builder for one review document.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ReviewFixture {
    doc: serde_json::Map<String, Value>,
}

#[allow(dead_code)]
impl ReviewFixture {
    pub fn new(asin: &str, overall: f64) -> Self {
        let mut doc = serde_json::Map::new();
        doc.insert("asin".into(), json!(asin));
        doc.insert("overall".into(), json!(overall));
        Self { doc }
    }

    pub fn reviewer(mut self, id: &str, name: &str) -> Self {
        self.doc.insert("reviewerID".into(), json!(id));
        self.doc.insert("reviewerName".into(), json!(name));
        self
    }

    pub fn time(mut self, unix_secs: i64) -> Self {
        self.doc.insert("unixReviewTime".into(), json!(unix_secs));
        self
    }

    pub fn helpful(mut self, unhelpful: i64, helpful: i64) -> Self {
        self.doc.insert("helpful".into(), json!([unhelpful, helpful]));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.doc.insert("reviewText".into(), json!(text));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.doc)
    }

    pub fn line(self) -> String {
        self.build().to_string()
    }
}

/// A small catalogue exercising every query.
#[allow(dead_code)]
pub fn sample_reviews() -> Vec<Value> {
    const Y2013: i64 = 1_356_998_400;
    const Y2014: i64 = 1_388_534_400;
    vec![
        ReviewFixture::new("A", 5.0).reviewer("r1", "Ann").time(Y2013).build(),
        ReviewFixture::new("A", 4.0).reviewer("r2", "Bo").time(Y2014).build(),
        ReviewFixture::new("A", 3.0).reviewer("r1", "Ann B.").time(Y2014).build(),
        ReviewFixture::new("B", 4.8)
            .reviewer("r3", "Cy")
            .time(Y2013)
            .helpful(95, 5)
            .text("Five stars, would buy again")
            .build(),
        ReviewFixture::new("C", 4.5)
            .reviewer("r1", "Ann")
            .time(Y2014)
            .helpful(0, 0)
            .build(),
        ReviewFixture::new("D", 4.0).reviewer("r2", "Bo").helpful(99, 1).build(),
    ]
}

#[allow(dead_code)]
pub fn sample_lines() -> Vec<String> {
    sample_reviews().iter().map(Value::to_string).collect()
}
