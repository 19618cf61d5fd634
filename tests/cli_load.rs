use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use reviewdb::store::SqliteStore;

mod util;
use util::{ReviewFixture, TempFixtureDir, sample_lines};

fn base_cmd(fixture: &TempFixtureDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("reviewdb"));
    let home = fixture.path();
    cmd.env("HOME", &home);
    cmd.env("XDG_CONFIG_HOME", home.join(".config"));
    cmd.env("XDG_DATA_HOME", home.join(".local/share"));
    cmd.env("REVIEWDB_CONFIG", home.join("absent.toml"));
    cmd.env_remove("REVIEWDB_DATA_DIR");
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn load_prints_summary_and_persists() {
    let fx = TempFixtureDir::new();
    let input = fx.write_lines("reviews.json", &sample_lines());

    base_cmd(&fx)
        .arg("load")
        .arg(&input)
        .arg("27017")
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .success()
        .stdout(contains("Successfully loaded data from"))
        .stdout(contains("Database: 291db"))
        .stdout(contains("Collection: reviews"))
        .stdout(contains("Inserted: 6 documents in 1 batches"))
        .stdout(contains("Skipped: 0 undecodable lines"));

    let store = SqliteStore::open(&fx.store_file(27017)).unwrap();
    assert_eq!(store.count("reviews").unwrap(), 6);
}

#[test]
fn bad_lines_are_reported_and_skipped() {
    let fx = TempFixtureDir::new();
    let mut lines = sample_lines();
    lines.insert(2, "{not json".to_string());
    lines.push(String::new());
    let input = fx.write_lines("reviews.json", &lines);

    base_cmd(&fx)
        .args(["load"])
        .arg(&input)
        .arg("1")
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .success()
        .stdout(contains("Inserted: 6 documents"))
        .stdout(contains("Skipped: 2 undecodable lines"))
        .stderr(contains("Error decoding JSON line"))
        .stderr(contains("{not json"));
}

#[test]
fn batch_size_flag_controls_batches() {
    let fx = TempFixtureDir::new();
    let lines: Vec<String> = (0..7)
        .map(|i| ReviewFixture::new(&format!("P{i}"), 4.0).line())
        .collect();
    let input = fx.write_lines("reviews.json", &lines);

    let out = base_cmd(&fx)
        .arg("--json")
        .arg("load")
        .arg(&input)
        .arg("2")
        .args(["--batch-size", "3"])
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["report"]["inserted"], 7);
    assert_eq!(summary["report"]["batches"], 3);
    assert_eq!(summary["database"], "291db");
}

#[test]
fn data_dir_from_env() {
    let fx = TempFixtureDir::new();
    let input = fx.write_lines("reviews.json", &sample_lines());

    base_cmd(&fx)
        .env("REVIEWDB_DATA_DIR", fx.data_dir())
        .arg("load")
        .arg(&input)
        .arg("4000")
        .assert()
        .success();
    assert!(fx.store_file(4000).exists());
}

#[test]
fn zero_batch_size_rejected_before_io() {
    let fx = TempFixtureDir::new();
    let input = fx.write_lines("reviews.json", &sample_lines());

    base_cmd(&fx)
        .arg("load")
        .arg(&input)
        .arg("5")
        .args(["--batch-size", "0"])
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .code(2)
        .stderr(contains("batch size must be at least 1"));
    assert!(!fx.store_file(5).exists());
}

#[test]
fn missing_input_file_fails() {
    let fx = TempFixtureDir::new();

    base_cmd(&fx)
        .arg("load")
        .arg(fx.path().join("nope.json"))
        .arg("5")
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .code(4)
        .stderr(contains("failed to open"));
    assert!(!fx.store_file(5).exists());

    base_cmd(&fx)
        .args(["query", "5"])
        .arg("--data-dir")
        .arg(fx.data_dir())
        .write_stdin("2\n3\n6\n")
        .assert()
        .code(3)
        .stderr(contains("no store found for port 5"));
}

#[test]
fn json_error_envelope() {
    let fx = TempFixtureDir::new();

    base_cmd(&fx)
        .arg("--json")
        .arg("load")
        .arg(fx.path().join("nope.json"))
        .arg("5")
        .arg("--data-dir")
        .arg(fx.data_dir())
        .assert()
        .code(4)
        .stderr(contains("\"kind\":\"input\"").and(contains("\"code\":4")));
}

#[test]
fn invalid_port_is_usage_error() {
    let fx = TempFixtureDir::new();

    base_cmd(&fx)
        .args(["load", "reviews.json", "not-a-port"])
        .assert()
        .code(2);
}
