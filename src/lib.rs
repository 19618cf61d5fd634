//! reviewdb: bulk-load product reviews into a document store and query them.
//!
//! Two subcommands share one store location scheme:
//!
//! - `reviewdb load <json_file> <port>` streams a newline-delimited JSON file
//!   into the `reviews` collection in batches.
//! - `reviewdb query <port>` opens the interactive analytics menu.
//!
//! The `port` names the store instance; its data lives under
//! `<data_dir>/port-<port>/`.

pub mod analytics;
pub mod config;
pub mod loader;
pub mod menu;
pub mod pipeline;
pub mod store;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, DATA_DIR_ENV, StoreConfig};
use crate::loader::{LoadError, LoadReport};
use crate::menu::{OutputFormat, QuerySession, SessionError};
use crate::store::{SqliteStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = "reviewdb", version, about = "Load and analyze product reviews")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Machine-readable output: JSON results on stdout, JSON errors on stderr
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a newline-delimited JSON file of reviews
    Load {
        /// Path to the JSON file (one review per line)
        json_file: PathBuf,

        /// Port of the store instance to load into
        port: u16,

        /// Documents per bulk insert [default: 5000, or `batch_size` from config]
        #[arg(long)]
        batch_size: Option<usize>,

        /// Root directory of the store instances
        #[arg(long, env = DATA_DIR_ENV)]
        data_dir: Option<PathBuf>,
    },

    /// Open the interactive query menu
    Query {
        /// Port of the store instance to query
        port: u16,

        /// Root directory of the store instances
        #[arg(long, env = DATA_DIR_ENV)]
        data_dir: Option<PathBuf>,
    },
}

/// Fatal error surfaced by the binary: exit code plus a stable kind string.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {}

impl CliError {
    fn new(code: i32, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            kind,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// JSON envelope printed on stderr in `--json` mode.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "error": self })
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        let err = CliError::new(2, "config", e.to_string());
        match e {
            ConfigError::NoDataDir => err.with_hint(format!("pass --data-dir or set {DATA_DIR_ENV}")),
            _ => err.with_hint("check the file named by REVIEWDB_CONFIG or ~/.config/reviewdb/config.toml"),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CreateDir { .. } | StoreError::Open { .. } => {
                CliError::new(3, "store-open", e.to_string())
            }
            _ => CliError::new(5, "store", e.to_string()).retryable(),
        }
    }
}

impl From<LoadError> for CliError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::InvalidBatchSize => CliError::new(2, "usage", e.to_string()),
            LoadError::Open { .. } | LoadError::Read { .. } => {
                CliError::new(4, "input", e.to_string())
            }
            LoadError::Insert { .. } => CliError::new(5, "bulk-insert", e.to_string())
                .with_hint("documents from earlier batches remain in the store")
                .retryable(),
        }
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Io(_) => CliError::new(1, "io", e.to_string()),
            SessionError::Query(_) => CliError::new(5, "query", e.to_string()).retryable(),
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the `warn` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = StoreConfig::load()?;
    debug!(?config, "Loaded configuration");
    match cli.command {
        Commands::Load {
            json_file,
            port,
            batch_size,
            data_dir,
        } => run_load(
            &config,
            &json_file,
            port,
            batch_size,
            data_dir.as_deref(),
            cli.json,
        ),
        Commands::Query { port, data_dir } => {
            run_query(&config, port, data_dir.as_deref(), cli.json)
        }
    }
}

fn run_load(
    config: &StoreConfig,
    json_file: &Path,
    port: u16,
    batch_size: Option<usize>,
    data_dir: Option<&Path>,
    json_output: bool,
) -> Result<(), CliError> {
    let batch_size = batch_size.unwrap_or(config.batch_size);
    if batch_size == 0 {
        return Err(LoadError::InvalidBatchSize.into());
    }
    let data_dir = config.resolve_data_dir(data_dir)?;
    let path = config.store_path(&data_dir, port);
    // Input first: a missing file must not leave an empty store behind.
    let input = loader::open_input(json_file)?;
    let mut store = SqliteStore::open(&path)?;
    info!(
        file = %json_file.display(),
        store = %path.display(),
        collection = %config.collection,
        batch_size,
        "Loading reviews"
    );
    let report = loader::load_reader(input, &mut store, &config.collection, batch_size)?;
    info!(store = %path.display(), inserted = report.inserted, "Load complete");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_load_summary(&mut out, config, json_file, &path, &report, json_output)
        .map_err(|e| CliError::new(1, "io", e.to_string()))
}

fn write_load_summary(
    out: &mut impl Write,
    config: &StoreConfig,
    json_file: &Path,
    store_path: &Path,
    report: &LoadReport,
    json_output: bool,
) -> std::io::Result<()> {
    if json_output {
        let payload = json!({
            "file": json_file.display().to_string(),
            "store": store_path.display().to_string(),
            "database": config.database,
            "collection": config.collection,
            "report": report,
        });
        return writeln!(out, "{payload}");
    }
    writeln!(out, "Successfully loaded data from {}", json_file.display())?;
    writeln!(out, "Database: {}", config.database)?;
    writeln!(out, "Collection: {}", config.collection)?;
    writeln!(
        out,
        "Inserted: {} documents in {} batches",
        report.inserted, report.batches
    )?;
    writeln!(out, "Skipped: {} undecodable lines", report.decode_errors)?;
    Ok(())
}

fn run_query(
    config: &StoreConfig,
    port: u16,
    data_dir: Option<&Path>,
    json_output: bool,
) -> Result<(), CliError> {
    let data_dir = config.resolve_data_dir(data_dir)?;
    let path = config.store_path(&data_dir, port);
    if !path.exists() {
        return Err(CliError::new(
            3,
            "store-missing",
            format!("no store found for port {port} at {}", path.display()),
        )
        .with_hint(format!("run `reviewdb load <json_file> {port}` first")));
    }
    let store = SqliteStore::open(&path)?;
    info!(store = %path.display(), "Query session started");

    let format = if json_output {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    QuerySession::new(&store, &config.collection, stdin.lock(), stdout.lock(), format).run()?;
    Ok(())
}
