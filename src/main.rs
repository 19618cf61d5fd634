use clap::Parser;

use reviewdb::{Cli, CliError};

fn report(err: &CliError, json: bool) {
    if json {
        eprintln!("{}", err.to_json());
    } else {
        eprintln!("Error: {}", err.message);
        if let Some(hint) = &err.hint {
            eprintln!("Hint: {hint}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    reviewdb::init_tracing();

    let json = cli.json;
    if let Err(err) = reviewdb::run(cli) {
        report(&err, json);
        std::process::exit(err.code);
    }
    Ok(())
}
