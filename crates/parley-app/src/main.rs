//! Parley binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Build the session manager (extractor, classifier, resolver)
//! 3. Optionally import a context snapshot
//! 4. Resolve utterances from the command line or stdin, printing each
//!    `ResolvedCommand` as a line of JSON
//! 5. Optionally export the context snapshot on exit
//!
//! Lines starting with `:` on stdin are session commands: `:summary`,
//! `:clear`, `:export`, `:quit`.

mod cli;

use clap::Parser;
use parley_core::ParleyConfig;
use parley_dialog::SessionManager;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    if args.init_config {
        ParleyConfig::default().save(&config_file)?;
        println!("{}", config_file.display());
        return Ok(());
    }

    let config = ParleyConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over --log-level, which wins over the config file.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let manager = SessionManager::new(&config);
    let session = manager.create_session()?;

    if let Some(path) = &args.snapshot {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let applied = manager.import(session, &json).await?;
                tracing::info!(path = %path.display(), applied, "Snapshot loaded");
            }
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "No snapshot to load");
            }
        }
    }

    if args.utterances.is_empty() {
        run_stdin(&manager, session).await?;
    } else {
        for text in &args.utterances {
            resolve_and_print(&manager, session, text).await?;
        }
    }

    if let Some(path) = &args.snapshot {
        let json = manager.export(session).await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Snapshot saved");
    }

    manager.end_session(session)?;
    Ok(())
}

async fn run_stdin(
    manager: &SessionManager,
    session: Uuid,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" | ":q" => break,
            ":summary" => {
                let summary = manager.summary(session).await?;
                println!("{}", serde_json::to_string(&summary)?);
            }
            ":clear" => {
                manager.clear_context(session).await?;
                tracing::info!(session_id = %session, "Context cleared");
            }
            ":export" => println!("{}", manager.export(session).await?),
            _ => resolve_and_print(manager, session, &line).await?,
        }
    }
    Ok(())
}

async fn resolve_and_print(
    manager: &SessionManager,
    session: Uuid,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let command = manager.resolve(session, text).await?;
    println!("{}", serde_json::to_string(&command)?);
    Ok(())
}
