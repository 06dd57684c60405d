use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use textsync::{diff_edits, SessionConfig};
use tracing::{info, warn};

mod simulate;

#[derive(Parser)]
#[command(name = "textsync")]
#[command(about = "Collaborative text sync engine - headless session tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted multi-replica editing session and check convergence
    Simulate {
        /// Script file (JSON)
        script: PathBuf,

        /// Session config file (JSON); defaults apply to missing fields
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the operations a buffer change compiles to
    Diff {
        /// Text before the edit
        old: String,

        /// Text after the edit
        new: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "textsync=debug,textsync_cli=debug"
    } else {
        "textsync=info,textsync_cli=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate { script, config } => simulate_command(script, config).await,
        Commands::Diff { old, new } => diff_command(&old, &new),
    }
}

async fn simulate_command(script_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => SessionConfig::load(&path)
            .await
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SessionConfig::default(),
    };

    let raw = tokio::fs::read_to_string(&script_path)
        .await
        .with_context(|| format!("Failed to read script {:?}", script_path))?;
    let script: simulate::Script = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid script {:?}", script_path))?;

    info!("Running simulation: {:?}", script_path);
    let report = simulate::run(&script, &config)?;

    for replica in &report.replicas {
        println!(
            "{:<12} v{:<4} conflicts={:<3} {:?}",
            replica.id, replica.snapshot.version, replica.conflicts, replica.snapshot.content
        );
    }
    println!("{} messages sequenced", report.messages);

    if report.converged() {
        println!("converged");
        Ok(())
    } else {
        warn!("Replicas diverged");
        println!("diverged");
        std::process::exit(1);
    }
}

fn diff_command(old: &str, new: &str) -> Result<()> {
    let edits = diff_edits(old, new);
    if edits.is_empty() {
        info!("No changes");
    }
    for edit in edits {
        println!("{}", serde_json::to_string(&edit)?);
    }
    Ok(())
}
