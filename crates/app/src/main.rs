use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use keihi_storage::LearningStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod session;

use commands::Workspace;
use config::Config;

#[derive(Parser, Debug)]
#[command(name = "keihi", version, about = "Classify card statements into expense categories")]
struct Cli {
    /// Config file (default: <config dir>/keihi/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session file holding the transactions being reviewed
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a statement CSV and classify every transaction
    Import {
        csv: PathBuf,
    },

    /// Assign a category to one or more transactions
    SetCategory {
        code: String,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Memo to use instead of a generated one
        #[arg(long)]
        memo: Option<String>,
    },

    /// Replace a transaction's memo. Without one, reuse the memo last
    /// confirmed for the same merchant.
    SetMemo {
        id: String,
        memo: Option<String>,
    },

    /// Pick a fresh template memo for the current category
    RegenerateMemo {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Confirm transactions and learn from them
    Confirm {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
    },

    /// Write confirmed transactions as CSV
    Export {
        /// Output file (default: ./expense_YYYY-MM-DD.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize what has been learned
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show the learned history for a merchant
    History {
        merchant: String,
    },

    /// List the expense category codes
    Categories,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut out = std::io::stdout().lock();
    if let Command::Categories = cli.command {
        return commands::categories(&mut out);
    }

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let config = match &config_path {
        Some(path) => Config::load(path).with_context(|| format!("load {}", path.display()))?,
        None => Config::default(),
    };

    let data_dir = config::default_data_dir();
    let repo = config
        .open_repository(&data_dir)
        .await
        .context("open learning store")?;
    let ws = Workspace {
        store: LearningStore::open(repo)
            .await
            .with_curve(config.classifier.learned),
        ingestor: config.ingestor(),
        classifier: config.classifier(),
        session_path: cli
            .session
            .unwrap_or_else(|| data_dir.join("session.json")),
    };

    match cli.command {
        Command::Import { csv } => ws.import(&csv, &mut out).await,
        Command::SetCategory { code, ids, memo } => {
            ws.set_category(&code, &ids, memo.as_deref(), &mut out)
        }
        Command::SetMemo { id, memo } => ws.set_memo(&id, memo.as_deref(), &mut out).await,
        Command::RegenerateMemo { ids } => ws.regenerate_memo(&ids, &mut out),
        Command::Confirm { ids, all } => ws.confirm(&ids, all, &mut out).await,
        Command::Export { output } => ws.export(output, &mut out).map(|_| ()),
        Command::Stats { json } => ws.stats(json, &mut out).await,
        Command::History { merchant } => ws.history(&merchant, &mut out).await,
        Command::Categories => commands::categories(&mut out),
    }
}
