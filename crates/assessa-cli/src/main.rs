//! assessa CLI: run assessment sessions against a local data directory.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use assessa_core::AssessmentEngine;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "assessa", version, about = "Assessment session and scoring engine")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume a candidate session
    Start {
        /// Survey id
        #[arg(long)]
        survey: String,

        /// Candidate name
        #[arg(long)]
        name: String,

        /// Candidate email
        #[arg(long)]
        email: String,

        /// Attempt number (default: chosen automatically)
        #[arg(long)]
        attempt: Option<u32>,

        /// Return the latest unsubmitted session instead of starting a new attempt
        #[arg(long)]
        resume: bool,

        /// Client user agent to record
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Submit answers for a started session
    Submit {
        /// Response id returned by `start`
        #[arg(long)]
        response: String,

        /// Answers as JSON, or @path to a JSON file
        #[arg(long)]
        answers: String,

        /// Total seconds spent
        #[arg(long)]
        time_spent: Option<u64>,

        /// Per-question seconds as a JSON object keyed by position or question id
        #[arg(long)]
        durations: Option<String>,

        /// Mark as submitted by the timer
        #[arg(long)]
        auto_submit: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show statistics for a survey
    Stats {
        /// Survey id
        #[arg(long)]
        survey: String,

        /// Only this attempt number
        #[arg(long)]
        attempt: Option<u32>,

        /// Only submitted responses
        #[arg(long)]
        submitted_only: bool,

        /// Only this candidate
        #[arg(long)]
        email: Option<String>,

        /// Submitted at or after (RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Submitted before (RFC 3339)
        #[arg(long)]
        to: Option<String>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Dry-run a survey's question source
    Validate {
        /// Survey id
        #[arg(long)]
        survey: String,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config and a demo survey
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;

    match cli.command {
        Commands::Start {
            survey,
            name,
            email,
            attempt,
            resume,
            user_agent,
        } => {
            let engine = open_engine(config_path).await?;
            commands::start::execute(&engine, survey, name, email, attempt, resume, user_agent)
                .await
        }
        Commands::Submit {
            response,
            answers,
            time_spent,
            durations,
            auto_submit,
            format,
        } => {
            let engine = open_engine(config_path).await?;
            commands::submit::execute(
                &engine,
                response,
                answers,
                time_spent,
                durations,
                auto_submit,
                format,
            )
            .await
        }
        Commands::Stats {
            survey,
            attempt,
            submitted_only,
            email,
            from,
            to,
            format,
        } => {
            let engine = open_engine(config_path).await?;
            commands::stats::execute(
                &engine,
                survey,
                attempt,
                submitted_only,
                email,
                from,
                to,
                format,
            )
            .await
        }
        Commands::Validate { survey, format } => {
            let engine = open_engine(config_path).await?;
            commands::validate::execute(&engine, survey, format).await
        }
        Commands::Init => commands::init::execute(config_path).await,
    }
}

async fn open_engine(config_path: Option<PathBuf>) -> Result<AssessmentEngine> {
    let config = assessa_store::load_config_from(config_path.as_deref())?;
    init_tracing(&config.log_filter);
    let (engine, store) = config.open_engine().await?;
    tracing::debug!(
        data_dir = %store.root().display(),
        resubmission = ?engine.config().resubmission,
        "engine ready"
    );
    Ok(engine)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
