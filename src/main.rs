//! `truth-agent` command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use truth_agent::{Config, VerifierAgent, VoteCheck, VoteMessage};

#[derive(Parser)]
#[command(name = "truth-agent")]
#[command(about = "Verify statements and contract-outcome votes against web evidence", long_about = None)]
#[command(version)]
struct Cli {
    /// Abort a run after this many seconds and report an Unknown result
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a single statement
    Statement {
        /// The statement to verify
        text: String,
    },

    /// Check the outcome code submitted in one or more vote messages
    Vote {
        /// File holding the contract description
        #[arg(long)]
        contract: PathBuf,

        /// JSON file holding a vote message or a list of them
        #[arg(long)]
        message: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VoteMessages {
    Many(Vec<VoteMessage>),
    One(VoteMessage),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut agent = VerifierAgent::from_config(&config)?;
    let deadline = cli.timeout_secs.map(Duration::from_secs);

    match cli.command {
        Commands::Statement { text } => {
            let verdict = match deadline {
                Some(d) => agent.verify_statement_within(&text, d).await,
                None => agent.verify_statement(&text).await,
            };
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Vote { contract, message } => {
            let contract = std::fs::read_to_string(&contract)
                .with_context(|| format!("Failed to read {}", contract.display()))?;
            let messages = read_messages(&message)?;

            let mut checks: Vec<VoteCheck> = Vec::with_capacity(messages.len());
            for message in &messages {
                let check = match deadline {
                    Some(d) => agent.verify_vote_within(&contract, message, d).await,
                    None => agent.verify_vote(&contract, message).await,
                };
                checks.push(check);
            }
            println!("{}", serde_json::to_string_pretty(&checks)?);
        }
    }

    Ok(())
}

fn read_messages(path: &Path) -> Result<Vec<VoteMessage>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: VoteMessages = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid vote message JSON in {}", path.display()))?;

    Ok(match parsed {
        VoteMessages::Many(messages) => messages,
        VoteMessages::One(message) => vec![message],
    })
}
