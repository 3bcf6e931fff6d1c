//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "slugline",
    about = "Screenplay breakdown pipeline: chunk, analyze, embed and index scripts"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the chunking and analysis stage workers until interrupted.
    Worker(WorkerArgs),
    /// Submit a script file for processing.
    Submit(SubmitArgs),
    /// Show a job's status along with its scene breakdown.
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
pub struct WorkerArgs {
    /// Override the consumer identity; defaults to `{prefix}-{pid}`.
    #[arg(long)]
    pub consumer_id: Option<String>,
}

#[derive(Debug, Parser)]
pub struct SubmitArgs {
    /// Path to the script text to submit.
    pub path: PathBuf,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    pub job_id: String,
}
