use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::OperationType;

/// Step-sequenced operation orchestration engine.
#[derive(Parser)]
#[command(name = "opseq", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print JSON Schema for scenario manifests.
    Schema,
    /// Print the step sequence for an operation type.
    Steps(StepsArgs),
    /// Replay a scripted scenario through the engine.
    Run(RunArgs),
}

#[derive(Args)]
pub struct StepsArgs {
    /// Operation type to show the sequence for.
    #[arg(long, value_enum)]
    pub op: OperationType,
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to scenario JSON file.
    #[arg(long, required = true)]
    pub scenario: PathBuf,

    /// Emit every snapshot as a JSON line on stdout.
    #[arg(long)]
    pub json: bool,

    /// Request cooperative cancellation after N emitted snapshots.
    #[arg(long)]
    pub cancel_after: Option<u32>,
}
