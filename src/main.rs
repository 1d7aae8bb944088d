//! `opseq` - step-sequenced operation orchestration engine.
//!
//! See `README.md` for user documentation and `DESIGN.md` for architecture.

use anyhow::Result;
use clap::Parser;

use opseq::cli::{Cli, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Command::Schema => {
            let schema = opseq::scenario::generate_schema();
            println!("{}", schema);
            0
        }
        Command::Steps(args) => {
            for step in opseq::sequence::steps_for(args.op) {
                println!("{}", step);
            }
            0
        }
        Command::Run(args) => opseq::engine::run(args)?,
    };
    std::process::exit(exit_code);
}
