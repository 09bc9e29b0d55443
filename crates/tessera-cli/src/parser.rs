//! Root parser and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface of the tessera toolchain.
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Compiler host, worker pool and lazy dependency tooling")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Plain output for CI logs (no colors)
    #[arg(long, global = true, env = "CI")]
    pub ci: bool,

    /// Restrict filesystem access to the working and temp directories
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Upper bound on worker processes
    #[arg(long = "max-workers", global = true)]
    pub max_workers: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
