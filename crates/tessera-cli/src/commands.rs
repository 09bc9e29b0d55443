//! Subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the host snapshot the compiler sees
    Info,

    /// Hash files on the worker pool
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<String>,
        /// Truncate digests to this many hex characters
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Resolve an optional dependency, installing it if needed
    Deps {
        /// Declared dependency name (e.g. "jest")
        name: String,
    },

    /// Print the toolchain version
    Version,

    /// Serve tasks over stdin/stdout (spawned by the worker pool)
    #[command(hide = true)]
    Worker,
}
