//! The `tessera` binary: flag parsing, configuration, host selection and
//! command dispatch.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

// Used by the binary target only
use dotenvy as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliConfig, CliContext, bootstrap, init_tracing};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
