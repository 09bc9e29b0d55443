//! Command handlers.
//!
//! Each handler is `pub async fn execute(ctx: &CliContext, ...)`: it turns
//! CLI input into calls on the core and formats the answer for the terminal.

pub mod deps;
pub mod hash;
pub mod info;
pub mod version;
