//! `CompilerSystem` adapters.
//!
//! Exactly one is chosen at start-up and shared as `Arc<dyn CompilerSystem>`.

mod details;
mod memory;
mod process;
mod sandboxed;

pub use details::{RUNTIME_NAME, host_details};
pub use memory::InMemorySystem;
pub use process::{ProcessHost, ProcessSystem};
pub use sandboxed::{SandboxPolicy, SandboxPolicyError, SandboxedSystem};
