//! Version command handler.

use tessera_runtime::RUNTIME_NAME;

pub fn execute() {
    println!("{RUNTIME_NAME} {}", env!("CARGO_PKG_VERSION"));
}
