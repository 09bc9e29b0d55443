//! Info command handler.

use std::fmt::Write as _;

use tessera_core::{RuntimeKind, SystemDetails};

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Print the host snapshot in `key = value` form.
pub fn execute(ctx: &CliContext) -> Result<(), CliError> {
    print!("{}", render(ctx.system.runtime(), ctx.system.details()));
    Ok(())
}

fn render(runtime: RuntimeKind, details: &SystemDetails) -> String {
    let mut out = String::new();
    let rows: [(&str, String); 10] = [
        ("system", runtime.to_string()),
        ("runtime", format!("{} {}", details.runtime, details.runtime_version)),
        ("platform", details.platform.clone()),
        ("release", details.release.clone()),
        ("cpu_model", details.cpu_model.clone()),
        ("cpus", details.cpus.to_string()),
        ("total_memory", details.total_memory.to_string()),
        ("free_memory", details.free_memory().to_string()),
        ("tmp_dir", details.tmp_dir.clone()),
        ("pid", std::process::id().to_string()),
    ];
    for (key, value) in rows {
        let _ = writeln!(out, "{key} = {value}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_snapshot() {
        let details = SystemDetails::fixed(8, 16_000, 4_000);
        let text = render(RuntimeKind::InMemory, &details);

        assert!(text.starts_with("system = in-memory\n"));
        assert!(text.contains("cpus = 8\n"));
        assert!(text.contains("free_memory = 4000\n"));
        assert_eq!(text.lines().count(), 10);
    }
}
