//! Deps command handler.

use tessera_core::CoreError;
use tracing::debug;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Resolve `name`, acquiring it when missing or out of range.
pub async fn execute(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    let resolver = ctx.resolver();
    if resolver.declared(name).is_none() {
        return Err(CliError::Arguments(format!(
            "{name} is not a lazy dependency (known: {})",
            resolver.dependency_names().join(", ")
        )));
    }

    let module = resolver.resolve(name).await.map_err(CoreError::from)?;
    debug!(name, acquired = module.acquired, "Dependency resolved");

    let note = if module.acquired { " (installed)" } else { "" };
    println!("{}@{} {}{note}", module.name, module.version, module.path);
    Ok(())
}
