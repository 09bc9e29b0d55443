//! CLI error type and exit-code mapping.

use tessera_core::{CoreError, SettingsError};
use tessera_runtime::SandboxPolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Failure inside the toolchain core.
    #[error(transparent)]
    Core(CoreError),

    /// Invalid flag or argument value.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Invalid configuration from flags or environment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host process could not be set up.
    #[error("Host error: {0}")]
    Host(String),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// - 1: general failure
    /// - 2: misuse (bad arguments or configuration)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) | Self::Host(_) => 1,
            Self::Arguments(_) | Self::Config(_) => 2,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Arguments(msg),
            CoreError::Settings(settings_err) => Self::Config(settings_err.to_string()),
            other => Self::Core(other),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<SandboxPolicyError> for CliError {
    fn from(err: SandboxPolicyError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::Host(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{LazyError, WorkerError};

    #[test]
    fn test_exit_codes() {
        let core: CliError = CoreError::Worker(WorkerError::ControllerClosed).into();
        assert_eq!(core.exit_code(), 1);

        let lazy: CliError = CoreError::Lazy(LazyError::UndeclaredDependency {
            name: "left-pad".to_string(),
        })
        .into();
        assert_eq!(lazy.exit_code(), 1);
        assert!(lazy.to_string().contains("left-pad"));

        let validation: CliError = CoreError::Validation("--length must be positive".into()).into();
        assert!(matches!(validation, CliError::Arguments(_)));
        assert_eq!(validation.exit_code(), 2);

        let settings: CliError = SettingsError::InvalidValue {
            field: "max_workers",
            reason: "must be between 1 and 128".to_string(),
        }
        .into();
        assert_eq!(settings.exit_code(), 2);
    }
}
