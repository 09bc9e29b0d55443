//! CLI bootstrap, the composition root.
//!
//! The only place a concrete `CompilerSystem` is chosen. Everything
//! downstream receives it through `CliContext`:
//! - process or sandboxed host (via tessera-runtime)
//! - worker pool, started on first use and torn down by `destroy`
//! - lazy dependency resolver over the host's `node_modules`

use std::sync::Arc;

use tessera_core::paths::normalize_path;
use tessera_core::{
    CompilerSystem, CoreError, LazyModuleResolver, Settings, WorkerController, WorkerPoolConfig,
    validate_settings,
};
use tessera_runtime::{
    NodeModulesLocator, NpmInstaller, ProcessHost, ProcessSystem, ProcessWorkerLauncher,
    SandboxPolicy, SandboxedSystem,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::CliError;
use crate::parser::Cli;

/// Install the stderr subscriber.
///
/// Priority: `--verbose` > `RUST_LOG` > `warn`. Logs go to stderr so worker
/// children keep stdout for the task protocol.
pub fn init_tracing(verbose: bool, ci: bool) {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!ci)
                .compact(),
        )
        .try_init()
        .ok();
}

/// Resolved invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Run on a `SandboxedSystem` instead of the unrestricted host.
    pub sandbox: bool,
    pub settings: Settings,
}

impl CliConfig {
    /// Layer flags over the environment over defaults, then validate.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        Self::from_sources(cli, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(cli: &Cli, env: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flags = Settings {
            max_workers: cli.max_workers,
            ..Settings::default()
        };
        let settings = Settings::with_defaults()
            .merged_with(&Settings::from_env_with(env)?)
            .merged_with(&flags);
        validate_settings(&settings)?;

        Ok(Self {
            sandbox: cli.sandbox,
            settings,
        })
    }
}

/// Everything a command handler may need.
pub struct CliContext {
    /// The host, selected once.
    pub system: Arc<dyn CompilerSystem>,
    pub settings: Settings,
    workers: OnceCell<WorkerController>,
}

impl CliContext {
    pub fn new(system: Arc<dyn CompilerSystem>, settings: Settings) -> Self {
        Self {
            system,
            settings,
            workers: OnceCell::new(),
        }
    }

    /// The worker pool, started on first call.
    ///
    /// Workers re-run this executable with the hidden `worker` command. The
    /// pool registers its own shutdown on the system's destroy registry.
    pub async fn workers(&self) -> Result<&WorkerController, CliError> {
        self.workers
            .get_or_try_init(|| async {
                let launcher = worker_launcher(self.system.as_ref(), &self.settings)?;
                let config = WorkerPoolConfig::from_details(self.system.details(), &self.settings);

                let controller = WorkerController::start(Arc::new(launcher), config)
                    .await
                    .map_err(CoreError::from)?;
                controller.register_destroy(self.system.as_ref());
                Ok(controller)
            })
            .await
    }

    /// Resolver rooted at `lazy_dependencies_root`, or the working directory.
    pub fn resolver(&self) -> LazyModuleResolver {
        let root = self
            .settings
            .lazy_dependencies_root
            .clone()
            .unwrap_or_else(|| self.system.get_current_directory());
        let locator = NodeModulesLocator::new(Arc::clone(&self.system), &root);
        let installer = NpmInstaller::new(NodeModulesLocator::new(Arc::clone(&self.system), &root));
        LazyModuleResolver::new(Arc::new(locator), Arc::new(installer))
    }

    /// Run every destroy hook, then leave with `code` if it is non-zero.
    pub async fn finish(&self, code: i32) {
        let summary = self.system.destroy().await;
        debug!(
            invoked = summary.invoked,
            failed = summary.failed,
            "Destroy hooks drained"
        );
        if code != 0 {
            self.system.exit(code);
        }
    }
}

/// Launcher for `<executable> worker` children.
///
/// Prefers the executable the host reports and falls back to the running
/// binary when the host has none (sandboxed or in-memory hosts).
fn worker_launcher(
    system: &dyn CompilerSystem,
    settings: &Settings,
) -> Result<ProcessWorkerLauncher, CliError> {
    let launcher = match system.get_compiler_executing_path() {
        Some(path) => ProcessWorkerLauncher::new(path),
        None => ProcessWorkerLauncher::current_exe()
            .map_err(|e| CliError::Host(format!("Cannot locate executable: {e}")))?,
    };
    debug!(program = %launcher.program().display(), "Worker executable selected");
    Ok(launcher.with_worker_name(settings.effective_worker_name()))
}

/// Select the host and build the context.
pub fn bootstrap(config: CliConfig) -> Result<CliContext, CliError> {
    let host = ProcessHost::current()?;

    let system: Arc<dyn CompilerSystem> = if config.sandbox {
        let tmp = normalize_path(&std::env::temp_dir().to_string_lossy());
        let mut policy = SandboxPolicy::new()
            .allow_write(&host.cwd)?
            .allow_write(&tmp)?
            .allow_exit(true);
        if let Some(root) = &config.settings.lazy_dependencies_root {
            policy = policy.allow_write(root)?;
        }
        Arc::new(SandboxedSystem::new(host, policy))
    } else {
        Arc::new(ProcessSystem::new(host))
    };

    info!(
        runtime = %system.runtime(),
        cwd = %system.get_current_directory(),
        "System selected"
    );
    Ok(CliContext::new(system, config.settings))
}
