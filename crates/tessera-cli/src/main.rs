//! CLI entry point.
//!
//! `tessera worker` is dispatched before bootstrap: a worker child never
//! builds its own host or pool, it only serves tasks over stdio.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing::{debug, error};

use tessera_cli::{Cli, CliConfig, CliContext, CliError, Commands, bootstrap, handlers, init_tracing};
use tessera_runtime::{TaskHandlerRegistry, WORKER_ID_ENV, run_worker};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.ci);

    let Some(command) = cli.command.as_ref() else {
        return match Cli::command().print_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    };

    if matches!(command, Commands::Worker) {
        return serve_worker().await;
    }

    let ctx = match CliConfig::from_cli(&cli).and_then(bootstrap) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "uncaught cli error");
            eprintln!("{e}");
            return exit_code(&e);
        }
    };

    let code = match run(&ctx, command).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "uncaught cli error");
            eprintln!("{e}");
            e.exit_code()
        }
    };

    ctx.finish(code).await;
    ExitCode::SUCCESS
}

async fn run(ctx: &CliContext, command: &Commands) -> Result<(), CliError> {
    match command {
        Commands::Info => handlers::info::execute(ctx),
        Commands::Hash { files, length } => handlers::hash::execute(ctx, files, *length).await,
        Commands::Deps { name } => handlers::deps::execute(ctx, name).await,
        Commands::Version => {
            handlers::version::execute();
            Ok(())
        }
        Commands::Worker => Err(CliError::Arguments(
            "worker mode cannot run inside a session".to_string(),
        )),
    }
}

async fn serve_worker() -> ExitCode {
    let worker = std::env::var(WORKER_ID_ENV).unwrap_or_default();
    debug!(worker = %worker, "Worker starting");

    let registry = Arc::new(TaskHandlerRegistry::with_builtins());
    match run_worker(tokio::io::stdin(), tokio::io::stdout(), registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(worker = %worker, error = %e, "Worker loop failed");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(err: &CliError) -> ExitCode {
    u8::try_from(err.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}
