//! PyLearn server binary
//!
//! `serve` hosts the run and lesson endpoints; `run` executes one Python file
//! through an editing session, with the local interpreter as fallback.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use pylearn_core::executors::PythonEngineLoader;
use pylearn_core::{
    prepare_interpreter, ConfigLoader, ExecutionRequest, ExecutionSession, LocalInterpreter, PylearnConfig,
    RemoteExecutionGateway, RunOutcome, RunnerMode,
};
use pylearn_server::{shutdown_signal, PylearnServer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "PyLearn server - run learner Python remotely or locally")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, global = true, default_value = "pylearn.yaml", help = "Configuration file; defaults apply when it does not exist")]
    config: PathBuf,

    #[clap(long, short, global = true, help = "Log level (overrides logging.level from the configuration)")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Serve {
        #[clap(long)]
        bind_addr: Option<String>,
    },
    /// Run one Python file and print its output
    Run {
        file: PathBuf,

        #[clap(long, help = "File whose contents are passed as standard input")]
        stdin_file: Option<PathBuf>,

        #[clap(long, help = "Use the local interpreter only")]
        local: bool,

        #[clap(long, help = "Do not fall back to the local interpreter")]
        no_fallback: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config).await?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();
    log::debug!("Configuration resolved from {}", cli.config.display());

    match cli.command {
        Some(Commands::Run { file, stdin_file, local, no_fallback }) => {
            let succeeded = run_file(config, file, stdin_file, local, no_fallback).await?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Serve { bind_addr }) => run_server(config, bind_addr).await,
        None => run_server(config, None).await,
    }
}

async fn run_server(mut config: PylearnConfig, bind_addr: Option<String>) -> Result<()> {
    if let Some(bind_addr) = bind_addr {
        config.server.bind_addr = bind_addr;
    }

    let server = PylearnServer::from_config(&config)?;
    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn run_file(
    mut config: PylearnConfig,
    file: PathBuf,
    stdin_file: Option<PathBuf>,
    local: bool,
    no_fallback: bool,
) -> Result<bool> {
    if local {
        config.fallback.mode = RunnerMode::Local;
    }
    if no_fallback {
        config.fallback.enabled = false;
    }

    let source = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let stdin = match &stdin_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let gateway = Arc::new(RemoteExecutionGateway::from_config(&config.execution));
    let mut loader = PythonEngineLoader::new();
    if let Some(interpreter) = &config.fallback.interpreter {
        loader = loader.with_interpreter(interpreter.clone());
    }
    let interpreter = Arc::new(LocalInterpreter::new(Arc::new(loader)));

    if let Err(failure) = prepare_interpreter(&config, &interpreter).await {
        eprintln!("{}", RunOutcome::Failed(failure).display_text());
        return Ok(false);
    }

    let session = ExecutionSession::from_config(&config, gateway, interpreter);
    log::debug!("Strategies: {:?}", session.strategy_names());

    let request = ExecutionRequest::new(source)
        .with_stdin(stdin)
        .with_language(config.execution.language.clone(), config.execution.version.clone());
    let outcome = session.run(request).await;

    match &outcome {
        RunOutcome::Succeeded(result) => {
            print!("{}", outcome.display_text());
            if result.exit_code != 0 {
                log::info!("Program exited with code {}", result.exit_code);
            }
        }
        RunOutcome::Failed(failure) => {
            eprintln!("{}", outcome.display_text());
            if let Some(detail) = failure.detail() {
                eprintln!("{}", detail);
            }
        }
        RunOutcome::Rejected => eprintln!("{}", outcome.display_text()),
    }

    Ok(outcome.is_success())
}
