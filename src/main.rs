#![allow(clippy::result_large_err)]

use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tracing::debug;

use crate::cli::Cli;
use crate::cli::Command;
use crate::config::Config;
use crate::config::ConfigError;
use crate::facit::Facit;
use crate::facit::ReconcileError;
use crate::outputter::OutPutter;
use crate::outputter::Summary;
use crate::parser::ParseError;
use crate::parser::parse_script;
use crate::runner::HttpError;
use crate::runner::HttpTransport;
use crate::runner::Runner;
use crate::runner::RunnerError;
use crate::variables::VariableStore;

mod asserter;
mod chain;
mod cli;
mod config;
mod facit;
mod jsonpath;
mod lexer;
mod model;
mod outputter;
mod parser;
mod runner;
mod template;
mod variables;

#[derive(Error, Debug, Diagnostic)]
pub enum FacitError {
    #[error("Failed to read script {}", path.display())]
    ScriptError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ParseError(#[from] ParseError),

    #[error("Failed to set up the HTTP client")]
    ClientError(#[source] HttpError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    RunnerError(#[from] RunnerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FacitIoError(#[from] ReconcileError),

    #[error("{failed} of {total} tests differ from the facit")]
    #[diagnostic(help("update the facit file if the new responses are correct"))]
    DiffError { failed: usize, total: usize },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Parses the script, runs its tests in order and reconciles the responses
/// with the facit file.
///
/// Variables from the config are seeded first, so `@` declarations in the
/// script take precedence over them.
///
/// # Errors
/// Anything that stops the run: an unreadable script or config, a parse
/// error in the script or facit, a request without an address, a transport
/// failure or a facit file that cannot be written.
async fn run_tests(
    script: &Path,
    facit: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<Summary, FacitError> {
    let config = Config::discover(config.as_deref(), script)?;

    let src = std::fs::read_to_string(script).map_err(|source| FacitError::ScriptError {
        path: script.to_owned(),
        source,
    })?;

    let mut store = VariableStore::new();
    config.seed(&mut store);

    let script_name = script.display().to_string();
    let mut tests = parse_script(&src, &script_name, &mut store)?;
    debug!(tests = tests.len(), variables = store.len(), "parsed script");

    OutPutter::start(&script_name, tests.len());

    let transport = HttpTransport::new(config.timeout()).map_err(FacitError::ClientError)?;
    let runner = Runner::new(transport).skip_headers(config.facit.skip_headers.iter().cloned());
    let responses = runner.run(&mut tests, &mut store).await?;

    let facit = Facit::new(facit.unwrap_or_else(|| config.facit_path(script)));
    debug!(path = %facit.path().display(), "reconciling with facit");
    let results = facit.reconcile(&responses, &mut store)?;

    Ok(OutPutter::print(&results))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Test {
            script,
            facit,
            config,
            strict,
        } => {
            let summary = run_tests(&script, facit, config).await?;

            if strict && summary.failed > 0 {
                return Err(FacitError::DiffError {
                    failed: summary.failed,
                    total: summary.passed + summary.failed + summary.recorded,
                }
                .into());
            }
        }
    }

    Ok(())
}
