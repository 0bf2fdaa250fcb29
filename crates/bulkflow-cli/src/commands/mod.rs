//! Command implementations: resolve settings, run the workflow, map
//! the outcome to an exit code.

pub mod count;
pub mod load;
pub mod unload;

use std::path::PathBuf;

use bulkflow_engine::config::{parser, validator, Settings};
use bulkflow_engine::result::{format_elapsed, RunStatus, RunSummary, WorkflowKind};
use bulkflow_engine::PipelineError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_COMPLETED_WITH_ERRORS: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_ABORTED_BY_THRESHOLD: u8 = 3;

/// Flags shared by all verbs.
pub struct CommonFlags {
    pub config: Option<PathBuf>,
    pub execution_id: Option<String>,
    pub dry_run: bool,
    pub connector: Option<String>,
}

/// Resolve the configuration from file, flags, and dotted overrides,
/// then validate it for the workflow.
pub(crate) fn resolve_settings(
    flags: &CommonFlags,
    overrides: &[String],
    workflow: WorkflowKind,
) -> Result<Settings, u8> {
    let mut pairs = Vec::with_capacity(overrides.len() + 3);
    for arg in overrides {
        match parser::split_override(arg) {
            Ok(pair) => pairs.push(pair),
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Err(EXIT_CONFIG_ERROR);
            }
        }
    }
    if flags.dry_run {
        pairs.push(("engine.dryRun".to_string(), "true".to_string()));
    }
    if let Some(execution_id) = &flags.execution_id {
        pairs.push(("engine.executionId".to_string(), execution_id.clone()));
    }
    if let Some(connector) = &flags.connector {
        pairs.push(("connector.name".to_string(), connector.clone()));
    }

    let settings = match parser::load_settings(flags.config.as_deref(), &pairs) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return Err(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(e) = validator::validate(&settings, workflow) {
        eprintln!("Configuration error: {e:#}");
        return Err(EXIT_CONFIG_ERROR);
    }
    Ok(settings)
}

/// Print the one-line run summary and map the outcome to an exit code.
pub(crate) fn report_outcome(result: Result<RunSummary, PipelineError>) -> u8 {
    match result {
        Ok(summary) => {
            let elapsed = format_elapsed(summary.elapsed);
            let code = match summary.status() {
                RunStatus::Success => {
                    println!(
                        "Operation {} completed successfully in {elapsed}.",
                        summary.execution_id
                    );
                    EXIT_SUCCESS
                }
                RunStatus::CompletedWithErrors => {
                    println!(
                        "Operation {} completed with {} errors in {elapsed}.",
                        summary.execution_id, summary.errors
                    );
                    EXIT_COMPLETED_WITH_ERRORS
                }
            };
            println!(
                "Operation directory: {}",
                summary.operation_directory.display()
            );
            code
        }
        Err(e) => {
            eprintln!("Operation failed: {e}");
            if e.is_threshold_abort() {
                EXIT_ABORTED_BY_THRESHOLD
            } else {
                EXIT_COMPLETED_WITH_ERRORS
            }
        }
    }
}
