use std::sync::Arc;

use bulkflow_engine::connector;
use bulkflow_engine::driver::SimulatedCluster;
use bulkflow_engine::orchestrator;
use bulkflow_engine::result::WorkflowKind;

use crate::commands::{report_outcome, resolve_settings, CommonFlags, EXIT_CONFIG_ERROR};

/// Execute the `unload` verb.
pub async fn execute(flags: &CommonFlags, overrides: &[String]) -> u8 {
    let settings = match resolve_settings(flags, overrides, WorkflowKind::Unload) {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let connector = match connector::create(&settings.connector) {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return EXIT_CONFIG_ERROR;
        }
    };
    let session = Arc::new(SimulatedCluster::new());
    report_outcome(orchestrator::run_unload(&settings, connector, session).await)
}
