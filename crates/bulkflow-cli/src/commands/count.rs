use std::sync::Arc;

use bulkflow_engine::driver::SimulatedCluster;
use bulkflow_engine::orchestrator;
use bulkflow_engine::result::WorkflowKind;

use crate::commands::{report_outcome, resolve_settings, CommonFlags};

/// Execute the `count` verb.
pub async fn execute(flags: &CommonFlags, overrides: &[String]) -> u8 {
    let settings = match resolve_settings(flags, overrides, WorkflowKind::Count) {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let session = Arc::new(SimulatedCluster::new());
    let summary = orchestrator::run_count(&settings, session).await;
    if let Ok(summary) = &summary {
        println!("{}", summary.records);
    }
    report_outcome(summary)
}
