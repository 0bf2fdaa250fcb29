//! Cross-field configuration checks, run before any workflow starts.

use crate::config::types::Settings;
use crate::connector;
use crate::result::WorkflowKind;
use anyhow::{bail, Result};
use bulkflow_types::ErrorThreshold;

/// Validate the resolved settings for the given workflow.
///
/// # Errors
///
/// Returns a configuration error describing the first violated rule.
pub fn validate(settings: &Settings, workflow: WorkflowKind) -> Result<()> {
    if let Err(e) = ErrorThreshold::parse(&settings.log.max_errors) {
        bail!("log.maxErrors: {e}");
    }
    if settings.log.verbosity > 3 {
        bail!(
            "log.verbosity must be between 0 and 3, got {}",
            settings.log.verbosity
        );
    }
    if settings.batch.max_batch_statements == 0 {
        bail!("batch.maxBatchStatements must be at least 1");
    }
    if settings.batch.max_batch_size_bytes == 0 {
        bail!("batch.maxBatchSizeBytes must be at least 1");
    }
    if !connector::is_supported(&settings.connector.name) {
        bail!("Unknown connector '{}'", settings.connector.name);
    }

    match workflow {
        WorkflowKind::Load => {
            if settings.schema.mapping.trim().is_empty() {
                bail!("schema.mapping is required for load");
            }
            if settings.schema.query.is_none()
                && (settings.schema.keyspace.is_none() || settings.schema.table.is_none())
            {
                bail!("schema.keyspace and schema.table are required when schema.query is not set");
            }
            if settings.connector.csv.url.trim().is_empty() {
                bail!("connector.csv.url is required for load");
            }
        }
        WorkflowKind::Unload => {
            if settings.schema.query.is_none() {
                if settings.schema.keyspace.is_none() || settings.schema.table.is_none() {
                    bail!(
                        "schema.keyspace and schema.table are required when schema.query is not set"
                    );
                }
                if settings.schema.mapping.trim().is_empty() {
                    bail!("schema.mapping is required to generate an unload query");
                }
            }
            if settings.connector.csv.url.trim().is_empty() {
                bail!("connector.csv.url is required for unload");
            }
        }
        WorkflowKind::Count => {
            if settings.schema.query.is_none()
                && (settings.schema.keyspace.is_none() || settings.schema.table.is_none())
            {
                bail!("schema.keyspace and schema.table are required when schema.query is not set");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loadable() -> Settings {
        let mut settings = Settings::default();
        settings.schema.keyspace = Some("ks1".into());
        settings.schema.table = Some("t1".into());
        settings.schema.mapping = "id,name".into();
        settings.connector.csv.url = "/tmp/in.csv".into();
        settings
    }

    #[test]
    fn valid_load_settings_pass() {
        validate(&loadable(), WorkflowKind::Load).unwrap();
    }

    #[test]
    fn bad_threshold_is_a_config_error() {
        let mut settings = loadable();
        settings.log.max_errors = "many".into();
        let err = validate(&settings, WorkflowKind::Load).unwrap_err();
        assert!(err.to_string().contains("log.maxErrors"));
    }

    #[test]
    fn load_requires_mapping() {
        let mut settings = loadable();
        settings.schema.mapping.clear();
        assert!(validate(&settings, WorkflowKind::Load).is_err());
    }

    #[test]
    fn count_needs_no_connector_url() {
        let mut settings = loadable();
        settings.connector.csv.url.clear();
        validate(&settings, WorkflowKind::Count).unwrap();
    }

    #[test]
    fn verbosity_is_bounded() {
        let mut settings = loadable();
        settings.log.verbosity = 4;
        assert!(validate(&settings, WorkflowKind::Load).is_err());
    }

    #[test]
    fn unknown_connector_is_rejected() {
        let mut settings = loadable();
        settings.connector.name = "parquet".into();
        assert!(validate(&settings, WorkflowKind::Load).is_err());
    }

    #[test]
    fn query_substitutes_for_keyspace_and_table() {
        let mut settings = loadable();
        settings.schema.keyspace = None;
        settings.schema.table = None;
        settings.schema.query = Some("INSERT INTO ks1.t1 (id) VALUES (?)".into());
        settings.schema.mapping = "id".into();
        validate(&settings, WorkflowKind::Load).unwrap();
    }
}
