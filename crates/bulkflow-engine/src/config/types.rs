//! Typed configuration sections.
//!
//! Field names deserialize camelCase so the documented dotted keys
//! (`engine.dryRun`, `log.maxErrors`, `batch.maxBatchStatements`, …)
//! map 1:1 onto the YAML tree and the command-line overrides.

use crate::batcher::{BatchMode, DEFAULT_MAX_BATCH_SIZE_BYTES, DEFAULT_MAX_BATCH_STATEMENTS};
use bulkflow_types::ErrorThreshold;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default in-flight statement cap across all workers.
pub const DEFAULT_MAX_IN_FLIGHT: i64 = 1024;
/// Window size when batching is disabled.
pub const DEFAULT_WINDOW_SIZE: usize = 256;

/// Root of the resolved configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub log: LogConfig,
    pub executor: ExecutorConfig,
    pub batch: BatchConfig,
    pub schema: SchemaConfig,
    pub connector: ConnectorConfig,
    /// Opaque driver subtree, handed to the session factory untouched.
    pub driver: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Skip execution; validate mapping only.
    pub dry_run: bool,
    /// Operation directory name template. `{workflow}` and `{date}`
    /// substitute the workflow label and a UTC timestamp.
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Data error threshold: a count, `N%`, or -1 for unlimited.
    #[serde(deserialize_with = "string_or_integer")]
    pub max_errors: String,
    /// Cap on logged query warnings; -1 disables the cap.
    pub max_query_warnings: i64,
    /// Output root; the operation directory is created beneath it.
    pub directory: PathBuf,
    /// 0..3, controls statement/row detail in error logs.
    pub verbosity: u8,
}

/// `log.maxErrors` appears as a bare integer or a quoted `N%` string
/// depending on where it came from; normalize both to a string.
fn string_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Integer(i64),
        Text(String),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Integer(value) => value.to_string(),
        Raw::Text(value) => value,
    })
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_errors: "100".to_string(),
            max_query_warnings: 50,
            directory: PathBuf::from("./logs"),
            verbosity: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Global in-flight statement cap; <= 0 disables the bound.
    pub max_in_flight: i64,
    /// Requests-per-second cap; <= 0 disables the cap.
    pub max_per_second: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_per_second: -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    pub mode: BatchMode,
    /// Records per pipeline window; -1 derives it from the batch bounds.
    pub buffer_size: i64,
    pub max_batch_statements: usize,
    pub max_batch_size_bytes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: BatchMode::PartitionKey,
            buffer_size: -1,
            max_batch_statements: DEFAULT_MAX_BATCH_STATEMENTS,
            max_batch_size_bytes: DEFAULT_MAX_BATCH_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaConfig {
    pub keyspace: Option<String>,
    pub table: Option<String>,
    /// `field=column` pairs, or bare column names.
    pub mapping: String,
    /// User-supplied statement overriding the generated one.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorConfig {
    pub name: String,
    pub csv: CsvConnectorConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            name: "csv".to_string(),
            csv: CsvConnectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvConnectorConfig {
    /// File, directory, or `-` for standard input/output.
    pub url: String,
    pub delimiter: char,
    pub header: bool,
}

impl Default for CsvConnectorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            delimiter: ',',
            header: true,
        }
    }
}

impl Settings {
    /// Resolve the operation directory name for a workflow label,
    /// substituting `{workflow}` and `{date}` in the template.
    #[must_use]
    pub fn execution_id(&self, workflow: &str) -> String {
        let template = self
            .engine
            .execution_id
            .as_deref()
            .unwrap_or("{workflow}_{date}");
        template
            .replace("{workflow}", workflow)
            .replace("{date}", &Utc::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn max_errors_threshold(&self) -> anyhow::Result<ErrorThreshold> {
        Ok(ErrorThreshold::parse(&self.log.max_errors)?)
    }

    #[must_use]
    pub fn max_query_warnings_threshold(&self) -> ErrorThreshold {
        if self.log.max_query_warnings < 0 {
            ErrorThreshold::unlimited()
        } else {
            ErrorThreshold::absolute(self.log.max_query_warnings as u64)
        }
    }

    #[must_use]
    pub fn max_in_flight(&self) -> Option<usize> {
        (self.executor.max_in_flight > 0).then(|| self.executor.max_in_flight as usize)
    }

    #[must_use]
    pub fn max_per_second(&self) -> Option<u32> {
        (self.executor.max_per_second > 0).then(|| self.executor.max_per_second as u32)
    }

    #[must_use]
    pub fn batching_enabled(&self) -> bool {
        self.batch.mode != BatchMode::Disabled
    }

    /// Window size for the parallel-windowed regime: the batch buffer
    /// when batching, a small fixed buffer otherwise.
    #[must_use]
    pub fn window_size(&self) -> usize {
        if self.batching_enabled() {
            if self.batch.buffer_size > 0 {
                self.batch.buffer_size as usize
            } else {
                self.batch.max_batch_statements.saturating_mul(4).max(1)
            }
        } else {
            DEFAULT_WINDOW_SIZE
        }
    }

    /// Per-worker executor concurrency, sized so the global in-flight
    /// total approximates `executor.maxInFlight`.
    #[must_use]
    pub fn write_concurrency(&self, cores: usize) -> usize {
        match self.max_in_flight() {
            Some(max) => (max / cores.max(1)).max(32),
            None => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert!(!settings.engine.dry_run);
        assert_eq!(settings.log.max_errors, "100");
        assert_eq!(settings.log.max_query_warnings, 50);
        assert_eq!(settings.log.verbosity, 1);
        assert_eq!(settings.executor.max_in_flight, 1024);
        assert_eq!(settings.batch.max_batch_statements, 32);
        assert_eq!(settings.batch.max_batch_size_bytes, 65_536);
        assert_eq!(settings.connector.name, "csv");
    }

    #[test]
    fn execution_id_substitutes_workflow_and_date() {
        let settings = Settings::default();
        let id = settings.execution_id("LOAD");
        assert!(id.starts_with("LOAD_"));
        assert_eq!(id.len(), "LOAD_".len() + 15);
    }

    #[test]
    fn execution_id_honors_user_template() {
        let mut settings = Settings::default();
        settings.engine.execution_id = Some("nightly-{workflow}".to_string());
        assert_eq!(settings.execution_id("UNLOAD"), "nightly-UNLOAD");
    }

    #[test]
    fn window_size_follows_batch_bounds() {
        let mut settings = Settings::default();
        assert_eq!(settings.window_size(), 128);
        settings.batch.buffer_size = 500;
        assert_eq!(settings.window_size(), 500);
        settings.batch.mode = BatchMode::Disabled;
        assert_eq!(settings.window_size(), DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn write_concurrency_floors_at_32() {
        let settings = Settings::default();
        assert_eq!(settings.write_concurrency(64), 32);
        assert_eq!(settings.write_concurrency(8), 128);
    }

    #[test]
    fn negative_limits_disable_bounds() {
        let mut settings = Settings::default();
        settings.executor.max_in_flight = -1;
        assert_eq!(settings.max_in_flight(), None);
        assert_eq!(settings.max_per_second(), None);
    }

    #[test]
    fn camel_case_keys_deserialize() {
        let yaml = "engine:\n  dryRun: true\nlog:\n  maxErrors: \"2%\"\nbatch:\n  maxBatchStatements: 8\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.engine.dry_run);
        assert_eq!(settings.log.max_errors, "2%");
        assert_eq!(settings.batch.max_batch_statements, 8);
    }
}
