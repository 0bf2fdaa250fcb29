//! Configuration loading: YAML file, environment substitution, and
//! `dotted.key=value` command-line overrides.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_yaml::Value;

use crate::config::types::Settings;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", errors.join(", "));
    }

    Ok(result)
}

/// Apply one `dotted.key=value` override to the YAML tree, creating
/// intermediate mappings as needed. The value is parsed as a YAML
/// scalar so numbers and booleans keep their types.
pub fn apply_override(tree: &mut Value, dotted_key: &str, raw_value: &str) -> Result<()> {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        anyhow::bail!("Invalid override key '{dotted_key}'");
    }

    let mut node = tree;
    for segment in &segments[..segments.len() - 1] {
        if !node.is_mapping() {
            *node = Value::Mapping(serde_yaml::Mapping::new());
        }
        let mapping = node.as_mapping_mut().expect("mapping just ensured");
        let key = Value::String((*segment).to_string());
        node = mapping
            .entry(key)
            .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
    }

    let leaf: Value = serde_yaml::from_str(raw_value)
        .unwrap_or_else(|_| Value::String(raw_value.to_string()));
    if !node.is_mapping() {
        *node = Value::Mapping(serde_yaml::Mapping::new());
    }
    let mapping = node.as_mapping_mut().expect("mapping just ensured");
    mapping.insert(
        Value::String(segments[segments.len() - 1].to_string()),
        leaf,
    );
    Ok(())
}

/// Parse settings from a YAML string plus overrides.
///
/// # Errors
///
/// Returns an error if env var substitution fails, the YAML is invalid,
/// or an override key is malformed.
pub fn parse_settings_str(yaml_str: &str, overrides: &[(String, String)]) -> Result<Settings> {
    let substituted = substitute_env_vars(yaml_str)?;
    let mut tree: Value = if substituted.trim().is_empty() {
        Value::Mapping(serde_yaml::Mapping::new())
    } else {
        serde_yaml::from_str(&substituted).context("Failed to parse configuration YAML")?
    };
    if tree.is_null() {
        tree = Value::Mapping(serde_yaml::Mapping::new());
    }
    for (key, value) in overrides {
        apply_override(&mut tree, key, value)?;
    }
    let settings: Settings =
        serde_yaml::from_value(tree).context("Failed to interpret configuration")?;
    Ok(settings)
}

/// Load settings from an optional file plus overrides; no file means
/// defaults with overrides applied.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_settings(path: Option<&Path>, overrides: &[(String, String)]) -> Result<Settings> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?,
        None => String::new(),
    };
    parse_settings_str(&content, overrides)
}

/// Split a `dotted.key=value` argument into its parts.
///
/// # Errors
///
/// Returns an error when the argument has no `=`.
pub fn split_override(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => anyhow::bail!("Invalid override '{arg}': expected dotted.key=value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BF_TEST_DIR", "/tmp/out");
        let input = "log:\n  directory: ${BF_TEST_DIR}\n";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("/tmp/out"));
        assert!(!result.contains("${BF_TEST_DIR}"));
        std::env::remove_var("BF_TEST_DIR");
    }

    #[test]
    fn test_missing_env_var_errors() {
        let input = "url: ${BF_DEFINITELY_NOT_SET_12345}";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("BF_DEFINITELY_NOT_SET_12345"));
    }

    #[test]
    fn empty_input_yields_defaults() {
        let settings = parse_settings_str("", &[]).unwrap();
        assert_eq!(settings.log.max_errors, "100");
    }

    #[test]
    fn overrides_reach_nested_keys() {
        let overrides = vec![
            ("engine.dryRun".to_string(), "true".to_string()),
            ("log.maxErrors".to_string(), "0".to_string()),
            ("batch.maxBatchStatements".to_string(), "4".to_string()),
        ];
        let settings = parse_settings_str("", &overrides).unwrap();
        assert!(settings.engine.dry_run);
        assert_eq!(settings.log.max_errors, "0");
        assert_eq!(settings.batch.max_batch_statements, 4);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let yaml = "log:\n  verbosity: 0\n";
        let overrides = vec![("log.verbosity".to_string(), "2".to_string())];
        let settings = parse_settings_str(yaml, &overrides).unwrap();
        assert_eq!(settings.log.verbosity, 2);
    }

    #[test]
    fn percentage_thresholds_stay_strings() {
        let overrides = vec![("log.maxErrors".to_string(), "1%".to_string())];
        let settings = parse_settings_str("", &overrides).unwrap();
        assert_eq!(settings.log.max_errors, "1%");
    }

    #[test]
    fn invalid_yaml_errors() {
        let result = parse_settings_str("engine: [not: {valid", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn split_override_rejects_missing_equals() {
        assert!(split_override("engine.dryRun").is_err());
        let (k, v) = split_override("schema.keyspace=ks1").unwrap();
        assert_eq!((k.as_str(), v.as_str()), ("schema.keyspace", "ks1"));
    }
}
