use super::types::*;
use crate::config::expand_env_vars;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a config from YAML text, expanding `$env{VAR}` first.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    // The push path is appended verbatim.
    while config.loki.url.ends_with('/') {
        config.loki.url.pop();
    }

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with the actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Check a config for problems, reporting all of them at once.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let url = config.loki.url.trim();
    if url.is_empty() {
        errors.push("loki.url must not be empty".to_string());
    } else if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(format!("loki.url '{}' must start with http:// or https://", url));
    }

    if config.loki.password.is_some() && config.loki.user.is_none() {
        errors.push("loki.password is set but loki.user is missing".to_string());
    }

    if config.loki.timeout.is_zero() {
        errors.push("loki.timeout must be greater than zero".to_string());
    }
    if config.loki.retry_interval.is_zero() {
        errors.push("loki.retry_interval must be greater than zero".to_string());
    }

    let pipeline = &config.pipeline;
    for (name, value) in [
        ("buffer_size", pipeline.buffer_size),
        ("batch_size", pipeline.batch_size),
        ("max_pending_syncs", pipeline.max_pending_syncs),
    ] {
        if value == 0 {
            errors.push(format!("pipeline.{} must be greater than zero", name));
        }
    }
    if pipeline.flush_interval.is_zero() {
        errors.push("pipeline.flush_interval must be greater than zero".to_string());
    }
    if pipeline.sync_timeout.is_zero() {
        errors.push("pipeline.sync_timeout must be greater than zero".to_string());
    }

    let fields = &config.fields;
    let field_keys = [&fields.time, &fields.level, &fields.logger];
    if field_keys.iter().any(|key| key.is_empty()) {
        errors.push("fields: time, level and logger keys must not be empty".to_string());
    }
    if fields.time == fields.level || fields.time == fields.logger || fields.level == fields.logger
    {
        errors.push("fields: time, level and logger keys must be distinct".to_string());
    }

    let label_name = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    let mut seen = HashSet::new();
    for label in &config.labels {
        if !label_name.is_match(&label.name) {
            errors.push(format!("label '{}' is not a valid Loki label name", label.name));
        }
        if label.name == "level" || label.name == "logger" {
            errors.push(format!(
                "label '{}' is reserved for the stream level/logger",
                label.name
            ));
        }
        if field_keys.iter().any(|key| **key == label.name) {
            errors.push(format!(
                "label '{}' collides with a record field key",
                label.name
            ));
        }
        if !seen.insert(label.name.as_str()) {
            errors.push(format!("label '{}' is defined more than once", label.name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
