use super::types::*;
use crate::config::{env_var_regex, expand_env_vars, expand_tilde};
use std::net::SocketAddr;
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
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;
    expand_paths(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let mut unexpanded: Vec<&str> = env_var_regex()
        .captures_iter(yaml)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();
    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         \n\
         Set them, or replace the $env{{...}} references in the config file with actual values",
        unexpanded.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    config.source.root = expand_tilde(&config.source.root);
    config.storage.data_dir = expand_tilde(&config.storage.data_dir);
    if let SinkConfig::File { path } = &mut config.sink {
        *path = expand_tilde(path);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.source.root.as_os_str().is_empty() {
        errors.push("source.root cannot be empty".to_string());
    }

    if config.harvest.name.trim().is_empty() {
        errors.push("harvest.name cannot be empty".to_string());
    }

    if config.harvest.concurrency == 0 {
        errors.push("harvest.concurrency must be at least 1".to_string());
    }

    if config.harvest.poll_interval.is_zero() {
        errors.push("harvest.poll_interval must be greater than zero".to_string());
    }

    if config.storage.data_dir.as_os_str().is_empty() {
        errors.push("storage.data_dir cannot be empty".to_string());
    }

    match &config.sink {
        SinkConfig::File { path } => {
            if path.as_os_str().is_empty() {
                errors.push("sink.path cannot be empty".to_string());
            }
        }
        SinkConfig::Syslog { host, port, .. } => {
            if host.trim().is_empty() {
                errors.push("sink.host cannot be empty".to_string());
            }
            if *port == 0 {
                errors.push("sink.port must be between 1 and 65535".to_string());
            }
        }
    }

    if let Some(web) = &config.web {
        if web.listen.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "web.listen '{}' is not a valid socket address",
                web.listen
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
