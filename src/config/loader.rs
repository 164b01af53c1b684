//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Algorithm, BackendConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `ALGORITHM`, `LISTEN_ADDR` and `BACKENDS` overrides from the process
/// environment.
pub fn apply_env_overrides(config: &mut ProxyConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable lookup.
///
/// `BACKENDS` is a comma separated list of `address[=weight]` entries.
pub fn apply_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(alg) = lookup("ALGORITHM") {
        config.algorithm = Algorithm::parse_lenient(&alg);
    }

    if let Some(addr) = lookup("LISTEN_ADDR") {
        config.listener.bind_address = addr;
    }

    if let Some(list) = lookup("BACKENDS") {
        config.backends = parse_backend_list(&list)?;
    }

    Ok(())
}

fn parse_backend_list(list: &str) -> Result<Vec<BackendConfig>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.rsplit_once('=') {
            Some((address, weight)) => {
                let weight = weight.trim().parse::<u32>().map_err(|e| ConfigError::Env {
                    name: "BACKENDS",
                    reason: format!("bad weight in '{}': {}", entry, e),
                })?;
                Ok(BackendConfig::new(address.trim(), weight))
            }
            None => Ok(BackendConfig::new(entry, 1)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overrides_algorithm_and_backends() {
        let mut config = ProxyConfig::default();
        apply_overrides(
            &mut config,
            env(&[
                ("ALGORITHM", "least_connections"),
                ("BACKENDS", "http://a:1=4, http://b:2"),
            ]),
        )
        .unwrap();

        assert_eq!(config.algorithm, Algorithm::LeastConnections);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].address, "http://a:1");
        assert_eq!(config.backends[0].weight, 4);
        assert_eq!(config.backends[1].weight, 1);
    }

    #[test]
    fn unknown_algorithm_falls_back_to_round_robin() {
        let mut config = ProxyConfig::default();
        config.algorithm = Algorithm::LeastConnections;
        apply_overrides(&mut config, env(&[("ALGORITHM", "fastest")])).unwrap();
        assert_eq!(config.algorithm, Algorithm::RoundRobin);
    }

    #[test]
    fn bad_weight_is_rejected() {
        let mut config = ProxyConfig::default();
        let err = apply_overrides(&mut config, env(&[("BACKENDS", "http://a:1=heavy")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "BACKENDS", .. }));
    }

    #[test]
    fn load_config_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[backends]]\naddress = \"http://a:1\"\nweight = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
