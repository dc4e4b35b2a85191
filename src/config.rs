//! Runtime configuration.
//!
//! Credentials come from the environment. An optional JSON settings file
//! (`TRUTH_AGENT_SETTINGS`) can override the model, the search result count
//! and the price table; environment variables win over the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::budget::PriceTable;
use crate::verifier::{DEFAULT_MODEL, DEFAULT_SEARCH_RESULTS};

pub const MISTRAL_API_KEY: &str = "MISTRAL_API_KEY";
pub const BRAVE_API_KEY: &str = "BRAVE_API_KEY";
pub const MODEL_VAR: &str = "TRUTH_AGENT_MODEL";
pub const SEARCH_RESULTS_VAR: &str = "TRUTH_AGENT_SEARCH_RESULTS";
pub const SETTINGS_VAR: &str = "TRUTH_AGENT_SETTINGS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVar(&'static str),
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Optional overrides loaded from the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<usize>,
    /// Extra or replacement per-model prices, laid over the built-in table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices: Option<PriceTable>,
}

impl Settings {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mistral_api_key: String,
    pub brave_api_key: String,
    pub model: String,
    pub search_results: usize,
    pub prices: PriceTable,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mistral_api_key = var(MISTRAL_API_KEY).ok_or(ConfigError::MissingVar(MISTRAL_API_KEY))?;
        let brave_api_key = var(BRAVE_API_KEY).ok_or(ConfigError::MissingVar(BRAVE_API_KEY))?;

        let settings = match var(SETTINGS_VAR) {
            Some(path) => load_settings(Path::new(&path)),
            None => Settings::default(),
        };

        let model = var(MODEL_VAR)
            .or(settings.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let search_results = match var(SEARCH_RESULTS_VAR) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: SEARCH_RESULTS_VAR,
                        value,
                    })
                }
            },
            None => settings
                .search_results
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_SEARCH_RESULTS),
        };

        let mut prices = PriceTable::default();
        if let Some(overrides) = settings.prices {
            prices.merge(overrides);
        }

        Ok(Self {
            mistral_api_key,
            brave_api_key,
            model,
            search_results,
            prices,
        })
    }
}

/// A broken settings file is not fatal: log it and carry on with defaults.
fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        tracing::info!(
            "No settings file found at {}, using environment defaults",
            path.display()
        );
        return Settings::default();
    }

    match Settings::load_from_path(path) {
        Ok(settings) => {
            tracing::info!("Loaded settings from {}", path.display());
            settings
        }
        Err(e) => {
            tracing::warn!(
                "Failed to load settings from {}: {}, using defaults",
                path.display(),
                e
            );
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ModelPricing;
    use std::collections::HashMap;
    use std::io::Write;
    use tokio_test::assert_ok;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const KEYS: [(&str, &str); 2] = [(MISTRAL_API_KEY, "m-key"), (BRAVE_API_KEY, "b-key")];

    #[test]
    fn test_defaults() {
        let config = assert_ok!(Config::from_lookup(lookup(&KEYS)));
        assert_eq!(config.model, "mistral-small-latest");
        assert_eq!(config.search_results, 3);
        assert!(config.prices.get("mistral-large-latest").is_some());
    }

    #[test]
    fn test_missing_keys() {
        let err = Config::from_lookup(lookup(&[(MISTRAL_API_KEY, "m-key")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(BRAVE_API_KEY)));

        let err = Config::from_lookup(lookup(&[(MISTRAL_API_KEY, " "), (BRAVE_API_KEY, "b")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(MISTRAL_API_KEY)));
    }

    #[test]
    fn test_invalid_search_results() {
        let mut vars = KEYS.to_vec();
        vars.push((SEARCH_RESULTS_VAR, "zero"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains(SEARCH_RESULTS_VAR));
    }

    #[test]
    fn test_settings_file_and_env_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": "mistral-large-latest", "searchResults": 5,
                "prices": {{"open-mistral-nemo": {{"inputPerMillion": 0.15, "outputPerMillion": 0.15}},
                            "mistral-small-latest": {{"inputPerMillion": 0.1, "outputPerMillion": 0.3}}}}}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut vars = KEYS.to_vec();
        vars.push((SETTINGS_VAR, path.as_str()));
        let config = assert_ok!(Config::from_lookup(lookup(&vars)));
        assert_eq!(config.model, "mistral-large-latest");
        assert_eq!(config.search_results, 5);
        assert_eq!(
            config.prices.get("open-mistral-nemo"),
            Some(ModelPricing {
                input_per_million: 0.15,
                output_per_million: 0.15
            })
        );
        // Overrides replace built-in entries and leave the rest in place.
        assert_eq!(
            config.prices.get("mistral-small-latest"),
            Some(ModelPricing {
                input_per_million: 0.1,
                output_per_million: 0.3
            })
        );
        assert!(config.prices.get("mistral-large-latest").is_some());

        vars.push((MODEL_VAR, "mistral-small-2409"));
        vars.push((SEARCH_RESULTS_VAR, "2"));
        let config = assert_ok!(Config::from_lookup(lookup(&vars)));
        assert_eq!(config.model, "mistral-small-2409");
        assert_eq!(config.search_results, 2);
    }

    #[test]
    fn test_broken_settings_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "model = mistral").unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert!(Settings::load_from_path(file.path()).is_err());

        let mut vars = KEYS.to_vec();
        vars.push((SETTINGS_VAR, path.as_str()));
        let config = assert_ok!(Config::from_lookup(lookup(&vars)));
        assert_eq!(config.model, DEFAULT_MODEL);
    }
}
