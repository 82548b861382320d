use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const ENDPOINT_ENV: &str = "AZURE_DI_ENDPOINT";
pub const KEY_ENV: &str = "AZURE_DI_KEY";
pub const MODEL_ENV: &str = "AZURE_DI_MODEL";
pub const API_VERSION_ENV: &str = "AZURE_DI_API_VERSION";
pub const TIMEOUT_ENV: &str = "AZURE_DI_TIMEOUT_SECS";
pub const SECRETS_PATH_ENV: &str = "DOCINTEL_SECRETS";

const DEFAULT_SECRETS_FILE: &str = "secrets.toml";
const DEFAULT_MODEL: &str = "prebuilt-layout";
const DEFAULT_API_VERSION: &str = "2024-11-30";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Contents of the optional secrets file (`[azure]` table).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    azure: AzureSecrets,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AzureSecrets {
    #[serde(rename = "AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT")]
    endpoint: Option<String>,
    #[serde(rename = "AZURE_DOCUMENT_INTELLIGENCE_KEY")]
    key: Option<String>,
}

impl Secrets {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read the secrets file if one exists. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = std::env::var(SECRETS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRETS_FILE));
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Secrets {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let secrets = Self::from_toml(&text).map_err(|e| ConfigError::Secrets {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded secrets file");
        Ok(Some(secrets))
    }
}

#[derive(Clone)]
pub struct Config {
    pub endpoint: String,
    pub key: String,
    pub model: String,
    pub api_version: String,
    /// Bounds each request and the total wait for a result.
    pub timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    /// Build a config from a secrets file (checked first) and an environment lookup.
    pub fn from_sources<F>(secrets: Option<&Secrets>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = non_blank(secrets.and_then(|s| s.azure.endpoint.clone()))
            .or_else(|| non_blank(env(ENDPOINT_ENV)));
        let key = non_blank(secrets.and_then(|s| s.azure.key.clone()))
            .or_else(|| non_blank(env(KEY_ENV)));

        let (endpoint, key) = match (endpoint, key) {
            (Some(endpoint), Some(key)) => (endpoint, key),
            (endpoint, key) => {
                let mut missing = Vec::new();
                if endpoint.is_none() {
                    missing.push(ENDPOINT_ENV);
                }
                if key.is_none() {
                    missing.push(KEY_ENV);
                }
                return Err(ConfigError::MissingCredentials { missing });
            }
        };

        let timeout_secs = match non_blank(env(TIMEOUT_ENV)) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        key: TIMEOUT_ENV,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: TIMEOUT_ENV,
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Config {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
            model: non_blank(env(MODEL_ENV)).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_version: non_blank(env(API_VERSION_ENV))
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// URL that starts an analysis job.
    pub fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}&features=keyValuePairs",
            self.endpoint, self.model, self.api_version
        )
    }
}

fn load_env() {
    let _ = dotenvy::dotenv();
}

/// Load configuration from the secrets file, `.env` and the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_env();
    let secrets = Secrets::load()?;
    Config::from_sources(secrets.as_ref(), |k| std::env::var(k).ok())
}

/// Names of the credentials that are still missing (empty when configured).
pub fn missing_credentials() -> Vec<&'static str> {
    match load_config() {
        Err(ConfigError::MissingCredentials { missing }) => missing,
        _ => Vec::new(),
    }
}

pub fn is_configured() -> bool {
    load_config().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn reads_credentials_from_environment() {
        let env = env_of(&[
            (ENDPOINT_ENV, "https://demo.cognitiveservices.azure.com/"),
            (KEY_ENV, "secret"),
        ]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.endpoint, "https://demo.cognitiveservices.azure.com");
        assert_eq!(config.key, "secret");
        assert_eq!(config.model, "prebuilt-layout");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn missing_key_names_the_variable() {
        let env = env_of(&[(ENDPOINT_ENV, "https://demo")]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                missing: vec![KEY_ENV]
            }
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let env = env_of(&[(ENDPOINT_ENV, "   "), (KEY_ENV, "")]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                missing: vec![ENDPOINT_ENV, KEY_ENV]
            }
        );
    }

    #[test]
    fn secrets_file_wins_over_environment() {
        let secrets = Secrets::from_toml(
            r#"
            [azure]
            AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT = "https://from-secrets"
            AZURE_DOCUMENT_INTELLIGENCE_KEY = "k1"
            "#,
        )
        .unwrap();
        let env = env_of(&[(ENDPOINT_ENV, "https://from-env"), (KEY_ENV, "k2")]);
        let config = Config::from_sources(Some(&secrets), env).unwrap();
        assert_eq!(config.endpoint, "https://from-secrets");
        assert_eq!(config.key, "k1");
    }

    #[test]
    fn partial_secrets_fall_back_to_environment() {
        let secrets = Secrets::from_toml(
            "[azure]\nAZURE_DOCUMENT_INTELLIGENCE_ENDPOINT = \"https://from-secrets\"\n",
        )
        .unwrap();
        let env = env_of(&[(KEY_ENV, "k2")]);
        let config = Config::from_sources(Some(&secrets), env).unwrap();
        assert_eq!(config.endpoint, "https://from-secrets");
        assert_eq!(config.key, "k2");
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let env = env_of(&[
            (ENDPOINT_ENV, "https://demo"),
            (KEY_ENV, "k"),
            (TIMEOUT_ENV, "soon"),
        ]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: TIMEOUT_ENV, .. }));
    }

    #[test]
    fn analyze_url_includes_model_and_version() {
        let env = env_of(&[
            (ENDPOINT_ENV, "https://demo/"),
            (KEY_ENV, "k"),
            (MODEL_ENV, "prebuilt-read"),
        ]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(
            config.analyze_url(),
            "https://demo/documentintelligence/documentModels/prebuilt-read:analyze?api-version=2024-11-30&features=keyValuePairs"
        );
    }

    #[test]
    fn debug_output_hides_the_key() {
        let env = env_of(&[(ENDPOINT_ENV, "https://demo"), (KEY_ENV, "very-secret")]);
        let config = Config::from_sources(None, env).unwrap();
        assert!(!format!("{config:?}").contains("very-secret"));
    }
}
