//! Configuration models for sheetwise.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file; nothing below
//! is read from ambient process state except the API key env var.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Top-level configuration for sheetwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat-completions endpoint backing the oracles
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Model used by every oracle
    #[serde(default)]
    pub model: ModelSpec,

    /// Dataset ingestion and splitting
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Per-query settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Disambiguation glossary: categorical column → valid values
    #[serde(default)]
    pub glossary: BTreeMap<String, Vec<String>>,

    /// Chat transcript persistence
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

/// OpenAI-compatible chat-completions endpoint.
///
/// K_i: All endpoints must speak the chat completions API.
/// Default points at Gemini's OpenAI-compatible surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL (e.g., "http://localhost:11434/v1" for Ollama)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; supports ${ENV_VAR} expansion
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Custom headers to include in requests
    /// Values can contain ${ENV_VAR} for environment variable expansion
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Specification for the model behind the oracles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model ID as the endpoint expects it
    #[serde(default = "default_model_id")]
    pub id: String,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_model_id() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f64 {
    0.0
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Dataset ingestion and split configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Candidate names for the free-text comment column, first match wins
    #[serde(default = "default_comment_columns")]
    pub comment_columns: Vec<String>,

    /// Column identifying each row's subject
    #[serde(default = "default_identity_column")]
    pub identity_column: String,

    /// Lower-case every cell at ingestion (trim is always applied)
    #[serde(default)]
    pub lowercase_values: bool,

    /// Worksheet to read; first sheet when unset
    #[serde(default)]
    pub sheet: Option<String>,

    /// Rows embedded into an oracle's context before truncation
    #[serde(default = "default_max_prompt_rows")]
    pub max_prompt_rows: usize,
}

fn default_comment_columns() -> Vec<String> {
    vec!["Comments".to_string(), "RMG Comments".to_string()]
}

fn default_identity_column() -> String {
    "Employee Name".to_string()
}

fn default_max_prompt_rows() -> usize {
    5000
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            comment_columns: default_comment_columns(),
            identity_column: default_identity_column(),
            lowercase_values: false,
            sheet: None,
            max_prompt_rows: default_max_prompt_rows(),
        }
    }
}

/// Per-query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on a single oracle call, in seconds
    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,
}

fn default_query_timeout() -> u64 {
    300
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_query_timeout(),
        }
    }
}

/// Transcript configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Where the chat history is persisted
    #[serde(default = "default_transcript_path")]
    pub path: PathBuf,
}

fn default_transcript_path() -> PathBuf {
    PathBuf::from("chat_history.json")
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            path: default_transcript_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Resolve the endpoint API key from config or environment.
    ///
    /// B_i(api key available) → Result
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.endpoint.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.endpoint.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.endpoint.api_key_env.clone(),
        })
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.comment_columns.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "dataset.comment_columns must name at least one column".to_string(),
            ));
        }
        if self.dataset.identity_column.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "dataset.identity_column must not be empty".to_string(),
            ));
        }
        if self.endpoint.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "endpoint.max_retries must be at least 1".to_string(),
            ));
        }
        for (column, values) in &self.glossary {
            if values.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "glossary entry '{column}' has no values"
                )));
            }
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    static ENV_VAR: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").unwrap());

    let mut result = s.to_string();
    for cap in ENV_VAR.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

/// Expand environment variables in all headers.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or endpoint.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.endpoint.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.dataset.identity_column, "Employee Name");
        assert_eq!(
            config.dataset.comment_columns,
            vec!["Comments".to_string(), "RMG Comments".to_string()]
        );
        assert!(!config.dataset.lowercase_values);
        assert!(config.glossary.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_glossary_parses_as_column_to_values() {
        let config: Config = toml::from_str(
            r#"
[glossary]
"Department" = ["HR", "Finance"]
"Status" = ["Billable", "Bench"]
"#,
        )
        .unwrap();
        assert_eq!(config.glossary["Department"], vec!["HR", "Finance"]);
        assert_eq!(config.glossary.len(), 2);
    }

    #[test]
    fn test_validate_rejects_empty_glossary_entry() {
        let config: Config = toml::from_str("[glossary]\nDepartment = []\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config: Config = toml::from_str(
            r#"
[endpoint]
api_key = "literal-key"
api_key_env = "SHEETWISE_TEST_UNSET_VAR"
"#,
        )
        .unwrap();
        assert_eq!(config.resolve_api_key().unwrap(), "literal-key");
    }

    #[test]
    fn test_missing_api_key_names_env_var() {
        let config: Config = toml::from_str(
            "[endpoint]\napi_key_env = \"SHEETWISE_TEST_DEFINITELY_UNSET\"\n",
        )
        .unwrap();
        let err = config.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("SHEETWISE_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholder() {
        assert_eq!(
            expand_env_vars("Bearer ${SHEETWISE_TEST_NOT_SET}"),
            "Bearer ${SHEETWISE_TEST_NOT_SET}"
        );
    }
}
