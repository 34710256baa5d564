/// Configuration module for Gale.
///
/// Settings come from the process environment, optionally seeded from a
/// `.env` file. Missing required values are fatal at startup. `PORT` and
/// `OPENAI_MODEL` are only required by the HTTP server.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── Environment variable names ───────────────────────────────────────

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_EMBEDDING_MODEL: &str = "OPENAI_EMBEDDING_MODEL";
pub const ENV_PINECONE_API_KEY: &str = "PINECONE_API_KEY";
pub const ENV_PINECONE_ENV: &str = "PINECONE_ENV";
// The deployed settings files spell these `PINECODE_*`.
pub const ENV_PINECONE_INDEX: &str = "PINECODE_INDEX";
pub const ENV_PINECONE_PROJECT: &str = "PINECODE_PROJECT";
pub const ENV_PINECONE_NAMESPACE: &str = "PINECONE_NAMESPACE";
pub const ENV_PORT: &str = "PORT";
pub const ENV_STATIC_DIR: &str = "GALE_STATIC_DIR";
pub const ENV_TOKENIZER_PATH: &str = "GALE_TOKENIZER_PATH";
pub const ENV_REQUEST_TIMEOUT: &str = "GALE_REQUEST_TIMEOUT_SECS";

// ── Default value functions ──────────────────────────────────────────

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_retriever_k() -> usize {
    3
}

fn default_memory_max_tokens() -> usize {
    2048
}

fn default_max_tokens() -> usize {
    2048
}

fn default_min_length() -> usize {
    512
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PineconeConfig {
    pub api_key: String,
    pub environment: String,
    pub index_name: String,
    pub project_name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Knobs of the question-answering pipeline.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Documents fetched per question.
    #[serde(default = "default_retriever_k")]
    pub retriever_k: usize,

    /// Token budget of the conversation memory.
    #[serde(default = "default_memory_max_tokens")]
    pub memory_max_tokens: usize,

    /// Hard cap on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Minimum generated length forwarded to the model call.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retriever_k: default_retriever_k(),
            memory_max_tokens: default_memory_max_tokens(),
            max_tokens: default_max_tokens(),
            min_length: default_min_length(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load a settings file into the process environment.
    ///
    /// Variables already set in the environment are left untouched.
    pub fn load_env_file(path: &Path) -> Result<()> {
        dotenv::from_path(path)
            .with_context(|| format!("failed to load settings file: {}", path.display()))
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Fails if a required variable is absent or a numeric value does not parse.
    /// Server-only settings are checked by [`Config::server_port`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("missing required environment variable {key}"))
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match optional(ENV_PORT) {
            Some(v) => Some(
                v.parse::<u16>()
                    .with_context(|| format!("{ENV_PORT} must be a valid port number"))?,
            ),
            None => None,
        };

        let request_timeout_secs = match optional(ENV_REQUEST_TIMEOUT) {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("{ENV_REQUEST_TIMEOUT} must be a number of seconds"))?,
            None => default_request_timeout_secs(),
        };

        let cfg = Self {
            openai: OpenAiConfig {
                api_key: required(ENV_OPENAI_API_KEY)?,
                model: optional(ENV_OPENAI_MODEL).unwrap_or_default(),
                base_url: optional(ENV_OPENAI_BASE_URL).unwrap_or_else(default_openai_base_url),
                embedding_model: optional(ENV_OPENAI_EMBEDDING_MODEL)
                    .unwrap_or_else(default_embedding_model),
            },
            pinecone: PineconeConfig {
                api_key: required(ENV_PINECONE_API_KEY)?,
                environment: required(ENV_PINECONE_ENV)?,
                index_name: required(ENV_PINECONE_INDEX)?,
                project_name: required(ENV_PINECONE_PROJECT)?,
                namespace: optional(ENV_PINECONE_NAMESPACE).unwrap_or_default(),
            },
            pipeline: PipelineConfig::default(),
            port,
            static_dir: optional(ENV_STATIC_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_static_dir),
            tokenizer_path: optional(ENV_TOKENIZER_PATH).map(PathBuf::from),
            request_timeout_secs,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.openai.api_key.is_empty(), "openai.api_key must be set");
        anyhow::ensure!(!self.pinecone.api_key.is_empty(), "pinecone.api_key must be set");
        anyhow::ensure!(
            !self.pinecone.environment.is_empty(),
            "pinecone.environment must be set"
        );
        anyhow::ensure!(
            !self.pinecone.index_name.is_empty(),
            "pinecone.index_name must be set"
        );
        anyhow::ensure!(
            !self.pinecone.project_name.is_empty(),
            "pinecone.project_name must be set"
        );
        anyhow::ensure!(
            self.pipeline.retriever_k > 0,
            "pipeline.retriever_k must be positive"
        );
        anyhow::ensure!(
            self.pipeline.memory_max_tokens > 0,
            "pipeline.memory_max_tokens must be positive"
        );
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        Ok(())
    }

    /// Check the settings only the HTTP server needs and return its port.
    pub fn server_port(&self) -> Result<u16> {
        anyhow::ensure!(
            !self.openai.model.is_empty(),
            "missing required environment variable {ENV_OPENAI_MODEL}"
        );
        let port = self
            .port
            .with_context(|| format!("missing required environment variable {ENV_PORT}"))?;
        anyhow::ensure!(port > 0, "port must be positive");
        Ok(port)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
