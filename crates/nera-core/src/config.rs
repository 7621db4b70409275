//! NERA Configuration Management
//!
//! Handles configuration from environment variables, TOML config files,
//! and command-line arguments with sensible defaults for local batch runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Batch pipeline configuration
    pub pipeline: PipelineConfig,

    /// Enrichment capabilities
    pub enrichment: EnrichmentConfig,

    /// Export defaults
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    ///
    /// Only variables that are present are applied, so values coming from
    /// a config file survive unless explicitly overridden.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", &port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&origins);
        }

        // Pipeline
        if let Some(exts) = lookup("NERA_EXTENSIONS") {
            self.pipeline.extensions = split_list(&exts);
        }
        if let Some(n) = lookup("NERA_CONCURRENCY") {
            let n: usize = parse_value("NERA_CONCURRENCY", &n)?;
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "NERA_CONCURRENCY".to_string(),
                    value: "0".to_string(),
                });
            }
            self.pipeline.concurrency = n;
        }
        if let Some(n) = lookup("NERA_MAX_ITEMS") {
            self.pipeline.max_items = Some(parse_value("NERA_MAX_ITEMS", &n)?);
        }
        if let Some(n) = lookup("NERA_MAX_BYTES") {
            self.pipeline.max_bytes = Some(parse_value("NERA_MAX_BYTES", &n)?);
        }

        // Enrichment
        if let Some(v) = lookup("NERA_DETECT_LANGUAGE") {
            self.enrichment.language = parse_bool("NERA_DETECT_LANGUAGE", &v)?;
        }
        if let Some(v) = lookup("NERA_SCORE_SENTIMENT") {
            self.enrichment.sentiment = parse_bool("NERA_SCORE_SENTIMENT", &v)?;
        }
        if let Some(v) = lookup("NERA_LINK_ENTITIES") {
            self.enrichment.linking = parse_bool("NERA_LINK_ENTITIES", &v)?;
        }
        if let Some(v) = lookup("NERA_ENRICH_TIMEOUT_SECS") {
            self.enrichment.timeout_secs = parse_value("NERA_ENRICH_TIMEOUT_SECS", &v)?;
        }
        if let Some(url) = lookup("NERA_KG_URL") {
            self.enrichment.knowledge_graph_url = url;
        }

        // Export
        if let Some(format) = lookup("NERA_EXPORT_FORMAT") {
            self.export.format = format.to_lowercase();
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = lookup("LOG_JSON") {
            self.logging.json_format = parse_bool("LOG_JSON", &v)?;
        }

        Ok(self)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Maximum number of texts accepted by the batch endpoint
    pub max_batch_texts: usize,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 10 * 1024 * 1024, // 10MB
            max_batch_texts: 1000,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Batch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File extensions accepted when walking a directory
    pub extensions: Vec<String>,

    /// Walk sub-directories
    pub recursive: bool,

    /// Maximum number of documents processed concurrently
    pub concurrency: usize,

    /// Truncate the input set after this many items
    pub max_items: Option<usize>,

    /// Truncate the input set once the cumulative size exceeds this
    pub max_bytes: Option<u64>,

    /// Drop entities below this confidence after merging
    pub min_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".txt".to_string()],
            recursive: true,
            concurrency: 4,
            max_items: None,
            max_bytes: None,
            min_confidence: 0.0,
        }
    }
}

/// Enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Detect document language
    pub language: bool,

    /// Score document sentiment
    pub sentiment: bool,

    /// Link entities against the knowledge graph (network)
    pub linking: bool,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Knowledge graph search endpoint
    pub knowledge_graph_url: String,

    /// Language used for knowledge graph lookups
    pub link_language: String,

    /// Maximum cached entity links
    pub cache_capacity: u64,

    /// Cached link time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            language: true,
            sentiment: true,
            linking: false,
            timeout_secs: 10,
            knowledge_graph_url: "https://www.wikidata.org/w/api.php".to_string(),
            link_language: "en".to_string(),
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Export defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output format name (csv, tsv, json, jsonl)
    pub format: String,

    /// Output file stem used when no explicit path is given
    pub output_stem: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            output_stem: "ner_results".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::NeraError {
    fn from(err: ConfigError) -> Self {
        crate::NeraError::Config(err.to_string())
    }
}
