//! TOML configuration: listen address, chunking policy and the ordered list
//! of backends addressed by `/stream/{index}/...`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::BackendRegistry;
use crate::http::{HttpBackend, HttpConfig};
use crate::local::LocalBackend;
use crate::plan::{ChunkPolicy, DEFAULT_CHUNK_SIZE};
use crate::response::DEFAULT_CONTENT_TYPE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPolicyKind {
    Fixed,
    Adaptive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub content_type: String,
    pub chunk_policy: ChunkPolicyKind,
    pub chunk_size: u64,
    pub adaptive_min_exp: u32,
    pub adaptive_max_exp: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.into(),
            chunk_policy: ChunkPolicyKind::Fixed,
            chunk_size: DEFAULT_CHUNK_SIZE,
            adaptive_min_exp: 2,
            adaptive_max_exp: 10,
        }
    }
}

impl StreamConfig {
    pub fn policy(&self) -> ChunkPolicy {
        match self.chunk_policy {
            ChunkPolicyKind::Fixed => ChunkPolicy::Fixed(self.chunk_size),
            ChunkPolicyKind::Adaptive => ChunkPolicy::Adaptive {
                min_exp: self.adaptive_min_exp,
                max_exp: self.adaptive_max_exp,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Http(HttpBackendConfig),
    Local { root: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpBackendConfig {
    pub url: String,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_retry_max_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    30
}

impl HttpBackendConfig {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ..HttpConfig::default()
        }
    }
}

impl Config {
    /// Instantiate every configured backend, in configuration order.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        for (index, backend) in self.backends.iter().enumerate() {
            match backend {
                BackendConfig::Http(http) => {
                    let backend = HttpBackend::builder(&http.url)
                        .config(http.http_config())
                        .build()
                        .with_context(|| format!("Failed to create backend {index}"))?;
                    tracing::info!(index, url = %http.url, "Registered HTTP backend");
                    registry.push(Arc::new(backend));
                }
                BackendConfig::Local { root } => {
                    if !root.is_dir() {
                        tracing::warn!("Backend {} root does not exist: {:?}", index, root);
                    }
                    tracing::info!(index, root = %root.display(), "Registered local backend");
                    registry.push(Arc::new(LocalBackend::new(root.clone())));
                }
            }
        }
        Ok(registry)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Invalid TOML")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./chunkstream.toml", "/etc/chunkstream/config.toml"];

    for path_str in default_paths {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if axum::http::HeaderValue::from_str(&config.stream.content_type).is_err() {
        anyhow::bail!("Invalid content type: {:?}", config.stream.content_type);
    }

    match config.stream.chunk_policy {
        ChunkPolicyKind::Fixed if config.stream.chunk_size == 0 => {
            anyhow::bail!("Chunk size cannot be 0");
        }
        ChunkPolicyKind::Adaptive
            if config.stream.adaptive_min_exp > config.stream.adaptive_max_exp =>
        {
            anyhow::bail!(
                "adaptive_min_exp ({}) is larger than adaptive_max_exp ({})",
                config.stream.adaptive_min_exp,
                config.stream.adaptive_max_exp
            );
        }
        ChunkPolicyKind::Adaptive if config.stream.adaptive_max_exp > 30 => {
            anyhow::bail!("adaptive_max_exp cannot exceed 30");
        }
        _ => {}
    }

    for (index, backend) in config.backends.iter().enumerate() {
        if let BackendConfig::Http(http) = backend
            && !(http.url.starts_with("http://") || http.url.starts_with("https://"))
        {
            anyhow::bail!("Backend {} url must be http(s): {}", index, http.url);
        }
    }

    Ok(())
}
