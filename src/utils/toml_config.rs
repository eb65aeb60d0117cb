//! TOML-based configuration for tianqi
//!
//! This module provides declarative configuration for the server, the client
//! commands, the retrieval pipeline, and the generation providers via a TOML
//! file (`tianqi.toml`).
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `TianqiConfigManager` for thread-safe access to the current configuration.
//! Values read per request (retrieval `k`, sampling parameters) pick up edits
//! immediately; the embedding provider and store location are fixed at startup.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tianqi_vector::DistanceMetric;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from tianqi.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TianqiConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub rag: RagConfig,

    /// Named generation provider configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for TianqiConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            default_provider_name(),
            ProviderConfig::Ollama {
                base_url: default_ollama_url(),
                model: default_ollama_chat_model(),
            },
        );

        Self {
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            rag: RagConfig::default(),
            providers,
            generation: GenerationConfig::default(),
        }
    }
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Client Configuration =============

/// Settings for the CLI commands that talk to a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============= RAG Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Folder scanned by `ingest` when no folder is given
    #[serde(default = "default_documents_path")]
    pub documents_path: PathBuf,

    /// Directory the vector store is saved to after every mutation
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: PathBuf,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k_default: usize,

    /// Enable retrieval (and load the saved store) when the server starts
    #[serde(default = "default_true")]
    pub activate_on_start: bool,

    /// Number of query embeddings kept in memory; 0 disables the cache
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,

    /// Texts sent to the embedding provider per request
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Embedding requests allowed in flight at once during ingestion
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("./data/documents")
}

fn default_vector_store_path() -> PathBuf {
    PathBuf::from("./data/vector_store")
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_query_cache_capacity() -> usize {
    256
}

fn default_embedding_batch_size() -> usize {
    32
}

fn default_embedding_concurrency() -> usize {
    4
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            documents_path: default_documents_path(),
            vector_store_path: default_vector_store_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k_default: default_top_k(),
            activate_on_start: default_true(),
            query_cache_capacity: default_query_cache_capacity(),
            embedding_batch_size: default_embedding_batch_size(),
            embedding_concurrency: default_embedding_concurrency(),
            metric: DistanceMetric::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_embedding_model")]
        model: String,
    },
    FastEmbed {
        /// fastembed model code, e.g. `BAAI/bge-small-en-v1.5`
        #[serde(default = "default_fastembed_model")]
        model: String,
        /// Where downloaded model files are cached
        #[serde(default)]
        model_path: Option<PathBuf>,
        #[serde(default = "default_device")]
        device: String,
    },
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_fastembed_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Ollama {
            base_url: default_ollama_url(),
            model: default_ollama_embedding_model(),
        }
    }
}

impl EmbeddingConfig {
    /// Model identifier of the configured backend
    pub fn model(&self) -> &str {
        match self {
            EmbeddingConfig::Ollama { model, .. } | EmbeddingConfig::FastEmbed { model, .. } => {
                model
            }
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_chat_model")]
        model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_chat_model() -> String {
    "llama3.2".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

// ============= Generation Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the entry in `[providers]` used for replies
    #[serde(default = "default_provider_name")]
    pub provider: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_sampling_top_k")]
    pub top_k: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Fragments buffered between the model task and the HTTP response
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_provider_name() -> String {
    "local".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_sampling_top_k() -> u32 {
    50
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_tokens() -> u32 {
    512
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider_name(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            top_k: default_sampling_top_k(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' referenced by [generation] does not exist")]
    MissingProvider(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl TianqiConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: TianqiConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    ///
    /// Client commands only need `[client]`, so they can run without a file.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                warn!(path = ?path, "Config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "rag.chunk_size must be greater than 0".to_string(),
            ));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.top_k_default == 0 {
            return Err(ConfigError::ValidationError(
                "rag.top_k_default must be greater than 0".to_string(),
            ));
        }
        if rag.embedding_batch_size == 0 || rag.embedding_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "rag.embedding_batch_size and rag.embedding_concurrency must be greater than 0"
                    .to_string(),
            ));
        }
        if self.generation.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "generation.channel_capacity must be greater than 0".to_string(),
            ));
        }

        for provider in self.providers.values() {
            if let ProviderConfig::OpenAI { api_key_env, .. } = provider {
                self.validate_env_var(api_key_env)?;
            }
        }

        if !self.providers.contains_key(&self.generation.provider) {
            return Err(ConfigError::MissingProvider(
                self.generation.provider.clone(),
            ));
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }

    /// Get provider by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// The provider `[generation]` points at
    pub fn generation_provider(&self) -> Result<&ProviderConfig, ConfigError> {
        self.get_provider(&self.generation.provider)
            .ok_or_else(|| ConfigError::MissingProvider(self.generation.provider.clone()))
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct TianqiConfigManager {
    config: Arc<ArcSwap<TianqiConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl TianqiConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path so the watcher's parent directory is stable
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = TianqiConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config. No file watching.
    pub fn from_config(config: TianqiConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("tianqi.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<TianqiConfig> {
        self.config.load_full()
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = TianqiConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let file_name = self.config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        // Debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Editors often replace the file, so watch the directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let debounce_duration = Duration::from_millis(500);
            let mut last_reload: Option<std::time::Instant> = None;

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce_duration) {
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match TianqiConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for TianqiConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> String {
        r#"
[server]
host = "0.0.0.0"
port = 8080
log_level = "debug"

[client]
base_url = "http://127.0.0.1:8080"

[rag]
documents_path = "./docs"
vector_store_path = "./store"
chunk_size = 400
chunk_overlap = 40
top_k_default = 3

[rag.embedding]
type = "ollama"
model = "mxbai-embed-large"

[providers.local]
type = "ollama"
model = "qwen2.5"

[generation]
provider = "local"
max_tokens = 256
"#
        .to_string()
    }

    #[test]
    fn test_parse_config() {
        let config: TianqiConfig = toml::from_str(&create_test_config()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rag.chunk_size, 400);
        assert_eq!(config.rag.top_k_default, 3);
        assert_eq!(config.rag.embedding.model(), "mxbai-embed-large");
        assert_eq!(config.generation.max_tokens, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config: TianqiConfig = toml::from_str("[providers.local]\ntype = \"ollama\"\n").unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.rag.chunk_overlap, 50);
        assert_eq!(config.rag.top_k_default, 5);
        assert_eq!(config.generation.temperature, 1.0);
        assert_eq!(config.generation.top_k, 50);
        assert_eq!(config.generation.top_p, 0.95);
        assert_eq!(config.generation.max_tokens, 512);
        assert_eq!(config.rag.metric, DistanceMetric::Cosine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fastembed_embedding_config() {
        let config: TianqiConfig = toml::from_str(
            r#"
[rag.embedding]
type = "fastembed"
device = "cuda"

[providers.local]
type = "ollama"
"#,
        )
        .unwrap();

        match &config.rag.embedding {
            EmbeddingConfig::FastEmbed { model, device, .. } => {
                assert_eq!(model, "BAAI/bge-small-en-v1.5");
                assert_eq!(device, "cuda");
            }
            other => panic!("unexpected embedding config: {:?}", other),
        }
    }

    #[test]
    fn test_validation_overlap_not_smaller() {
        let mut config = TianqiConfig::default();
        config.rag.chunk_overlap = config.rag.chunk_size;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_zero_top_k() {
        let mut config = TianqiConfig::default();
        config.rag.top_k_default = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_missing_provider() {
        let mut config = TianqiConfig::default();
        config.generation.provider = "cloud".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProvider(name)) if name == "cloud"
        ));
    }

    #[test]
    fn test_validation_missing_env_var() {
        let mut config = TianqiConfig::default();
        config.providers.insert(
            "cloud".to_string(),
            ProviderConfig::OpenAI {
                api_key_env: "TIANQI_TEST_UNSET_KEY_VAR".to_string(),
                api_base: default_openai_base(),
                model: "gpt-4o-mini".to_string(),
            },
        );

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = TianqiConfig::load_or_default("/nonexistent/tianqi.toml").unwrap();
        assert_eq!(config.client.base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_manager_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", create_test_config()).unwrap();

        let manager = TianqiConfigManager::new(file.path()).unwrap();
        assert_eq!(manager.config().rag.top_k_default, 3);

        let updated = create_test_config().replace("top_k_default = 3", "top_k_default = 7");
        std::fs::write(file.path(), updated).unwrap();
        manager.reload().unwrap();

        assert_eq!(manager.config().rag.top_k_default, 7);
    }

    #[test]
    fn test_manager_reload_keeps_old_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", create_test_config()).unwrap();
        let manager = TianqiConfigManager::new(file.path()).unwrap();

        std::fs::write(file.path(), "[rag]\nchunk_size = \"big\"").unwrap();
        assert!(manager.reload().is_err());
        assert_eq!(manager.config().rag.chunk_size, 400);
    }
}
