//! Configuration for voxnote.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOXNOTE_VAULT / VAULT_PATH, OPENAI_API_KEY,
//!    TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, EMBEDDING_URL, EMBEDDING_MODEL,
//!    EMBEDDING_API_KEY, FASTEMBED_MODEL, FASTEMBED_CACHE_DIR)
//! 2. Config file (.voxnote/config.yaml)
//! 3. Defaults (~/.voxnote/vault, fastembed `all-minilm-l6-v2` cached in
//!    ~/.voxnote/models)
//!
//! Config file discovery:
//! - Searches current directory and parents for .voxnote/config.yaml
//! - Relative paths in the config file are resolved against the project root
//!   (the directory containing .voxnote/)
//!
//! Keep one embedding provider and model per vault. Switching models makes
//! new vectors incomparable with how older notes were linked.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL};
use crate::adapters::TelegramConfig;
use crate::linker::{
    known_dimensions, EmbeddingProvider, FastEmbedProvider, HttpEmbeddingProvider,
    SimilarityLinker, DEFAULT_FASTEMBED_MODEL, DEFAULT_HTTP_MODEL, DEFAULT_HTTP_URL,
    DEFAULT_LINK_HEADING, DEFAULT_TOP_K,
};
use crate::vault::Vault;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    /// Vault directory (relative to project root)
    pub path: Option<String>,
    /// Heading of the related-notes section
    pub link_heading: Option<String>,
    /// Number of related notes to link
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" (default) or "http"
    pub provider: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// HTTP provider only; fastembed models know their own size
    pub dimensions: Option<usize>,
    /// fastembed model cache (relative to project root)
    pub cache_dir: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFileConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Which embedding backend to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    FastEmbed {
        model: String,
        cache_dir: Option<PathBuf>,
    },
    Http {
        url: String,
        model: String,
        api_key: Option<String>,
        dimensions: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub timeout: Option<Duration>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::FastEmbed {
                model: DEFAULT_FASTEMBED_MODEL.to_string(),
                cache_dir: None,
            },
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Vault directory
    pub vault: PathBuf,
    /// Heading of the related-notes section
    pub link_heading: String,
    /// Number of related notes linked per save
    pub top_k: usize,
    /// Embedding settings
    pub embedding: EmbeddingSettings,
    /// OpenAI API key (transcription and summarization)
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    /// Telegram reporting target (both token and chat id present)
    pub telegram: Option<TelegramConfig>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Build the embedding provider. Call once per process and reuse.
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match &self.embedding.backend {
            EmbeddingBackend::FastEmbed { model, cache_dir } => {
                Arc::new(FastEmbedProvider::new(model, cache_dir.clone())?)
            }
            EmbeddingBackend::Http {
                url,
                model,
                api_key,
                dimensions,
            } => Arc::new(HttpEmbeddingProvider::new(
                url.clone(),
                model.clone(),
                api_key.clone(),
                *dimensions,
            )?),
        };
        Ok(provider)
    }

    /// Build the similarity linker from these settings
    pub fn linker(&self) -> Result<SimilarityLinker> {
        Ok(SimilarityLinker::new(self.embedding_provider()?)
            .with_top_k(self.top_k)
            .with_heading(self.link_heading.clone())
            .with_embed_timeout(self.embedding.timeout))
    }

    /// Open the configured vault
    pub fn open_vault(&self) -> Result<Vault> {
        Vault::open(&self.vault, self.linker()?)
            .with_context(|| format!("Failed to open vault: {}", self.vault.display()))
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".voxnote").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources, reading variables through `env`
fn load_config_with(env: impl Fn(&str) -> Option<String>, cwd: &Path) -> Result<ResolvedConfig> {
    let env = |key: &str| env(key).filter(|v| !v.is_empty());

    let config_file = find_config_file(cwd);
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };
    let base_dir = config_file
        .as_ref()
        .and_then(|p| p.parent()) // .voxnote/
        .and_then(|p| p.parent()) // project root
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let vault_section = file.as_ref().map(|f| f.vault.clone()).unwrap_or_default();
    let embedding_section = file.as_ref().and_then(|f| f.embedding.clone());
    let openai_section = file.as_ref().and_then(|f| f.openai.clone());
    let telegram_section = file.as_ref().and_then(|f| f.telegram.clone());

    let vault = if let Some(path) = env("VOXNOTE_VAULT").or_else(|| env("VAULT_PATH")) {
        PathBuf::from(path)
    } else if let Some(ref path) = vault_section.path {
        resolve_path(&base_dir, path)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".voxnote")
            .join("vault")
    };

    let defaults = EmbeddingSettings::default();
    let timeout = match embedding_section.as_ref().and_then(|e| e.timeout_seconds) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => defaults.timeout,
    };

    let http_url = env("EMBEDDING_URL").or_else(|| embedding_section.as_ref().and_then(|e| e.url.clone()));
    let provider = embedding_section
        .as_ref()
        .and_then(|e| e.provider.clone())
        .unwrap_or_else(|| {
            if http_url.is_some() { "http" } else { "fastembed" }.to_string()
        });
    let model = env("EMBEDDING_MODEL")
        .or_else(|| embedding_section.as_ref().and_then(|e| e.model.clone()));

    let backend = match provider.as_str() {
        "fastembed" | "local" => EmbeddingBackend::FastEmbed {
            model: env("FASTEMBED_MODEL")
                .or(model)
                .unwrap_or_else(|| DEFAULT_FASTEMBED_MODEL.to_string()),
            cache_dir: env("FASTEMBED_CACHE_DIR")
                .map(PathBuf::from)
                .or_else(|| {
                    embedding_section
                        .as_ref()
                        .and_then(|e| e.cache_dir.as_deref())
                        .map(|dir| resolve_path(&base_dir, dir))
                })
                .or_else(|| dirs::home_dir().map(|home| home.join(".voxnote").join("models"))),
        },
        "http" => {
            let model = model.unwrap_or_else(|| DEFAULT_HTTP_MODEL.to_string());
            let dimensions = embedding_section
                .as_ref()
                .and_then(|e| e.dimensions)
                .or_else(|| known_dimensions(&model))
                .with_context(|| {
                    format!(
                        "Unknown output size for embedding model '{}'. Set embedding.dimensions in .voxnote/config.yaml",
                        model
                    )
                })?;
            EmbeddingBackend::Http {
                url: http_url.unwrap_or_else(|| DEFAULT_HTTP_URL.to_string()),
                model,
                api_key: env("EMBEDDING_API_KEY")
                    .or_else(|| embedding_section.as_ref().and_then(|e| e.api_key.clone())),
                dimensions,
            }
        }
        other => anyhow::bail!("Unknown embedding provider: {} (use 'fastembed' or 'http')", other),
    };

    let telegram = match (
        env("TELEGRAM_BOT_TOKEN")
            .or_else(|| telegram_section.as_ref().and_then(|t| t.bot_token.clone())),
        env("TELEGRAM_CHAT_ID")
            .or_else(|| telegram_section.as_ref().and_then(|t| t.chat_id.clone())),
    ) {
        (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
        _ => None,
    };

    Ok(ResolvedConfig {
        vault,
        link_heading: vault_section
            .link_heading
            .unwrap_or_else(|| DEFAULT_LINK_HEADING.to_string()),
        top_k: vault_section.top_k.unwrap_or(DEFAULT_TOP_K),
        embedding: EmbeddingSettings { backend, timeout },
        openai_api_key: env("OPENAI_API_KEY")
            .or_else(|| openai_section.as_ref().and_then(|o| o.api_key.clone())),
        openai_base_url: openai_section
            .as_ref()
            .and_then(|o| o.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        chat_model: openai_section
            .as_ref()
            .and_then(|o| o.chat_model.clone())
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        telegram,
        config_file,
    })
}

/// Load configuration from the process environment and working directory
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_with(|key| std::env::var(key).ok(), &cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
