use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use anyhow::Result;

use crate::utils::DocsiftResult;

pub const SETTINGS_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub classifier: ClassifierConfig,
    pub embedder: EmbedderConfig,
    pub ranking: RankingConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub uploads_dir: String,
    pub audio_dir: String,
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_mb: u64,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// heuristic | tree
    pub backend: String,
    /// 决策树 JSON 路径，backend = tree 时必填
    pub model_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// hashing | http
    pub backend: String,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    pub cache_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RankingConfig {
    pub lambda: f32,
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// openai | ollama | gemini
    pub provider: String,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtsConfig {
    /// openai | azure
    pub provider: String,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub voice: String,
    pub language: String,
}

impl AppConfig {
    /// 默认值 < config/settings.toml < DOCSIFT_<SECTION>__<KEY> 环境变量
    pub fn load() -> DocsiftResult<Self> {
        Self::load_from(SETTINGS_PATH)
    }

    pub fn load_from(path: &str) -> DocsiftResult<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("DOCSIFT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.upload.max_file_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: "./uploads".to_string(),
            audio_dir: "./audio".to_string(),
            database_path: "./data/docsift.db".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: "heuristic".to_string(),
            model_path: "./models/heading_tree.json".to_string(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: "hashing".to_string(),
            api_url: String::new(),
            api_key: String::new(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            cache_ttl_minutes: 60,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            lambda: 0.72,
            top_k: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_retries: 3,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            api_url: "https://api.openai.com/v1/audio/speech".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            language: "en".to_string(),
        }
    }
}
