use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_COST;
use crate::doc_processor::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::llm::openai::OpenAiConfig;
use crate::retrieval::DEFAULT_TOP_K;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the database, uploaded PDFs and chunk caches live
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Chunks placed into the prompt per chat turn
    pub top_k: usize,
    /// Target chunk length in characters
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks
    pub chunk_overlap: usize,
    /// Maximum upload size in MB
    pub max_upload_mb: usize,
    /// bcrypt cost for new password hashes (4..=31)
    pub password_hash_cost: u32,
    /// LLM provider configuration
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Prepended to every conversation when set
    pub system_prompt: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_upload_mb: 20,
            password_hash_cost: DEFAULT_COST,
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-oss-20b:free".to_string(),
            api_key: None,
            timeout_secs: 60,
            system_prompt: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}", key, val);
                None
            }
        },
        Err(_) => None,
    }
}

impl Config {
    /// Defaults overridden by the environment. A `.env` file in the working
    /// directory is loaded first; real environment variables win over it.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PDF_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("PDF_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = parse_env::<usize>("PDF_CHAT_TOP_K") {
            config.top_k = v;
        }
        if let Some(v) = parse_env::<usize>("PDF_CHAT_CHUNK_SIZE") {
            config.chunk_size = v.max(1);
        }
        if let Some(v) = parse_env::<usize>("PDF_CHAT_CHUNK_OVERLAP") {
            config.chunk_overlap = v;
        }
        if let Some(v) = parse_env::<usize>("PDF_CHAT_MAX_UPLOAD_MB") {
            config.max_upload_mb = v;
        }
        if let Some(v) = parse_env::<u32>("PDF_CHAT_PASSWORD_HASH_COST") {
            config.password_hash_cost = v.clamp(4, 31);
        }

        // API_KEY is the historical name; LLM_API_KEY takes precedence.
        if let Ok(key) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            if !key.trim().is_empty() {
                config.llm.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(v) = parse_env::<u64>("LLM_TIMEOUT_SECS") {
            config.llm.timeout_secs = v;
        }
        if let Ok(prompt) = std::env::var("LLM_SYSTEM_PROMPT") {
            config.llm.system_prompt = Some(prompt);
        }

        if config.chunk_overlap >= config.chunk_size {
            tracing::warn!(
                "Chunk overlap {} is not below chunk size {}, clamping",
                config.chunk_overlap,
                config.chunk_size
            );
            config.chunk_overlap = config.chunk_size - 1;
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("pdf-chat.db")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.data_dir.join("pdfs")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("chunk_cache")
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

impl LlmConfig {
    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.cache_dir(), PathBuf::from("./data/chunk_cache"));
        assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);
        assert_eq!(config.password_hash_cost, 12);
        assert_eq!(config.llm.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_openai_config_uses_empty_key_when_unset() {
        let llm = LlmConfig::default();
        let openai = llm.openai_config();
        assert!(openai.api_key.is_empty());
        assert_eq!(openai.timeout, Duration::from_secs(60));
    }
}
