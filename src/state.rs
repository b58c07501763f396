use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::doc_processor::ChunkCache;
use crate::llm::openai::OpenAiClient;
use crate::llm::ChatCompletion;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub cache: ChunkCache,
    pub llm: Arc<dyn ChatCompletion>,
}

impl AppState {
    /// Open storage under the configured data dir and build the LLM client.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = OpenAiClient::new(config.llm.openai_config())?;
        Self::with_llm(config, Arc::new(llm))
    }

    /// Like [`AppState::new`] but with a caller-supplied chat backend.
    pub fn with_llm(config: Config, llm: Arc<dyn ChatCompletion>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.pdf_dir())?;
        std::fs::create_dir_all(config.cache_dir())?;

        let db = Database::open(&config.db_path())?;
        let cache = ChunkCache::new(config.cache_dir());

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            cache,
            llm,
        })
    }
}
