//! Application state wiring the memory pipeline to concrete infrastructure.
//!
//! AppState holds the instances used by both CLI commands and HTTP handlers.
//! The pipeline is generic over its judge; here it is pinned to [`LlmJudge`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use secrecy::SecretString;

use cam_core::config::ConfigHandle;
use cam_core::gate::judge::LlmJudge;
use cam_core::llm::box_provider::BoxLlmProvider;
use cam_core::memory::box_embedder::BoxEmbedder;
use cam_core::memory::box_vector::BoxVectorMemoryStore;
use cam_core::memory::in_memory::InMemoryVectorStore;
use cam_core::pipeline::MemoryPipeline;
use cam_infra::config::{ConfigWatcher, DEFAULT_DEBOUNCE, load_memory_config, watch_config};
use cam_infra::filesystem::{config_path, model_cache_path, resolve_data_dir, vector_store_path};
use cam_infra::llm::create_provider;
use cam_infra::vector::embedder::FastEmbedEmbedder;
use cam_infra::vector::lance::LanceVectorStore;
use cam_infra::vector::memory::LanceMemoryStore;

use crate::cli::Cli;

/// Fallback environment variables for the API key.
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// The vendor variable consulted when `CAM_API_KEY` is unset.
fn fallback_key_env(provider: &str) -> &'static str {
    match provider {
        "anthropic" => ANTHROPIC_KEY_ENV,
        _ => OPENAI_KEY_ENV,
    }
}

/// Concrete pipeline type used by the binary.
pub type ConcretePipeline = MemoryPipeline<LlmJudge>;

/// Startup options taken from the command line.
pub struct StateOptions {
    pub config_path: Option<PathBuf>,
    pub ephemeral: bool,
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
}

impl StateOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        let api_key = cli
            .api_key
            .clone()
            .or_else(|| std::env::var(fallback_key_env(&cli.provider)).ok())
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        Self {
            config_path: cli.config.clone(),
            ephemeral: cli.ephemeral,
            provider: cli.provider.clone(),
            model: cli.model.clone(),
            base_url: cli.base_url.clone(),
            api_key,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ConcretePipeline>,
    /// `None` when no API key was given: answers are unavailable and the
    /// judges use their fallbacks.
    pub provider: Option<Arc<BoxLlmProvider>>,
    /// Model the provider answers with.
    pub model: String,
    pub config: ConfigHandle,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub ephemeral: bool,
    _watcher: Option<Arc<Mutex<ConfigWatcher>>>,
}

impl AppState {
    /// Load config, open the store and embedder, and wire the pipeline.
    ///
    /// A bad config file is fatal here.
    pub async fn init(options: StateOptions) -> Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let config_path = options.config_path.unwrap_or_else(|| config_path(&data_dir));
        let config = load_memory_config(&config_path)
            .await
            .with_context(|| format!("Invalid config at {}", config_path.display()))?;
        let config_handle = ConfigHandle::new(config)?;
        let timeout = config_handle.current().pipeline.call_timeout();

        let cache_dir = model_cache_path(&data_dir);
        let embedder = tokio::task::spawn_blocking(move || FastEmbedEmbedder::new(cache_dir))
            .await
            .context("Embedding model loader panicked")?
            .context("Failed to load the embedding model")?;
        let embedder = Arc::new(BoxEmbedder::new(embedder));

        let store = if options.ephemeral {
            BoxVectorMemoryStore::new(InMemoryVectorStore::new(embedder.dimension()))
        } else {
            let lance = LanceVectorStore::new(vector_store_path(&data_dir))
                .await
                .context("Failed to open the vector store")?;
            let store = LanceMemoryStore::open(lance, embedder.dimension())
                .await
                .context("Failed to open the memory table")?;
            BoxVectorMemoryStore::new(store)
        };

        let provider = match options.api_key {
            Some(key) => Some(Arc::new(
                create_provider(
                    &options.provider,
                    key,
                    &options.model,
                    options.base_url.as_deref(),
                )
                .context("Failed to configure the LLM provider")?,
            )),
            None => {
                tracing::warn!(
                    "No API key configured; answers are unavailable and judges use their defaults"
                );
                None
            }
        };

        let judge = match &provider {
            Some(provider) => LlmJudge::new(provider.clone(), timeout),
            None => LlmJudge::offline(),
        };

        let pipeline = MemoryPipeline::new(
            Arc::new(store),
            embedder,
            Arc::new(judge),
            config_handle.clone(),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            provider,
            model: options.model,
            config: config_handle,
            config_path,
            data_dir,
            ephemeral: options.ephemeral,
            _watcher: None,
        })
    }

    /// Start hot reload of the config file. For long-running commands.
    pub fn watch_config(&mut self) -> Result<()> {
        let watcher = watch_config(&self.config_path, self.config.clone(), DEFAULT_DEBOUNCE)
            .context("Failed to watch the config file")?;
        self._watcher = Some(Arc::new(Mutex::new(watcher)));
        Ok(())
    }

    /// The provider, or an error naming how to configure one.
    pub fn require_provider(&self) -> Result<&BoxLlmProvider> {
        self.provider.as_deref().with_context(|| {
            format!(
                "No API key configured. Set CAM_API_KEY, {OPENAI_KEY_ENV} or {ANTHROPIC_KEY_ENV}, \
                 or pass --api-key."
            )
        })
    }
}
