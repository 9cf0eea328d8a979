use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// The process-wide configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration shared by every pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (without trailing slash).
    pub openai_base_url: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Chat provider used for summaries, rewrites, and answers.
    pub chat_provider: ChatProvider,
    /// Chat model identifier; must accept image inputs for the multi-modal pipeline.
    pub chat_model: String,
    /// Sampling temperature for chat calls.
    pub chat_temperature: f32,
    /// Vector store backend.
    pub vector_store: VectorStoreKind,
    /// Directory holding the local vector store.
    pub vector_store_path: PathBuf,
    /// Collection used for reads and writes.
    pub collection_name: String,
    /// Base URL of the Qdrant instance when `VECTOR_STORE=qdrant`.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Plain-text splitter settings.
    pub splitter: SplitterSettings,
    /// Title chunker settings for partitioned documents.
    pub title_chunking: TitleChunkingSettings,
    /// Base URL of the Unstructured partitioning API.
    pub unstructured_api_url: String,
    /// Optional API key for the Unstructured partitioning API.
    pub unstructured_api_key: Option<String>,
    /// Partitioning strategy requested from Unstructured.
    pub partition_strategy: String,
    /// Retrieval defaults.
    pub retrieval: RetrievalSettings,
    /// Number of query variations produced by multi-query retrieval.
    pub multi_query_count: usize,
    /// Conversation history retention policy.
    pub history_policy: HistoryPolicyKind,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing.
    Hash,
}

/// Supported chat backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// Directory-backed store on local disk.
    Local,
    /// Remote Qdrant collection over HTTP.
    Qdrant,
}

/// Strategy used to split plain-text documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitterStrategy {
    /// Separator-based character splitting.
    Character,
    /// Recursive semantic-boundary splitting.
    Recursive,
    /// Embedding-distance breakpoints.
    Semantic,
}

/// Plain-text splitter settings.
#[derive(Clone, Debug, Deserialize)]
pub struct SplitterSettings {
    /// Selected strategy.
    pub strategy: SplitterStrategy,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Separator used by the character strategy.
    pub separator: String,
    /// Percentile of consecutive distances used as the semantic breakpoint.
    pub breakpoint_percentile: f32,
}

/// Title chunker settings.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TitleChunkingSettings {
    /// Hard limit on chunk length in characters.
    pub max_characters: usize,
    /// Soft limit after which the open chunk is closed.
    pub new_after_n_chars: usize,
    /// Chunks shorter than this are merged into a neighbour.
    pub combine_text_under_n_chars: usize,
}

/// Retrieval defaults.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RetrievalSettings {
    /// Number of results returned.
    pub k: usize,
    /// Candidate pool for diversity-balanced retrieval.
    pub fetch_k: usize,
    /// Relevance/diversity balance; 1.0 is pure relevance.
    pub lambda_mult: f32,
    /// Minimum cosine similarity for threshold retrieval.
    pub score_threshold: f32,
}

/// History retention policy selected through `HISTORY_POLICY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum HistoryPolicyKind {
    /// Keep every turn.
    Unbounded,
    /// Keep the newest `n` turns.
    Window(usize),
    /// Keep the newest turns that fit the token budget.
    Tokens(usize),
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider: EmbeddingProvider =
            parse_env("EMBEDDING_PROVIDER", EmbeddingProvider::OpenAI)?;
        let chat_provider: ChatProvider = parse_env("CHAT_PROVIDER", ChatProvider::OpenAI)?;
        let vector_store: VectorStoreKind = parse_env("VECTOR_STORE", VectorStoreKind::Local)?;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");

        let uses_openai = embedding_provider == EmbeddingProvider::OpenAI
            || chat_provider == ChatProvider::OpenAI;
        if uses_openai && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let qdrant_url = load_env_optional("QDRANT_URL");
        if vector_store == VectorStoreKind::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let embedding_dimension: usize = parse_env("EMBEDDING_DIMENSION", 1536)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let config = Self {
            openai_api_key,
            openai_base_url: load_env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ollama_url: load_env_or("OLLAMA_URL", "http://127.0.0.1:11434"),
            embedding_provider,
            embedding_model: load_env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimension,
            embedding_batch_size: parse_env::<usize>("EMBEDDING_BATCH_SIZE", 64)?.max(1),
            chat_provider,
            chat_model: load_env_or("CHAT_MODEL", "gpt-4o"),
            chat_temperature: parse_env("CHAT_TEMPERATURE", 0.0)?,
            vector_store,
            vector_store_path: PathBuf::from(load_env_or("VECTOR_STORE_PATH", "db/vector_store")),
            collection_name: load_env_or("COLLECTION_NAME", "documents"),
            qdrant_url,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            splitter: SplitterSettings {
                strategy: parse_env("TEXT_SPLITTER_STRATEGY", SplitterStrategy::Character)?,
                chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE", 800)?,
                chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP", 0)?,
                separator: env::var("TEXT_SPLITTER_SEPARATOR")
                    .ok()
                    .filter(|value| !value.is_empty())
                    .map(|value| unescape_separator(&value))
                    .unwrap_or_else(|| "\n\n".to_string()),
                breakpoint_percentile: parse_env("SEMANTIC_BREAKPOINT_PERCENTILE", 70.0)?,
            },
            title_chunking: TitleChunkingSettings {
                max_characters: parse_env("CHUNK_MAX_CHARACTERS", 3000)?,
                new_after_n_chars: parse_env("CHUNK_NEW_AFTER_CHARS", 2400)?,
                combine_text_under_n_chars: parse_env("CHUNK_COMBINE_UNDER_CHARS", 500)?,
            },
            unstructured_api_url: load_env_or(
                "UNSTRUCTURED_API_URL",
                "https://api.unstructuredapp.io",
            ),
            unstructured_api_key: load_env_optional("UNSTRUCTURED_API_KEY"),
            partition_strategy: load_env_or("PARTITION_STRATEGY", "hi_res"),
            retrieval: RetrievalSettings {
                k: parse_env("RETRIEVAL_K", 5)?,
                fetch_k: parse_env("RETRIEVAL_FETCH_K", 10)?,
                lambda_mult: parse_env("RETRIEVAL_LAMBDA_MULT", 0.5)?,
                score_threshold: parse_env("RETRIEVAL_SCORE_THRESHOLD", 0.3)?,
            },
            multi_query_count: parse_env("MULTI_QUERY_COUNT", 3)?,
            history_policy: parse_env("HISTORY_POLICY", HistoryPolicyKind::Unbounded)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.splitter.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if !(0.0..=100.0).contains(&self.splitter.breakpoint_percentile) {
            return Err(ConfigError::InvalidValue(
                "SEMANTIC_BREAKPOINT_PERCENTILE".into(),
            ));
        }
        if self.title_chunking.max_characters == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_MAX_CHARACTERS".into()));
        }
        if self.retrieval.k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_K".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.lambda_mult) {
            return Err(ConfigError::InvalidValue("RETRIEVAL_LAMBDA_MULT".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(ConfigError::InvalidValue(
                "RETRIEVAL_SCORE_THRESHOLD".into(),
            ));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Translate `\n` / `\t` escapes so separators can be written on one line in `.env` files.
fn unescape_separator(value: &str) -> String {
    value.replace("\\n", "\n").replace("\\t", "\t")
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for SplitterStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "recursive" => Ok(Self::Recursive),
            "semantic" => Ok(Self::Semantic),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for HistoryPolicyKind {
    type Err = ();

    /// Accepts `unbounded`, `window:<turns>`, or `tokens:<budget>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized == "unbounded" {
            return Ok(Self::Unbounded);
        }
        let (kind, amount) = normalized.split_once(':').ok_or(())?;
        let amount: usize = amount.trim().parse().map_err(|_| ())?;
        if amount == 0 {
            return Err(());
        }
        match kind.trim() {
            "window" => Ok(Self::Window(amount)),
            "tokens" => Ok(Self::Tokens(amount)),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chat_provider = ?config.chat_provider,
        chat_model = %config.chat_model,
        vector_store = ?config.vector_store,
        collection = %config.collection_name,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_policy_parses_known_forms() {
        assert_eq!(
            "unbounded".parse::<HistoryPolicyKind>(),
            Ok(HistoryPolicyKind::Unbounded)
        );
        assert_eq!(
            "window:4".parse::<HistoryPolicyKind>(),
            Ok(HistoryPolicyKind::Window(4))
        );
        assert_eq!(
            "Tokens: 2000".parse::<HistoryPolicyKind>(),
            Ok(HistoryPolicyKind::Tokens(2000))
        );
        assert!("window:0".parse::<HistoryPolicyKind>().is_err());
        assert!("forever".parse::<HistoryPolicyKind>().is_err());
    }

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!(
            "OpenAI".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::OpenAI)
        );
        assert_eq!("hash".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert_eq!("OLLAMA".parse::<ChatProvider>(), Ok(ChatProvider::Ollama));
        assert_eq!("qdrant".parse::<VectorStoreKind>(), Ok(VectorStoreKind::Qdrant));
        assert!("chroma".parse::<VectorStoreKind>().is_err());
        assert_eq!(
            "semantic".parse::<SplitterStrategy>(),
            Ok(SplitterStrategy::Semantic)
        );
    }

    #[test]
    fn separator_escapes_are_expanded() {
        assert_eq!(unescape_separator("\\n\\n"), "\n\n");
        assert_eq!(unescape_separator(" "), " ");
    }
}
