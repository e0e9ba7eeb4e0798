use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the retrieval pipeline.
///
/// Built from defaults, optionally overridden by `VELLUM_*` environment
/// variables via [`VellumConfig::from_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VellumConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hybrid blending weight: 0 = keyword only, 1 = vector only.
    pub hybrid_alpha: f32,
    /// How many reranked hits make it into the final context.
    pub rerank_top_n: usize,
    /// Candidate pool size for intents without an explicit limit.
    pub candidate_limit: usize,
    /// How many trailing conversation turns feed query rewriting.
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: 0.5,
            rerank_top_n: 5,
            candidate_limit: 20,
            history_window: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target fragment size in characters.
    pub target_size: usize,
    /// Overlap between consecutive fixed-mode fragments, in characters.
    pub overlap: usize,
    /// Cosine similarity below which a new semantic fragment starts.
    pub similarity_threshold: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 800,
            overlap: 100,
            similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Size of the background worker pool.
    pub workers: usize,
    /// Retries after the initial attempt before a task is terminally failed.
    pub max_retries: usize,
    /// Fixed delay between attempts.
    #[serde(with = "duration_secs")]
    pub retry_backoff: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 3,
            retry_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub rerank_model: String,
    pub temperature: f32,
    /// Maximum items per embedding call, per the provider's limit.
    pub embed_batch_limit: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_owned(),
            api_key: String::new(),
            model: "qwen-plus".to_owned(),
            embedding_model: "text-embedding-v2".to_owned(),
            rerank_model: "gte-rerank".to_owned(),
            temperature: 0.5,
            embed_batch_limit: 25,
        }
    }
}

impl VellumConfig {
    /// Defaults overridden by any `VELLUM_*` environment variables present.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VELLUM_HYBRID_ALPHA") {
            match v.parse::<f32>() {
                Ok(alpha) if (0.0..=1.0).contains(&alpha) => self.retrieval.hybrid_alpha = alpha,
                _ => tracing::warn!("ignoring invalid VELLUM_HYBRID_ALPHA value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("VELLUM_RERANK_TOP_N")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.rerank_top_n = n;
        }
        if let Ok(v) = std::env::var("VELLUM_CANDIDATE_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.candidate_limit = n;
        }
        if let Ok(v) = std::env::var("VELLUM_CHUNK_TARGET_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunking.target_size = n;
        }
        if let Ok(v) = std::env::var("VELLUM_CHUNK_OVERLAP")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunking.overlap = n;
        }
        if let Ok(v) = std::env::var("VELLUM_SIMILARITY_THRESHOLD")
            && let Ok(t) = v.parse::<f32>()
        {
            self.chunking.similarity_threshold = t;
        }
        if let Ok(v) = std::env::var("VELLUM_INGEST_WORKERS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.ingestion.workers = n.max(1);
        }
        if let Ok(v) = std::env::var("VELLUM_INGEST_MAX_RETRIES")
            && let Ok(n) = v.parse::<usize>()
        {
            self.ingestion.max_retries = n;
        }
        if let Ok(v) = std::env::var("VELLUM_INGEST_RETRY_BACKOFF_SECS")
            && let Ok(n) = v.parse::<u64>()
        {
            self.ingestion.retry_backoff = Duration::from_secs(n);
        }
        if let Ok(v) = std::env::var("VELLUM_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Ok(v) = std::env::var("VELLUM_API_KEY") {
            self.provider.api_key = v;
        }
        if let Ok(v) = std::env::var("VELLUM_MODEL") {
            self.provider.model = v;
        }
        if let Ok(v) = std::env::var("VELLUM_EMBEDDING_MODEL") {
            self.provider.embedding_model = v;
        }
        if let Ok(v) = std::env::var("VELLUM_RERANK_MODEL") {
            self.provider.rerank_model = v;
        }
        if let Ok(v) = std::env::var("VELLUM_EMBED_BATCH_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.provider.embed_batch_limit = n.max(1);
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = VellumConfig::default();
        assert!((cfg.retrieval.hybrid_alpha - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.retrieval.rerank_top_n, 5);
        assert_eq!(cfg.retrieval.candidate_limit, 20);
        assert_eq!(cfg.retrieval.history_window, 5);
        assert_eq!(cfg.chunking.target_size, 800);
        assert_eq!(cfg.chunking.overlap, 100);
        assert!((cfg.chunking.similarity_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(cfg.ingestion.workers, 2);
        assert_eq!(cfg.ingestion.max_retries, 3);
        assert_eq!(cfg.ingestion.retry_backoff, Duration::from_secs(60));
        assert_eq!(cfg.provider.embed_batch_limit, 25);
    }

    #[test]
    fn invalid_alpha_override_ignored() {
        let mut cfg = VellumConfig::default();
        // Direct call to the parser path through a crafted value.
        unsafe {
            std::env::set_var("VELLUM_HYBRID_ALPHA", "2.5");
        }
        cfg.apply_env_overrides();
        unsafe {
            std::env::remove_var("VELLUM_HYBRID_ALPHA");
        }
        assert!((cfg.retrieval.hybrid_alpha - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn backoff_roundtrips_as_seconds() {
        let cfg = IngestionConfig {
            workers: 1,
            max_retries: 2,
            retry_backoff: Duration::from_secs(5),
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["retry_backoff"], 5);
        let back: IngestionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.retry_backoff, Duration::from_secs(5));
    }

    #[test]
    fn api_key_not_serialized() {
        let cfg = ProviderConfig {
            api_key: "secret".into(),
            ..ProviderConfig::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert!(json.get("api_key").is_none());
    }
}
