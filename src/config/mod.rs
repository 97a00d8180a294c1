use crate::error::{ApiError, Result};
use dotenv::dotenv;
use std::env;

const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Tunable scoring constants for the recommendation engine.
///
/// Defaults mirror the values the algorithms were shipped with; they are
/// configurable rather than hard-coded, but there is no evidence the
/// defaults are wrong.
#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    /// Similarity floor for the plain "books like this one" path.
    pub similar_min_similarity: f32,
    /// Similarity floor when fanning out from a liked book.
    pub liked_min_similarity: f32,
    /// Similarity floor when fanning out from a disliked book.
    pub disliked_min_similarity: f32,
    /// Fraction of a dislike-match's similarity subtracted from a
    /// candidate's accumulated score.
    pub dislike_penalty: f32,
    /// Flat boost applied when a candidate's genre matches a preference.
    pub genre_boost: f32,
    /// At most this many liked books seed the candidate pool.
    pub max_liked_seeds: usize,
    /// At most this many disliked books contribute penalties.
    pub max_disliked_seeds: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            similar_min_similarity: 0.3,
            liked_min_similarity: 0.4,
            disliked_min_similarity: 0.5,
            dislike_penalty: 0.5,
            genre_boost: 0.2,
            max_liked_seeds: 5,
            max_disliked_seeds: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub database_url: String,
    pub vector_cache_path: String,
    pub huggingface_api_key: String,
    pub huggingface_base_url: String,
    pub model_name: String,
    pub embedding_dimension: usize,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub recommendation: RecommendationSettings,
    pub context_max_users: usize,
    pub context_ttl_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let huggingface_api_key = env::var("APP_HUGGINGFACE_API_KEY").map_err(|_| {
            ApiError::InvalidInput(
                "Missing APP_HUGGINGFACE_API_KEY environment variable".to_string(),
            )
        })?;

        let recommendation = RecommendationSettings {
            similar_min_similarity: env_or("APP_SIMILAR_MIN_SIMILARITY", 0.3),
            liked_min_similarity: env_or("APP_LIKED_MIN_SIMILARITY", 0.4),
            disliked_min_similarity: env_or("APP_DISLIKED_MIN_SIMILARITY", 0.5),
            dislike_penalty: env_or("APP_DISLIKE_PENALTY", 0.5),
            genre_boost: env_or("APP_GENRE_BOOST", 0.2),
            max_liked_seeds: env_or("APP_MAX_LIKED_SEEDS", 5),
            max_disliked_seeds: env_or("APP_MAX_DISLIKED_SEEDS", 3),
        };

        Ok(Config {
            port: env_or("PORT", 3000),
            host: env_or_string("HOST", "127.0.0.1"),
            database_url: env_or_string("APP_DATABASE_URL", "sqlite://library.db"),
            vector_cache_path: env_or_string("APP_VECTOR_CACHE_PATH", "book_embeddings_cache.json"),
            huggingface_api_key,
            huggingface_base_url: env_or_string("APP_HUGGINGFACE_BASE_URL", DEFAULT_BASE_URL),
            model_name: env_or_string("APP_HUGGINGFACE_MODEL_NAME", DEFAULT_MODEL_NAME),
            embedding_dimension: env_or("APP_EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION),
            request_timeout_secs: env_or("APP_HUGGINGFACE_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS),
            retry_attempts: env_or("APP_EXTERNAL_SERVICE_RETRIES", DEFAULT_RETRY_ATTEMPTS),
            retry_delay_ms: env_or("APP_HUGGINGFACE_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
            recommendation,
            context_max_users: env_or("APP_CONTEXT_MAX_USERS", 1000),
            context_ttl_secs: env_or("APP_CONTEXT_TTL_SECS", 3600),
        })
    }
}
