use crate::config::Config;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const MAX_TEXT_PREVIEW_LENGTH: usize = 100;
const DEFAULT_CONNECTION_TIMEOUT_SECONDS: u64 = 15;

/// A fixed-dimension text encoder.
///
/// The HTTP call behind `encode` is the only potentially slow step in the
/// whole pipeline, so the request timeout configured on the implementation
/// is the sole cancellation point callers get.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this encoder produces.
    fn dimension(&self) -> usize;
}

/// Sentence encoder backed by the HuggingFace Inference API.
#[derive(Clone)]
pub struct HuggingFaceEncoder {
    client: Client,
    api_key: String,
    model_url: String,
    model_name: String,
    dimension: usize,
    retry_attempts: u32,
    retry_delay_ms: u64,
    initialized: Arc<AtomicBool>,
    warmup: Arc<OnceCell<()>>,
}

impl HuggingFaceEncoder {
    /// Create the encoder without touching the network. The first `encode`
    /// (or an explicit `prewarm`) performs the actual model warm-up.
    pub fn new(config: &Config) -> Result<Self> {
        if config.huggingface_api_key.trim().is_empty() {
            return Err(ApiError::ModelUnavailable(
                "APP_HUGGINGFACE_API_KEY is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECONDS))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        let model_url = format!(
            "{}/models/{}",
            config.huggingface_base_url, config.model_name
        );

        info!(
            "Initializing HuggingFace encoder with model: {}, dimension: {}, timeout: {}s",
            config.model_name, config.embedding_dimension, config.request_timeout_secs
        );

        Ok(Self {
            client,
            api_key: config.huggingface_api_key.clone(),
            model_url,
            model_name: config.model_name.clone(),
            dimension: config.embedding_dimension,
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
            initialized: Arc::new(AtomicBool::new(false)),
            warmup: Arc::new(OnceCell::new()),
        })
    }

    /// Warm the model up so the first user request doesn't pay the load cost.
    /// Concurrent callers block until the one doing the work finishes; a
    /// failed warm-up leaves the cell empty so the next caller retries.
    ///
    /// Returns true if this call performed the warm-up.
    pub async fn prewarm(&self) -> Result<bool> {
        if self.initialized.load(Ordering::Acquire) {
            debug!("HuggingFace encoder already prewarmed, skipping");
            return Ok(false);
        }

        let mut performed = false;
        self.warmup
            .get_or_try_init(|| async {
                info!("Prewarming HuggingFace encoder...");
                let test_text = "This is a test sentence for prewarming the embeddings model.";
                self.encode(test_text).await?;
                info!("HuggingFace encoder successfully prewarmed");
                performed = true;
                Ok::<(), ApiError>(())
            })
            .await?;
        Ok(performed)
    }

    async fn make_api_request(&self, input: &str) -> Result<reqwest::Response> {
        #[derive(Serialize)]
        struct Request<'a> {
            inputs: &'a str,
            options: Options,
        }

        #[derive(Serialize)]
        struct Options {
            wait_for_model: bool,
            use_cache: bool,
        }

        let request = Request {
            inputs: input,
            options: Options {
                wait_for_model: true,
                use_cache: true,
            },
        };

        let response = self
            .client
            .post(&self.model_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ApiError::ModelInferenceError(format!("Failed to send request to model API: {}", e))
            })?;

        Ok(response)
    }

    async fn process_api_response(&self, response: reqwest::Response) -> Result<Vec<f32>> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                404 => ApiError::ModelUnavailable(format!(
                    "Model not found: {}. Check the model name in your configuration.",
                    self.model_name
                )),
                401 | 403 => ApiError::ModelUnavailable(
                    "Authentication failed. Check your HuggingFace API key.".to_string(),
                ),
                429 => ApiError::ExternalServiceError(
                    "Rate limit exceeded. Reduce request frequency.".to_string(),
                ),
                _ => ApiError::ModelInferenceError(format!(
                    "HuggingFace API returned non-success status: {} - {}",
                    status, text
                )),
            });
        }

        let value: serde_json::Value = response.json().await.map_err(|e| {
            ApiError::SerializationError(format!("Failed to parse HuggingFace response: {}", e))
        })?;

        // The feature-extraction pipeline returns either a flat vector for a
        // single input or one vector per input.
        let embedding: Vec<f32> = if let Ok(flat) =
            serde_json::from_value::<Vec<f32>>(value.clone())
        {
            flat
        } else if let Ok(nested) = serde_json::from_value::<Vec<Vec<f32>>>(value) {
            nested.into_iter().next().ok_or_else(|| {
                ApiError::ModelInferenceError("Empty embedding response".to_string())
            })?
        } else {
            return Err(ApiError::ModelInferenceError(
                "Unrecognized embedding response format".to_string(),
            ));
        };

        if embedding.len() != self.dimension {
            return Err(ApiError::ShapeMismatch {
                left: embedding.len(),
                right: self.dimension,
            });
        }

        Ok(embedding)
    }
}

#[async_trait]
impl TextEncoder for HuggingFaceEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        debug!(
            "Encoding text (length: {}): {}{}",
            text.len(),
            &text[..text
                .char_indices()
                .nth(MAX_TEXT_PREVIEW_LENGTH)
                .map(|(i, _)| i)
                .unwrap_or(text.len())],
            if text.chars().count() > MAX_TEXT_PREVIEW_LENGTH {
                "..."
            } else {
                ""
            }
        );

        let mut last_error =
            ApiError::ModelInferenceError("All retry attempts failed when encoding text".into());

        for attempt in 1..=self.retry_attempts {
            match self.make_api_request(text).await {
                Ok(response) => match self.process_api_response(response).await {
                    Ok(embedding) => {
                        self.initialized.store(true, Ordering::Release);
                        return Ok(embedding);
                    }
                    // Auth/model errors won't heal between retries.
                    Err(e @ ApiError::ModelUnavailable(_)) => return Err(e),
                    Err(e) => last_error = e,
                },
                Err(e) => last_error = e,
            }

            if attempt < self.retry_attempts {
                let delay_ms = self.retry_delay_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Encode attempt {}/{} failed: {}. Retrying in {}ms",
                    attempt, self.retry_attempts, last_error, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        error!(
            "All {} encode attempts failed: {}",
            self.retry_attempts, last_error
        );
        Err(last_error)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Deterministic in-process encoder for tests. Texts registered with
    /// `insert` get their fixed vector; anything else gets a vector derived
    /// from its bytes, so repeated calls are bit-identical.
    pub(crate) struct StubEncoder {
        dimension: usize,
        table: Mutex<HashMap<String, Vec<f32>>>,
        pub calls: AtomicUsize,
    }

    impl StubEncoder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                table: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn insert(&self, text: &str, vector: Vec<f32>) {
            assert_eq!(vector.len(), self.dimension);
            self.table.lock().unwrap().insert(text.to_string(), vector);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn derive(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dimension];
            for (i, b) in text.bytes().enumerate() {
                v[i % self.dimension] += b as f32 / 255.0;
            }
            v
        }
    }

    #[async_trait]
    impl TextEncoder for StubEncoder {
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(v) = self.table.lock().unwrap().get(text) {
                return Ok(v.clone());
            }
            Ok(self.derive(text))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}
