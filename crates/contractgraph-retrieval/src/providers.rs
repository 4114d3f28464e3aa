//! Embedding and completion providers.
//!
//! Concrete client for OpenAI-compatible endpoints, plus deterministic
//! test doubles. Provider calls are the only suspension points in the
//! system; every call carries a timeout, and transient failures (rate
//! limits, network) are retried through [`with_backoff`].

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Provider configuration loaded from environment or built explicitly.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub completion_model: String,
    pub embedding_model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Load from `OPENAI_API_KEY` / `OPENAI_BASE_URL` /
    /// `CONTRACTGRAPH_COMPLETION_MODEL` / `CONTRACTGRAPH_EMBEDDING_MODEL`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        Some(Self {
            api_key,
            completion_model: std::env::var("CONTRACTGRAPH_COMPLETION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: std::env::var("CONTRACTGRAPH_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout_secs: 60,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("network error: {0}")]
    Network(String),
}

impl LlmError {
    /// Transient errors are worth retrying; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Network(_))
    }
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Vectorize a batch of texts. Output is aligned with the input and
    /// every vector has the same dimension.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One request/response completion round-trip.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

// ============================================================================
// Backoff
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
/// Non-transient failures are surfaced immediately.
pub async fn with_backoff<T, F, Fut>(policy: BackoffPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = match e {
                    LlmError::RateLimited { retry_after_ms } => {
                        Duration::from_millis(retry_after_ms)
                    }
                    _ => policy.base_delay * 2u32.pow(attempt - 1),
                };
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                    "transient provider failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decorator that retries an inner provider's transient failures through
/// [`with_backoff`]. External clients are wired through this so a single
/// rate limit or connection reset does not fail the whole query.
pub struct Retrying<P> {
    inner: P,
    policy: BackoffPolicy,
}

impl<P> Retrying<P> {
    pub fn new(inner: P) -> Self {
        Self::with_policy(inner, BackoffPolicy::default())
    }

    pub fn with_policy(inner: P, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for Retrying<P> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        with_backoff(self.policy, || self.inner.embed(texts)).await
    }
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for Retrying<P> {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        with_backoff(self.policy, || self.inner.complete(system, user)).await
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<P> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.as_ref().embed(texts).await
    }
}

#[async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for std::sync::Arc<P> {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.as_ref().complete(system, user).await
    }
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

pub struct OpenAiClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}{path}", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(error_text));
        }
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.completion_model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });
        let data = self.post("/chat/completions", body).await?;
        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": texts,
        });
        let data = self.post("/embeddings", body).await?;
        let items = data["data"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing data array".to_string()))?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let vector = item["embedding"]
                .as_array()
                .ok_or_else(|| LlmError::InvalidResponse("missing embedding".to_string()))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            out.push(vector);
        }
        if out.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                out.len()
            )));
        }
        Ok(out)
    }
}

// ============================================================================
// Deterministic local providers and test doubles
// ============================================================================

const TOKEN_HASH_DIM: usize = 64;

/// Token-hash embedder: each lowercased alphanumeric token is hashed into
/// one of 64 buckets and the vector is L2-normalized. Deterministic and
/// local, so lexical overlap translates to cosine similarity without any
/// network call. Used as the always-available fallback when no embedding
/// service is configured, and as the test double.
#[derive(Debug, Default)]
pub struct TokenHashEmbedder;

impl TokenHashEmbedder {
    pub fn embed_one(text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut v = vec![0.0f32; TOKEN_HASH_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % TOKEN_HASH_DIM] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for TokenHashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Scripted completion double: returns canned responses in order and
/// records every prompt it saw.
pub struct MockCompletion {
    responses: Vec<Result<String, LlmError>>,
    cursor: AtomicUsize,
    prompts: parking_lot::Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
            prompts: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(user.to_string());
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(i) {
            Some(r) => r.clone(),
            None => Err(LlmError::Api("mock exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn token_hash_embedder_is_deterministic_and_normalized() {
        let a = TokenHashEmbedder::embed_one("payment of invoices");
        let b = TokenHashEmbedder::embed_one("payment of invoices");
        assert_eq!(a, b);
        assert_relative_eq!(cosine(&a, &a), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn lexical_overlap_scores_higher() {
        let q = TokenHashEmbedder::embed_one("payment terms");
        let on_topic = TokenHashEmbedder::embed_one("payment of all invoices is due in thirty days");
        let off_topic = TokenHashEmbedder::embed_one("the supplier maintains liability insurance");
        assert!(cosine(&q, &on_topic) > cosine(&q, &off_topic));
    }

    #[tokio::test]
    async fn backoff_retries_transient_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        let out = with_backoff(policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Network("reset".to_string()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backoff_does_not_retry_non_transient() {
        let attempts = AtomicUsize::new(0);
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        let out: Result<u32, _> = with_backoff(policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Api("bad request".to_string())) }
        })
        .await;
        assert!(matches!(out, Err(LlmError::Api(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrying_provider_recovers_from_transient_failure() {
        let provider = Retrying::with_policy(
            MockCompletion::new(vec![
                Err(LlmError::Network("connection reset".to_string())),
                Ok("recovered".to_string()),
            ]),
            BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
        );
        let out = provider.complete("sys", "question").await.unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(provider.inner().calls(), 2);
    }

    #[tokio::test]
    async fn retrying_provider_surfaces_non_transient_immediately() {
        let provider = Retrying::with_policy(
            MockCompletion::new(vec![
                Err(LlmError::Api("bad request".to_string())),
                Ok("never reached".to_string()),
            ]),
            BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
        );
        let out = provider.complete("sys", "question").await;
        assert!(matches!(out, Err(LlmError::Api(_))));
        assert_eq!(provider.inner().calls(), 1);
    }

    #[tokio::test]
    async fn backoff_gives_up_after_max_attempts() {
        let policy = BackoffPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
        };
        let out: Result<u32, _> = with_backoff(policy, || async {
            Err(LlmError::Network("down".to_string()))
        })
        .await;
        assert!(matches!(out, Err(LlmError::Network(_))));
    }
}
