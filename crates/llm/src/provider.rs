use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Consecutive failures after which a provider is skipped by [`LlmRouter`].
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Single-turn request: one system prompt and one user message.
    pub fn single_turn(system: impl Into<String>, user: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            temperature,
        }
    }
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("all providers exhausted")]
    AllProvidersExhausted,
}

/// Boxed future returned by [`LlmProvider::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;

/// Trait for LLM providers (OpenAI-compatible, Anthropic, local servers).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_>;
}

/// Mock provider for testing.
///
/// Replies with a fixed string, or with the queued replies in order when built
/// with [`MockProvider::sequence`] (the last one repeats). Records every request.
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Vec<Result<String, String>>,
    calls: AtomicU32,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self { replies: vec![Ok(response.into())], ..Self::default() }
    }

    /// A provider whose every call fails with `RequestFailed(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { replies: vec![Err(message.into())], ..Self::default() }
    }

    pub fn sequence<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: responses.into_iter().map(|r| Ok(r.into())).collect(),
            ..Self::default()
        }
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).push(request);
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Ok(String::new()));
        Box::pin(async move {
            match reply {
                Ok(content) => Ok(CompletionResponse { content, input_tokens: 10, output_tokens: 20 }),
                Err(message) => Err(LlmError::RequestFailed(message)),
            }
        })
    }
}

/// Tries providers in priority order with failover.
/// A provider that fails 3 times in a row is skipped. Once every provider is
/// skipped, all counters reset and the next request tries the chain again.
pub struct LlmRouter {
    providers: Vec<Box<dyn LlmProvider>>,
    fail_counts: Vec<AtomicU32>,
}

impl LlmRouter {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        let fail_counts = providers.iter().map(|_| AtomicU32::new(0)).collect();
        Self { providers, fail_counts }
    }

    /// True if at least one provider is available.
    pub fn is_available(&self) -> bool {
        self.fail_counts
            .iter()
            .any(|c| c.load(Ordering::Relaxed) < MAX_CONSECUTIVE_FAILURES)
    }

    async fn complete_with_failover(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if !self.is_available() {
            tracing::info!(providers = self.providers.len(), "all LLM providers tripped, retrying chain");
            for count in &self.fail_counts {
                count.store(0, Ordering::Relaxed);
            }
        }
        for (provider, fails) in self.providers.iter().zip(&self.fail_counts) {
            if fails.load(Ordering::Relaxed) >= MAX_CONSECUTIVE_FAILURES {
                continue;
            }

            match provider.complete(request.clone()).await {
                Ok(response) => {
                    fails.store(0, Ordering::Relaxed);
                    return Ok(response);
                }
                Err(e) => {
                    let fail_count = fails.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        provider = provider.name(),
                        fail_count,
                        error = %e,
                        "LLM provider failed"
                    );
                }
            }
        }

        Err(LlmError::AllProvidersExhausted)
    }
}

impl LlmProvider for LlmRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        Box::pin(self.complete_with_failover(request))
    }
}
