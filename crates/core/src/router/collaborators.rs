//! Outside collaborators the router consults: a chat model for utterances no
//! rule claims, and a resolver that names the function for a classified intent.

use jarvis_llm::provider::{CompletionRequest, LlmError, LlmProvider};
use std::collections::HashMap;
use std::sync::Arc;

use super::arguments;
use crate::registry::FunctionRegistry;
use crate::types::{Args, FunctionDescriptor};

const CHAT_SYSTEM_PROMPT: &str = "You are Jarvis, an in-car voice assistant. \
    Answer conversationally and briefly, in the language the driver used. \
    Never claim to have changed a vehicle setting; only registered functions can do that.";

const RESOLVER_SYSTEM_PROMPT: &str = "You map in-car assistant requests to function names. \
    Reply with ONLY one function name copied exactly from the list, or NONE if nothing fits.";

pub const OFFLINE_CHAT_REPLY: &str =
    "Chat is unavailable: no language model is configured (set JARVIS_LLM_MODEL).";

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator panicked: {0}")]
    Panicked(String),
}

/// Produces a free-text reply when no rule matched.
#[async_trait::async_trait]
pub trait ChatFallback: Send + Sync {
    async fn generate(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// Turns a classified intent into a function name and its arguments.
#[async_trait::async_trait]
pub trait FunctionResolver: Send + Sync {
    async fn extract_function_name(&self, intent: &str, text: &str) -> Result<Option<String>, CollaboratorError>;

    async fn extract_arguments(&self, descriptor: &FunctionDescriptor, text: &str) -> Result<Args, CollaboratorError> {
        Ok(arguments::extract(descriptor, text))
    }
}

// ── Chat ────────────────────────────────────────────────────────

pub struct LlmChatFallback {
    provider: Arc<dyn LlmProvider>,
}

impl LlmChatFallback {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl ChatFallback for LlmChatFallback {
    async fn generate(&self, text: &str) -> Result<String, CollaboratorError> {
        let request = CompletionRequest::single_turn(CHAT_SYSTEM_PROMPT, text, 512, 0.7);
        let response = self.provider.complete(request).await?;
        Ok(response.content)
    }
}

/// Fixed notice used when no model is configured.
#[derive(Debug, Default)]
pub struct OfflineChat;

#[async_trait::async_trait]
impl ChatFallback for OfflineChat {
    async fn generate(&self, _text: &str) -> Result<String, CollaboratorError> {
        Ok(OFFLINE_CHAT_REPLY.to_string())
    }
}

// ── Resolvers ───────────────────────────────────────────────────

/// Static intent → function table. Unmapped intents resolve to `None`,
/// which lets the router fall back to catalogue search.
#[derive(Debug, Default, Clone)]
pub struct IntentTableResolver {
    table: HashMap<String, String>,
}

impl IntentTableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, intent: impl Into<String>, function: impl Into<String>) -> Self {
        self.table.insert(intent.into(), function.into());
        self
    }

    /// Mapping for the intents in the shipped `config/rules.json`.
    pub fn vehicle_defaults() -> Self {
        Self::new()
            .with("system_battery", "battery_module.get_battery_status")
            .with("system_volume", "media_module.adjust_volume")
            .with("system_drive_mode", "driving_module.set_driving_mode")
            .with("system_navigation", "navigation_module.set_destination")
            .with("system_charging", "navigation_module.find_charging_stations")
            .with("weather_query", "info_module.weather.weather_search")
    }
}

#[async_trait::async_trait]
impl FunctionResolver for IntentTableResolver {
    async fn extract_function_name(&self, intent: &str, _text: &str) -> Result<Option<String>, CollaboratorError> {
        Ok(self.table.get(intent).cloned())
    }
}

/// Asks a (lite) model to pick one function from the catalogue.
pub struct LlmFunctionResolver {
    provider: Arc<dyn LlmProvider>,
    catalogue: String,
}

impl LlmFunctionResolver {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: &FunctionRegistry) -> Self {
        Self { provider, catalogue: registry.describe() }
    }
}

#[async_trait::async_trait]
impl FunctionResolver for LlmFunctionResolver {
    async fn extract_function_name(&self, intent: &str, text: &str) -> Result<Option<String>, CollaboratorError> {
        let user = format!(
            "Intent: {intent}\n\nFunctions:\n{}\n\nRequest:\n{text}\n\nFunction name?",
            self.catalogue
        );
        let request = CompletionRequest::single_turn(RESOLVER_SYSTEM_PROMPT, user, 32, 0.0);
        let response = self.provider.complete(request).await?;
        let name = parse_function_name(&response.content);
        tracing::debug!(intent, raw = %response.content.trim(), resolved = ?name, "function name extracted");
        Ok(name)
    }
}

/// First line of the reply without fences, quotes, list markers or a trailing
/// `()`. `NONE` and empty replies mean no function.
pub fn parse_function_name(raw: &str) -> Option<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;
    let name = line
        .trim_start_matches(['-', '*', ' '])
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '.' | ' '))
        .trim_end_matches("()");
    if name.is_empty() || name.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityHost;
    use crate::registry::Catalogue;
    use jarvis_llm::provider::MockProvider;

    #[test]
    fn parses_model_replies() {
        assert_eq!(parse_function_name("media_module.adjust_volume").as_deref(), Some("media_module.adjust_volume"));
        assert_eq!(parse_function_name("```\n`adjust_volume()`\n```").as_deref(), Some("adjust_volume"));
        assert_eq!(parse_function_name("- \"battery_module.get_battery_status\".").as_deref(), Some("battery_module.get_battery_status"));
        assert_eq!(parse_function_name("NONE"), None);
        assert_eq!(parse_function_name("  \n "), None);
    }

    #[tokio::test]
    async fn llm_chat_returns_content() {
        let provider = Arc::new(MockProvider::new("你好，我是 Jarvis"));
        let chat = LlmChatFallback::new(provider.clone());
        assert_eq!(chat.generate("你好").await.unwrap(), "你好，我是 Jarvis");
        assert_eq!(provider.requests()[0].messages[1].content, "你好");
    }

    #[tokio::test]
    async fn llm_chat_error_propagates() {
        let chat = LlmChatFallback::new(Arc::new(MockProvider::failing("boom")));
        assert!(matches!(chat.generate("hi").await, Err(CollaboratorError::Llm(_))));
    }

    #[tokio::test]
    async fn llm_resolver_prompts_with_catalogue() {
        let catalogue = Catalogue::from_json(
            r#"{"modules": [{"module_name": "media_module", "module_path": "builtin://media_module",
                "functions": [{"function_name": "adjust_volume", "parameters": [{"name": "level", "type": "int"}]}]}]}"#,
        )
        .unwrap();
        let registry = FunctionRegistry::new(catalogue, CapabilityHost::new());
        let provider = Arc::new(MockProvider::new("media_module.adjust_volume"));
        let resolver = LlmFunctionResolver::new(provider.clone(), &registry);

        let name = resolver.extract_function_name("system_volume", "音量调到12").await.unwrap();
        assert_eq!(name.as_deref(), Some("media_module.adjust_volume"));
        let prompt = &provider.requests()[0].messages[1].content;
        assert!(prompt.contains("media_module.adjust_volume(level: int)"));
        assert!(prompt.contains("音量调到12"));

        let args = resolver.extract_arguments(registry.find_by_name("adjust_volume").unwrap(), "音量调到12").await.unwrap();
        assert_eq!(args["level"], 12);
    }

    #[tokio::test]
    async fn table_resolver_maps_known_intents() {
        let resolver = IntentTableResolver::vehicle_defaults();
        assert_eq!(
            resolver.extract_function_name("system_volume", "").await.unwrap().as_deref(),
            Some("media_module.adjust_volume")
        );
        assert_eq!(resolver.extract_function_name("daily_chat", "").await.unwrap(), None);
    }
}
