//! Request routing: classify, gate, resolve, dispatch, reply.

pub mod arguments;
pub mod collaborators;
pub mod response;

pub use collaborators::{
    ChatFallback, CollaboratorError, FunctionResolver, IntentTableResolver, LlmChatFallback, LlmFunctionResolver,
    OfflineChat,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::capability::{CapabilityHost, panic_message};
use crate::config::JarvisCfg;
use crate::registry::{CatalogueError, DispatchError, FunctionRegistry};
use crate::risk::RiskGate;
use crate::rules::classifier::PatternClassifier;
use crate::rules::{Explanations, RuleError, RuleSet};
use crate::types::{Args, Classification, Disposition, FunctionDescriptor, RiskTier};

pub const DEFAULT_ROUTE_THRESHOLD: f64 = 30.0;
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RouterInitError {
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
}

/// The two outside services a router talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chat: Arc<dyn ChatFallback>,
    pub resolver: Arc<dyn FunctionResolver>,
}

impl Collaborators {
    pub fn new(chat: Arc<dyn ChatFallback>, resolver: Arc<dyn FunctionResolver>) -> Self {
        Self { chat, resolver }
    }

    /// No model: fixed chat notice and the built-in intent table.
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineChat), Arc::new(IntentTableResolver::vehicle_defaults()))
    }
}

/// Routes one utterance to a reply.
///
/// Shares the risk gate and registry by `Arc`, so a router can be cloned into
/// tasks and every clone sees the same risk table and call statistics.
#[derive(Clone)]
pub struct Router {
    classifier: Arc<PatternClassifier>,
    gate: Arc<RiskGate>,
    registry: Arc<FunctionRegistry>,
    chat: Arc<dyn ChatFallback>,
    resolver: Arc<dyn FunctionResolver>,
    explanations: Arc<Explanations>,
    route_threshold: f64,
    collaborator_timeout: Duration,
}

impl Router {
    pub fn new(rules: RuleSet, registry: Arc<FunctionRegistry>, collaborators: Collaborators) -> Result<Self, RuleError> {
        let classifier = PatternClassifier::from_rule_set(&rules)?;
        Ok(Self {
            classifier: Arc::new(classifier),
            gate: Arc::new(RiskGate::new(rules.risk_table)),
            registry,
            chat: collaborators.chat,
            resolver: collaborators.resolver,
            explanations: Arc::new(rules.explanations),
            route_threshold: DEFAULT_ROUTE_THRESHOLD,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        })
    }

    /// Load both documents named in `cfg` and wire a router over `host`.
    pub fn from_config(cfg: &JarvisCfg, host: CapabilityHost, collaborators: Collaborators) -> Result<Self, RouterInitError> {
        let registry = FunctionRegistry::from_config(cfg, host)?;
        Self::from_config_with_registry(cfg, Arc::new(registry), collaborators)
    }

    /// [`from_config`](Self::from_config) over a registry the caller already
    /// built, e.g. one with a database pool attached.
    pub fn from_config_with_registry(
        cfg: &JarvisCfg,
        registry: Arc<FunctionRegistry>,
        collaborators: Collaborators,
    ) -> Result<Self, RouterInitError> {
        let rules = RuleSet::load(&cfg.rules_path)?;
        let router = Self::new(rules, registry, collaborators)?
            .with_route_threshold(cfg.route_search_threshold)
            .with_collaborator_timeout(Duration::from_millis(cfg.collaborator_timeout_ms));
        tracing::info!(
            rules = router.classifier.rules().len(),
            functions = router.registry.len(),
            "router ready"
        );
        Ok(router)
    }

    pub fn with_route_threshold(mut self, threshold: f64) -> Self {
        self.route_threshold = threshold;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    pub fn risk_gate(&self) -> &RiskGate {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Merge tier dispositions into the shared gate.
    pub fn update_risk_mapping<I, T>(&self, entries: I)
    where
        I: IntoIterator<Item = (T, Disposition)>,
        T: Into<RiskTier>,
    {
        self.gate.update_mapping(entries);
    }

    /// Route one request. `None` stands for input that is not text.
    ///
    /// Never fails: every outcome, including collaborator and capability
    /// errors, is rendered into the reply string.
    pub async fn process_request<'a>(&self, input: impl Into<Option<&'a str>>) -> String {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("process_request", %request_id);
        let input = input.into();
        self.route(input).instrument(span).await
    }

    async fn route(&self, input: Option<&str>) -> String {
        let Some(text) = input else {
            return response::INPUT_NOT_TEXT.to_string();
        };
        if text.trim().is_empty() {
            return response::EMPTY_INPUT.to_string();
        }

        let Some(class) = self.classifier.classify(text) else {
            tracing::debug!("no rule matched, using chat");
            return match self.chat_reply(text).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(error = %e, "chat fallback failed");
                    response::chat_failed(&e)
                }
            };
        };

        let disposition = self.gate.resolve(class.tier.as_str());
        tracing::info!(
            intent = %class.intent,
            tier = %class.tier,
            priority = class.priority,
            disposition = %disposition,
            "classified"
        );
        match disposition {
            Disposition::Forbidden => response::blocked(&self.explanations.forbidden),
            Disposition::RequiresConfirmation => response::confirmation(&self.explanations.confirmation),
            Disposition::Allow => self.call_function(&class, text).await,
        }
    }

    async fn call_function(&self, class: &Classification, text: &str) -> String {
        let Some(name) = self.function_name(class, text).await else {
            let reply = self
                .chat_reply(text)
                .await
                .unwrap_or_else(|_| response::OFFLINE_UNKNOWN_FUNCTION.to_string());
            return response::unknown_function(&class.intent, &reply);
        };

        let Some(descriptor) = self.registry.find_by_name(&name) else {
            return response::failure(&name, &DispatchError::FunctionNotFound(name.clone()));
        };

        let args = self.arguments(descriptor, text).await;
        match self.registry.dispatch(descriptor, args).await {
            Ok(value) => response::success(&descriptor.search_key, &value),
            Err(e) => response::failure(&descriptor.search_key, &e),
        }
    }

    async fn chat_reply(&self, text: &str) -> Result<String, CollaboratorError> {
        let chat = Arc::clone(&self.chat);
        let text = text.to_string();
        self.bounded(async move { chat.generate(&text).await }).await
    }

    /// Resolver first, then catalogue search over the raw utterance.
    async fn function_name(&self, class: &Classification, text: &str) -> Option<String> {
        let resolver = Arc::clone(&self.resolver);
        let (intent, owned_text) = (class.intent.clone(), text.to_string());
        let extracted = self
            .bounded(async move { resolver.extract_function_name(&intent, &owned_text).await })
            .await;
        match extracted {
            Ok(Some(name)) if !name.trim().is_empty() => return Some(name.trim().to_string()),
            Ok(_) => {}
            Err(e) => tracing::warn!(intent = %class.intent, error = %e, "function name extraction failed"),
        }
        self.registry
            .resolve_query(text, self.route_threshold)
            .map(|d| d.search_key.clone())
    }

    async fn arguments(&self, descriptor: &FunctionDescriptor, text: &str) -> Args {
        let resolver = Arc::clone(&self.resolver);
        let (owned, owned_text) = (descriptor.clone(), text.to_string());
        let extracted = self
            .bounded(async move { resolver.extract_arguments(&owned, &owned_text).await })
            .await;
        match extracted {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(function = %descriptor.search_key, error = %e, "argument extraction failed, using heuristics");
                arguments::extract(descriptor, text)
            }
        }
    }

    /// Run a collaborator call on its own task under the collaborator timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, CollaboratorError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CollaboratorError>> + Send + 'static,
    {
        let mut task = tokio::spawn(fut.in_current_span());
        match tokio::time::timeout(self.collaborator_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(CollaboratorError::Panicked(panic_message(join))),
            Err(_) => {
                task.abort();
                Err(CollaboratorError::Unavailable(format!("no reply within {:?}", self.collaborator_timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CallError, StaticModule, i64_arg};
    use crate::registry::Catalogue;
    use crate::types::ParameterSpec;
    use jarvis_llm::provider::MockProvider;
    use serde_json::json;

    const RULES: &str = r#"{
        "intent_classifier": {
            "volume": [{"pattern": "音量", "priority": 5, "risk_level": "L4"}],
            "unlock": [{"pattern": "解锁", "priority": 1, "risk_level": "L1"}],
            "trunk": [{"pattern": "后备箱", "priority": 1, "risk_level": "L2"}]
        }
    }"#;

    fn router(chat: &str, resolver: IntentTableResolver) -> Router {
        let catalogue = Catalogue::from_descriptors(vec![FunctionDescriptor::new(
            "media_module",
            "builtin://media_module",
            "adjust_volume",
            vec![ParameterSpec::new("level", "int")],
        )]);
        let mut host = CapabilityHost::new();
        host.register("media_module", || {
            StaticModule::new("media_module").with_function("adjust_volume", |args: Args| async move {
                let level = i64_arg(&args, "level")?;
                Ok::<_, CallError>(json!({"level": level}))
            })
        });
        let registry = FunctionRegistry::new(catalogue, host);
        let collaborators = Collaborators::new(Arc::new(LlmChatFallback::new(Arc::new(MockProvider::new(chat)))), Arc::new(resolver));
        Router::new(RuleSet::from_json(RULES).unwrap(), Arc::new(registry), collaborators).unwrap()
    }

    #[tokio::test]
    async fn input_checks() {
        let r = router("hi", IntentTableResolver::new());
        assert_eq!(r.process_request(None).await, response::INPUT_NOT_TEXT);
        assert_eq!(r.process_request("  \t").await, response::EMPTY_INPUT);
    }

    #[tokio::test]
    async fn gate_outcomes() {
        let r = router("hi", IntentTableResolver::new());
        assert!(r.process_request("解锁车门").await.starts_with("Operation blocked: "));
        assert!(r.process_request("打开后备箱").await.starts_with("Confirmation required: "));
    }

    #[tokio::test]
    async fn allowed_request_dispatches() {
        let r = router("hi", IntentTableResolver::new().with("volume", "media_module.adjust_volume"));
        assert_eq!(
            r.process_request("音量调到12").await,
            r#"Function 'media_module.adjust_volume' executed successfully. Result: {"level":12}"#
        );
        assert_eq!(r.registry().stats().get("media_module.adjust_volume").unwrap().call_count, 1);
    }

    #[tokio::test]
    async fn unmatched_goes_to_chat() {
        let r = router("今天心情不错", IntentTableResolver::new());
        assert_eq!(r.process_request("随便聊聊").await, "今天心情不错");
    }

    #[tokio::test]
    async fn chat_error_is_reported() {
        let catalogue = Catalogue::from_descriptors(Vec::<FunctionDescriptor>::new());
        let registry = FunctionRegistry::new(catalogue, CapabilityHost::new());
        let collaborators = Collaborators::new(
            Arc::new(LlmChatFallback::new(Arc::new(MockProvider::failing("quota")))),
            Arc::new(IntentTableResolver::new()),
        );
        let r = Router::new(RuleSet::from_json(RULES).unwrap(), Arc::new(registry), collaborators).unwrap();
        let reply = r.process_request("随便聊聊").await;
        assert!(reply.starts_with("Error: LLM processing failed: "), "{reply}");
        assert!(reply.contains("quota"));
    }

    struct SlowChat;

    #[async_trait::async_trait]
    impl ChatFallback for SlowChat {
        async fn generate(&self, _text: &str) -> Result<String, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    struct PanickingChat;

    #[async_trait::async_trait]
    impl ChatFallback for PanickingChat {
        async fn generate(&self, _text: &str) -> Result<String, CollaboratorError> {
            panic!("chat backend crashed")
        }
    }

    /// Fails every extraction, so routing falls back to the catalogue.
    struct BrokenResolver;

    #[async_trait::async_trait]
    impl FunctionResolver for BrokenResolver {
        async fn extract_function_name(&self, _intent: &str, _text: &str) -> Result<Option<String>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("resolver offline".into()))
        }

        async fn extract_arguments(&self, _d: &FunctionDescriptor, _text: &str) -> Result<Args, CollaboratorError> {
            Err(CollaboratorError::Unavailable("resolver offline".into()))
        }
    }

    fn with_collaborators(chat: impl ChatFallback + 'static, resolver: impl FunctionResolver + 'static) -> Router {
        let base = router("unused", IntentTableResolver::new());
        Router::new(
            RuleSet::from_json(RULES).unwrap(),
            Arc::clone(base.registry()),
            Collaborators::new(Arc::new(chat), Arc::new(resolver)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn slow_chat_times_out() {
        let r = with_collaborators(SlowChat, IntentTableResolver::new())
            .with_collaborator_timeout(Duration::from_millis(50));
        let reply = r.process_request("随便聊聊").await;
        assert!(reply.starts_with("Error: LLM processing failed: collaborator unavailable: "), "{reply}");
    }

    #[tokio::test]
    async fn panicking_chat_is_reported() {
        let r = with_collaborators(PanickingChat, IntentTableResolver::new());
        let reply = r.process_request("随便聊聊").await;
        assert!(reply.starts_with("Error: LLM processing failed: collaborator panicked: "), "{reply}");
        assert!(reply.contains("chat backend crashed"));
    }

    #[tokio::test]
    async fn resolver_errors_fall_back_to_catalogue() {
        let r = with_collaborators(OfflineChat, BrokenResolver);
        assert_eq!(
            r.process_request("音量调到12").await,
            r#"Function 'media_module.adjust_volume' executed successfully. Result: {"level":12}"#
        );
    }

    #[tokio::test]
    async fn panicking_capability_becomes_failure_reply() {
        let catalogue = Catalogue::from_descriptors(vec![FunctionDescriptor::new("m", "builtin://m", "boom", vec![])]);
        let mut host = CapabilityHost::new();
        host.register("m", || {
            StaticModule::new("m").with_function("boom", |_args: Args| async move {
                let slots: Vec<i64> = Vec::new();
                Ok::<_, CallError>(json!(slots[3]))
            })
        });
        let rules = r#"{"intent_classifier": {"go": [{"pattern": "go", "priority": 1, "risk_level": "L4"}]}}"#;
        let r = Router::new(
            RuleSet::from_json(rules).unwrap(),
            Arc::new(FunctionRegistry::new(catalogue, host)),
            Collaborators::new(Arc::new(OfflineChat), Arc::new(IntentTableResolver::new().with("go", "m.boom"))),
        )
        .unwrap();

        let reply = tokio::spawn(async move { r.process_request("go").await }).await.unwrap();
        assert!(reply.starts_with("Function 'm.boom' execution failed. Error: 'm.boom' panicked: "), "{reply}");
        assert!(reply.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn update_mapping_visible_to_clones() {
        let r = router("hi", IntentTableResolver::new());
        let clone = r.clone();
        r.update_risk_mapping([("L1", Disposition::Allow)]);
        assert_eq!(clone.risk_gate().resolve("L1"), Disposition::Allow);
        assert!(!clone.process_request("解锁").await.starts_with("Operation blocked"));
    }
}
