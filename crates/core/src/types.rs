use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Argument map passed to a capability, keyed by parameter name.
pub type Args = serde_json::Map<String, serde_json::Value>;

// ── Policy types ────────────────────────────────────────────────

/// Risk category of a classified request ("L1" most sensitive .. "L5").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskTier(String);

impl RiskTier {
    pub fn new(tier: impl Into<String>) -> Self {
        Self(tier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RiskTier {
    fn default() -> Self {
        Self::new("L5")
    }
}

impl From<&str> for RiskTier {
    fn from(tier: &str) -> Self {
        Self::new(tier)
    }
}

impl From<String> for RiskTier {
    fn from(tier: String) -> Self {
        Self(tier)
    }
}

impl Borrow<str> for RiskTier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy outcome for a risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    #[serde(rename = "FORBIDDEN", alias = "HIGH_RISK_FORBIDDEN")]
    Forbidden,
    #[serde(rename = "REQUIRES_CONFIRMATION")]
    RequiresConfirmation,
    #[serde(rename = "ALLOW", alias = "DIRECT_ALLOW")]
    Allow,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Forbidden => "FORBIDDEN",
            Disposition::RequiresConfirmation => "REQUIRES_CONFIRMATION",
            Disposition::Allow => "ALLOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FORBIDDEN" | "HIGH_RISK_FORBIDDEN" => Some(Disposition::Forbidden),
            "REQUIRES_CONFIRMATION" => Some(Disposition::RequiresConfirmation),
            "ALLOW" | "DIRECT_ALLOW" => Some(Disposition::Allow),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Classification ──────────────────────────────────────────────

/// Rule family a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    /// Free-form intents, ranked by their declared priority.
    Intent,
    /// System functions, fixed priority 3, labelled `system_<type>`.
    System,
    /// Dialogue management, fixed priority 2, labelled `dialogue_<type>`.
    Dialogue,
}

impl RuleFamily {
    /// Document key of the family.
    pub fn key(&self) -> &'static str {
        match self {
            RuleFamily::Intent => "intent_classifier",
            RuleFamily::System => "system_function",
            RuleFamily::Dialogue => "dialogue_management",
        }
    }
}

/// Best matching rule for an utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: String,
    pub tier: RiskTier,
    pub priority: u32,
    pub family: RuleFamily,
    /// `type` tag of a free-form rule or `action` of a system/dialogue rule.
    pub tag: Option<String>,
}

// ── Catalogue types ─────────────────────────────────────────────

/// Declared parameter type. Unrecognized tags are kept and skip type checking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Tuple,
    None,
    Other(String),
}

impl ParamType {
    pub fn as_str(&self) -> &str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Dict => "dict",
            ParamType::Tuple => "tuple",
            ParamType::None => "None",
            ParamType::Other(tag) => tag,
        }
    }
}

impl From<String> for ParamType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "str" | "string" => ParamType::Str,
            "int" | "integer" => ParamType::Int,
            "float" | "number" => ParamType::Float,
            "bool" | "boolean" => ParamType::Bool,
            "list" | "array" => ParamType::List,
            "dict" | "object" => ParamType::Dict,
            "tuple" => ParamType::Tuple,
            "None" | "none" | "null" => ParamType::None,
            _ => ParamType::Other(tag),
        }
    }
}

impl From<&str> for ParamType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<ParamType> for String {
    fn from(ty: ParamType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn yes() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Optional parameters may be left out of the argument map.
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub required: bool,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: impl Into<ParamType>) -> Self {
        Self { name: name.into(), param_type: param_type.into(), required: true }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// One registered capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDescriptor {
    pub module_name: String,
    pub module_path: String,
    /// May contain one dot (`object.method`) for callables on a sub-object.
    pub function_name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    /// `module_name.function_name`.
    pub search_key: String,
}

impl FunctionDescriptor {
    pub fn new(
        module_name: impl Into<String>,
        module_path: impl Into<String>,
        function_name: impl Into<String>,
        parameters: Vec<ParameterSpec>,
    ) -> Self {
        let module_name = module_name.into();
        let function_name = function_name.into();
        Self {
            search_key: format!("{module_name}.{function_name}"),
            module_name,
            module_path: module_path.into(),
            function_name,
            description: None,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Fuzzy search hit.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub descriptor: &'a FunctionDescriptor,
    /// 0..=100. Only meaningful relative to other scores from the same backend.
    pub score: f64,
}
