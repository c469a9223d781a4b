//! Rule document loading and compilation.
//!
//! The document is JSON. Object key order inside each family is the
//! declaration order used to break priority ties, so families are read with an
//! order-preserving visitor instead of a `HashMap`.

pub mod classifier;

pub use classifier::PatternClassifier;

use regex::Regex;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::LazyLock;

use crate::types::{Disposition, RiskTier, RuleFamily};

pub const SYSTEM_PRIORITY: u32 = 3;
pub const DIALOGUE_PRIORITY: u32 = 2;
const DEFAULT_PRIORITY: u32 = 10;

static LENGTH_CONDITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*length\s*>\s*(\d+)\s*$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("cannot read rule document {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("malformed rule document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{family}.{name}[{index}]: invalid pattern: {source}")]
    InvalidPattern { family: &'static str, name: String, index: usize, source: regex::Error },
    #[error("{family}.{name}[{index}]: unsupported condition {condition:?}")]
    InvalidCondition { family: &'static str, name: String, index: usize, condition: String },
    #[error("{family}.{name}[{index}]: rule has neither pattern nor condition")]
    MissingMatcher { family: &'static str, name: String, index: usize },
    #[error("pattern set too large: {0}")]
    PatternSet(regex::Error),
}

// ── Document ────────────────────────────────────────────────────

/// Ordered `name → [rule]` map.
#[derive(Debug, Clone)]
pub struct Families<T>(pub Vec<(String, Vec<T>)>);

impl<T> Default for Families<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Families<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Families<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of rule lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, rules)) = access.next_entry::<String, Vec<T>>()? {
                    entries.push((name, rules));
                }
                Ok(Families(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

fn default_rule_type() -> String {
    "regular".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentRuleSpec {
    pub pattern: Option<String>,
    pub condition: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub risk_level: RiskTier,
    #[serde(rename = "type", default = "default_rule_type")]
    pub rule_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggedRuleSpec {
    pub pattern: Option<String>,
    #[serde(default)]
    pub risk_level: RiskTier,
    pub action: Option<String>,
}

/// User-facing explanation per disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Explanations {
    #[serde(rename = "FORBIDDEN", alias = "HIGH_RISK_FORBIDDEN")]
    pub forbidden: String,
    #[serde(rename = "REQUIRES_CONFIRMATION")]
    pub confirmation: String,
    #[serde(rename = "ALLOW", alias = "DIRECT_ALLOW")]
    pub allow: String,
}

impl Default for Explanations {
    fn default() -> Self {
        Self {
            forbidden: "This operation is classified as high-risk and has been blocked for security reasons.".into(),
            confirmation: "This operation requires additional confirmation due to security policies.".into(),
            allow: "This operation is approved and can be executed directly.".into(),
        }
    }
}

impl Explanations {
    pub fn for_disposition(&self, disposition: Disposition) -> &str {
        match disposition {
            Disposition::Forbidden => &self.forbidden,
            Disposition::RequiresConfirmation => &self.confirmation,
            Disposition::Allow => &self.allow,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub intent_classifier: Families<IntentRuleSpec>,
    #[serde(default)]
    pub system_function: Families<TaggedRuleSpec>,
    #[serde(default)]
    pub dialogue_management: Families<TaggedRuleSpec>,
    #[serde(default)]
    pub risk_levels: HashMap<RiskTier, Disposition>,
    #[serde(default)]
    pub explanations: Explanations,
}

/// Shipped tier table: L1 forbidden, L2/L3 need confirmation, L4/L5 allowed.
pub fn default_risk_table() -> HashMap<RiskTier, Disposition> {
    [
        ("L1", Disposition::Forbidden),
        ("L2", Disposition::RequiresConfirmation),
        ("L3", Disposition::RequiresConfirmation),
        ("L4", Disposition::Allow),
        ("L5", Disposition::Allow),
    ]
    .into_iter()
    .map(|(tier, d)| (RiskTier::from(tier), d))
    .collect()
}

// ── Compiled rules ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Matcher {
    Pattern(Regex),
    /// Fires when the text has more than N characters.
    LengthAbove(usize),
    /// Pattern and length condition on one rule: either one fires it.
    Either(Regex, usize),
}

impl Matcher {
    pub fn fires(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::LengthAbove(n) => text.chars().count() > *n,
            Matcher::Either(re, n) => re.is_match(text) || text.chars().count() > *n,
        }
    }
}

/// One compiled classification rule.
#[derive(Debug, Clone)]
pub struct RulePattern {
    pub family: RuleFamily,
    /// Final intent label (`system_`/`dialogue_` prefix already applied).
    pub intent: String,
    pub matcher: Matcher,
    pub priority: u32,
    pub tier: RiskTier,
    pub tag: Option<String>,
}

impl RulePattern {
    pub fn fires(&self, text: &str) -> bool {
        self.matcher.fires(text)
    }
}

/// Compiled rule document: rules in declaration order plus the policy tables.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<RulePattern>,
    /// Tier overrides from the document, already merged over the defaults.
    pub risk_table: HashMap<RiskTier, Disposition>,
    pub explanations: Explanations,
}

impl RuleSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| RuleError::Io { path: path.display().to_string(), source })?;
        let set = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), rules = set.rules.len(), "rule document loaded");
        Ok(set)
    }

    pub fn from_json(raw: &str) -> Result<Self, RuleError> {
        let doc: RuleDocument = serde_json::from_str(raw)?;
        Self::compile(doc)
    }

    pub fn compile(doc: RuleDocument) -> Result<Self, RuleError> {
        let mut rules = Vec::new();

        for (name, specs) in doc.intent_classifier.0 {
            for (index, spec) in specs.into_iter().enumerate() {
                let family = RuleFamily::Intent.key();
                let matcher = match (spec.pattern, spec.condition) {
                    (Some(pattern), Some(condition)) => Matcher::Either(
                        compile_regex(family, &name, index, &pattern)?,
                        parse_condition(family, &name, index, &condition)?,
                    ),
                    (Some(pattern), None) => Matcher::Pattern(compile_regex(family, &name, index, &pattern)?),
                    (None, Some(condition)) => Matcher::LengthAbove(parse_condition(family, &name, index, &condition)?),
                    (None, None) => {
                        return Err(RuleError::MissingMatcher { family, name: name.clone(), index });
                    }
                };
                rules.push(RulePattern {
                    family: RuleFamily::Intent,
                    intent: name.clone(),
                    matcher,
                    priority: spec.priority,
                    tier: spec.risk_level,
                    tag: Some(spec.rule_type),
                });
            }
        }

        for (family, specs, prefix, priority) in [
            (RuleFamily::System, doc.system_function.0, "system", SYSTEM_PRIORITY),
            (RuleFamily::Dialogue, doc.dialogue_management.0, "dialogue", DIALOGUE_PRIORITY),
        ] {
            for (name, list) in specs {
                for (index, spec) in list.into_iter().enumerate() {
                    let Some(pattern) = spec.pattern else {
                        return Err(RuleError::MissingMatcher { family: family.key(), name: name.clone(), index });
                    };
                    rules.push(RulePattern {
                        family,
                        intent: format!("{prefix}_{name}"),
                        matcher: Matcher::Pattern(compile_regex(family.key(), &name, index, &pattern)?),
                        priority,
                        tier: spec.risk_level,
                        tag: spec.action,
                    });
                }
            }
        }

        let mut risk_table = default_risk_table();
        risk_table.extend(doc.risk_levels);

        Ok(Self { rules, risk_table, explanations: doc.explanations })
    }
}

fn compile_regex(family: &'static str, name: &str, index: usize, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidPattern { family, name: name.to_string(), index, source })
}

/// Threshold N of a `length > N` condition.
fn parse_condition(family: &'static str, name: &str, index: usize, condition: &str) -> Result<usize, RuleError> {
    LENGTH_CONDITION
        .captures(condition)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| RuleError::InvalidCondition {
            family,
            name: name.to_string(),
            index,
            condition: condition.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_order_is_preserved() {
        let set = RuleSet::from_json(
            r#"{"intent_classifier": {
                "zeta": [{"pattern": "z"}],
                "alpha": [{"pattern": "a"}],
                "mid": [{"pattern": "m"}]
            }}"#,
        )
        .unwrap();
        let names: Vec<&str> = set.rules.iter().map(|r| r.intent.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn intent_defaults_applied() {
        let set = RuleSet::from_json(r#"{"intent_classifier": {"chat": [{"pattern": "hi"}]}}"#).unwrap();
        let rule = &set.rules[0];
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.tier.as_str(), "L5");
        assert_eq!(rule.tag.as_deref(), Some("regular"));
    }

    #[test]
    fn tagged_families_get_prefix_and_fixed_priority() {
        let set = RuleSet::from_json(
            r#"{
                "system_function": {"volume": [{"pattern": "音量", "risk_level": "L4", "action": "adjust"}]},
                "dialogue_management": {"cancel": [{"pattern": "取消"}]}
            }"#,
        )
        .unwrap();
        assert_eq!(set.rules[0].intent, "system_volume");
        assert_eq!(set.rules[0].priority, SYSTEM_PRIORITY);
        assert_eq!(set.rules[0].tag.as_deref(), Some("adjust"));
        assert_eq!(set.rules[1].intent, "dialogue_cancel");
        assert_eq!(set.rules[1].priority, DIALOGUE_PRIORITY);
        assert_eq!(set.rules[1].family, RuleFamily::Dialogue);
    }

    #[test]
    fn length_condition_counts_characters() {
        let set = RuleSet::from_json(
            r#"{"intent_classifier": {"complex": [{"condition": "length > 5", "priority": 20, "risk_level": "L3"}]}}"#,
        )
        .unwrap();
        let rule = &set.rules[0];
        assert!(!rule.fires("你好你好你"));
        assert!(rule.fires("你好你好你好"));
    }

    #[test]
    fn bad_condition_names_location() {
        let err = RuleSet::from_json(r#"{"intent_classifier": {"odd": [{"pattern": "x"}, {"condition": "words < 3"}]}}"#)
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, RuleError::InvalidCondition { index: 1, .. }));
        assert!(msg.contains("intent_classifier.odd[1]"), "{msg}");
    }

    #[test]
    fn bad_regex_rejected() {
        let err = RuleSet::from_json(r#"{"system_function": {"x": [{"pattern": "(unclosed"}]}}"#).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { family: "system_function", .. }));
    }

    #[test]
    fn risk_levels_merge_over_defaults() {
        let set = RuleSet::from_json(r#"{"risk_levels": {"L5": "REQUIRES_CONFIRMATION", "L9": "HIGH_RISK_FORBIDDEN"}}"#)
            .unwrap();
        assert_eq!(set.risk_table.get("L5"), Some(&Disposition::RequiresConfirmation));
        assert_eq!(set.risk_table.get("L9"), Some(&Disposition::Forbidden));
        assert_eq!(set.risk_table.get("L1"), Some(&Disposition::Forbidden));
    }

    #[test]
    fn explanations_partial_override() {
        let set = RuleSet::from_json(r#"{"explanations": {"FORBIDDEN": "Not while driving."}}"#).unwrap();
        assert_eq!(set.explanations.forbidden, "Not while driving.");
        assert_eq!(set.explanations.confirmation, Explanations::default().confirmation);
    }
}
