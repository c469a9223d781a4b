use regex::RegexSet;

use super::{Matcher, RuleError, RulePattern, RuleSet};
use crate::types::Classification;

/// Matches utterances against every loaded rule and keeps the best one.
///
/// All regex rules are folded into a single [`RegexSet`] so one pass over the
/// text yields every firing pattern. Length conditions are checked separately,
/// and a rule carrying both fires on either.
/// The winner is the firing rule with the lowest priority number, declaration
/// order breaking ties.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    rules: Vec<RulePattern>,
    set: RegexSet,
    /// `set` index → `rules` index.
    set_to_rule: Vec<usize>,
    /// (`rules` index, threshold) for length conditions.
    length_rules: Vec<(usize, usize)>,
}

impl PatternClassifier {
    pub fn new(rules: Vec<RulePattern>) -> Result<Self, RuleError> {
        let mut patterns = Vec::new();
        let mut set_to_rule = Vec::new();
        let mut length_rules = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            match &rule.matcher {
                Matcher::Pattern(re) => {
                    patterns.push(re.as_str().to_string());
                    set_to_rule.push(idx);
                }
                Matcher::LengthAbove(n) => length_rules.push((idx, *n)),
                Matcher::Either(re, n) => {
                    patterns.push(re.as_str().to_string());
                    set_to_rule.push(idx);
                    length_rules.push((idx, *n));
                }
            }
        }
        let set = RegexSet::new(&patterns).map_err(RuleError::PatternSet)?;
        Ok(Self { rules, set, set_to_rule, length_rules })
    }

    pub fn from_rule_set(rules: &RuleSet) -> Result<Self, RuleError> {
        Self::new(rules.rules.clone())
    }

    pub fn rules(&self) -> &[RulePattern] {
        &self.rules
    }

    /// Best firing rule, or `None` when nothing fired.
    pub fn classify(&self, text: &str) -> Option<Classification> {
        let best = self
            .firing(text)
            .into_iter()
            .min_by_key(|&idx| (self.rules[idx].priority, idx))?;
        let rule = &self.rules[best];
        Some(Classification {
            intent: rule.intent.clone(),
            tier: rule.tier.clone(),
            priority: rule.priority,
            family: rule.family,
            tag: rule.tag.clone(),
        })
    }

    /// Every firing rule, best first.
    pub fn matches(&self, text: &str) -> Vec<&RulePattern> {
        let mut fired = self.firing(text);
        fired.sort_by_key(|&idx| (self.rules[idx].priority, idx));
        fired.into_iter().map(|idx| &self.rules[idx]).collect()
    }

    fn firing(&self, text: &str) -> Vec<usize> {
        let chars = text.chars().count();
        let mut fired: Vec<usize> = self
            .set
            .matches(text)
            .into_iter()
            .map(|i| self.set_to_rule[i])
            .chain(self.length_rules.iter().filter(|(_, n)| chars > *n).map(|(idx, _)| *idx))
            .collect();
        fired.sort_unstable();
        fired.dedup();
        fired
    }
}
