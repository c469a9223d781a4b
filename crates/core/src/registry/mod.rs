//! Function registry: catalogue index, lookup, fuzzy search, validation and dispatch.

pub mod catalogue;
pub mod db;
pub mod derive;
pub mod dispatch;
pub mod similarity;
pub mod stats;
pub mod validate;

pub use catalogue::{Catalogue, CatalogueError};
pub use dispatch::DispatchError;
pub use similarity::{Similarity, SimilarityKind};
pub use stats::{CallRecord, CallStats, FunctionStats};
pub use validate::ValidationError;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use crate::capability::CapabilityHost;
use crate::config::JarvisCfg;
use crate::types::{Args, FunctionDescriptor, MatchResult, ParameterSpec};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 60.0;
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory index over a [`Catalogue`] plus the host that runs its functions.
///
/// Descriptors never change after construction. The host's module cache and
/// the call statistics are the only mutable parts, each behind its own lock.
pub struct FunctionRegistry {
    descriptors: Vec<FunctionDescriptor>,
    by_key: HashMap<String, usize>,
    keywords: Vec<(String, String)>,
    similarity: Box<dyn Similarity>,
    host: CapabilityHost,
    stats: CallStats,
    dispatch_timeout: Duration,
    pool: Option<PgPool>,
}

impl FunctionRegistry {
    pub fn new(catalogue: Catalogue, host: CapabilityHost) -> Self {
        let (descriptors, keywords) = catalogue.into_parts();
        let by_key = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.search_key.clone(), i))
            .collect();
        Self {
            descriptors,
            by_key,
            keywords,
            similarity: SimilarityKind::default().build(),
            host,
            stats: CallStats::default(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            pool: None,
        }
    }

    /// Load the configured catalogue and apply the configured tunables.
    pub fn from_config(cfg: &JarvisCfg, host: CapabilityHost) -> Result<Self, CatalogueError> {
        let catalogue = Catalogue::load(&cfg.catalogue_path)?;
        Ok(Self::new(catalogue, host)
            .with_similarity(cfg.similarity.build())
            .with_dispatch_timeout(Duration::from_millis(cfg.dispatch_timeout_ms))
            .with_history_capacity(cfg.call_history_cap))
    }

    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.stats = CallStats::new(capacity);
        self
    }

    /// Mirror call counts into Postgres.
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in load order.
    pub fn list_functions(&self) -> &[FunctionDescriptor] {
        &self.descriptors
    }

    pub fn host(&self) -> &CapabilityHost {
        &self.host
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    /// One line per function, for prompts and `--help` style listings.
    pub fn describe(&self) -> String {
        self.descriptors
            .iter()
            .map(|d| {
                let params: Vec<String> = d.parameters.iter().map(render_param).collect();
                match &d.description {
                    Some(desc) => format!("- {}({}): {desc}", d.search_key, params.join(", ")),
                    None => format!("- {}({})", d.search_key, params.join(", ")),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ── Lookup ──────────────────────────────────────────────────

    /// Exact match on `module.function`, then on the bare function name (first in load order).
    pub fn find_by_name(&self, name: &str) -> Option<&FunctionDescriptor> {
        let name = name.trim();
        if let Some(&i) = self.by_key.get(name) {
            return Some(&self.descriptors[i]);
        }
        self.descriptors.iter().find(|d| d.function_name == name)
    }

    /// Fuzzy search over function name, `module.function` and module name.
    ///
    /// Each descriptor keeps its best candidate score. Results are sorted by
    /// score, highest first, and equal scores keep catalogue order. A module
    /// name hit counts the same as a function name hit, so a weak module match
    /// can tie with (and precede) a strong function match from a later entry.
    pub fn search(&self, query: &str, limit: usize, threshold: f64) -> Vec<MatchResult<'_>> {
        if limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let mut best: Vec<Option<f64>> = vec![None; self.descriptors.len()];
        for (i, d) in self.descriptors.iter().enumerate() {
            for candidate in [d.function_name.as_str(), d.search_key.as_str(), d.module_name.as_str()] {
                let score = self.similarity.score(query, candidate);
                if score >= threshold && best[i].is_none_or(|b| score > b) {
                    best[i] = Some(score);
                }
            }
        }

        let mut hits: Vec<MatchResult<'_>> = best
            .into_iter()
            .enumerate()
            .filter_map(|(i, score)| score.map(|score| MatchResult { descriptor: &self.descriptors[i], score }))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        tracing::debug!(query, hits = hits.len(), backend = self.similarity.name(), "catalogue search");
        hits
    }

    /// First fallback keyword contained in `text` whose target exists.
    pub fn keyword_match(&self, text: &str) -> Option<&FunctionDescriptor> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|(keyword, _)| text.contains(&keyword.to_lowercase()))
            .find_map(|(_, target)| self.find_by_name(target))
    }

    /// Best fuzzy hit for a raw utterance, else the keyword table.
    pub fn resolve_query(&self, text: &str, threshold: f64) -> Option<&FunctionDescriptor> {
        self.search(text, 1, threshold)
            .first()
            .map(|hit| hit.descriptor)
            .or_else(|| self.keyword_match(text))
    }

    pub fn validate(&self, descriptor: &FunctionDescriptor, args: &Args) -> Result<(), ValidationError> {
        validate::validate(descriptor, args)
    }

    // ── Reporting ───────────────────────────────────────────────

    pub fn export_schema(&self, include_history: bool) -> RegistrySchema {
        let functions = self
            .descriptors
            .iter()
            .map(|d| {
                let stats = self.stats.get(&d.search_key).unwrap_or_default();
                SchemaEntry {
                    full_name: d.search_key.clone(),
                    module_name: d.module_name.clone(),
                    module_path: d.module_path.clone(),
                    function_name: d.function_name.clone(),
                    description: d.description.clone(),
                    parameters: d.parameters.clone(),
                    call_count: stats.call_count,
                    last_called: stats.last_called,
                    call_history: include_history.then(|| stats.history.into_iter().collect()),
                }
            })
            .collect();
        RegistrySchema { exported_at: Utc::now(), functions }
    }
}

fn render_param(p: &ParameterSpec) -> String {
    if p.required {
        format!("{}: {}", p.name, p.param_type)
    } else {
        format!("{}?: {}", p.name, p.param_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaEntry {
    pub full_name: String,
    pub module_name: String,
    pub module_path: String,
    pub function_name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    pub call_count: u64,
    pub last_called: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_history: Option<Vec<CallRecord>>,
}

/// Serializable registry snapshot with usage counters.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySchema {
    pub exported_at: DateTime<Utc>,
    pub functions: Vec<SchemaEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionDescriptor;

    fn registry() -> FunctionRegistry {
        let descriptors = vec![
            FunctionDescriptor::new("battery_module", "builtin://battery_module", "get_battery_status", vec![]),
            FunctionDescriptor::new(
                "climate_module",
                "builtin://climate_module",
                "set_cabin_temperature",
                vec![ParameterSpec::new("temperature", "float"), ParameterSpec::new("zone", "str")],
            )
            .with_description("Set cabin temperature for a zone"),
            FunctionDescriptor::new("media_module", "builtin://media_module", "adjust_volume", vec![
                ParameterSpec::new("level", "int"),
            ]),
            FunctionDescriptor::new("info_module", "builtin://info_module", "weather.weather_search", vec![
                ParameterSpec::new("key_word", "str"),
            ]),
        ];
        FunctionRegistry::new(Catalogue::from_descriptors(descriptors), CapabilityHost::new())
    }

    #[test]
    fn every_search_key_round_trips() {
        let r = registry();
        for d in r.list_functions() {
            assert_eq!(r.find_by_name(&d.search_key), Some(d));
        }
    }

    #[test]
    fn bare_name_lookup() {
        let r = registry();
        assert_eq!(r.find_by_name("adjust_volume").unwrap().module_name, "media_module");
        assert_eq!(r.find_by_name(" weather.weather_search ").unwrap().module_name, "info_module");
        assert!(r.find_by_name("adjust").is_none());
    }

    #[test]
    fn search_contract() {
        let r = registry();
        for (query, limit, threshold) in [("temperature", 2, 30.0), ("module", 3, 10.0), ("volume", 1, 0.0), ("x", 10, 90.0)] {
            let hits = r.search(query, limit, threshold);
            assert!(hits.len() <= limit);
            assert!(hits.iter().all(|h| h.score >= threshold));
            let mut keys: Vec<&str> = hits.iter().map(|h| h.descriptor.search_key.as_str()).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), hits.len());
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn search_finds_by_function_words() {
        let r = registry();
        let hits = r.search("cabin temperature", 3, 60.0);
        assert_eq!(hits[0].descriptor.search_key, "climate_module.set_cabin_temperature");
        assert!(r.search("", 3, 0.0).is_empty());
        assert!(r.search("cabin", 0, 0.0).is_empty());
    }

    #[test]
    fn keyword_fallback_skips_missing_targets() {
        let r = registry();
        // 导航 points at navigation_module, which this catalogue lacks.
        assert!(r.keyword_match("导航回家").is_none());
        assert_eq!(
            r.keyword_match("把音量调小一点").unwrap().search_key,
            "media_module.adjust_volume"
        );
        assert_eq!(r.resolve_query("导航 then 电池", 95.0).unwrap().search_key, "battery_module.get_battery_status");
    }

    #[test]
    fn describe_lists_signatures() {
        let text = registry().describe();
        assert!(text.contains("- climate_module.set_cabin_temperature(temperature: float, zone: str): Set cabin temperature"));
        assert!(text.contains("- battery_module.get_battery_status()"));
    }

    #[test]
    fn export_schema_with_history() {
        let r = registry();
        r.stats().record("media_module.adjust_volume", &Args::new(), true);
        let schema = r.export_schema(true);
        let volume = schema.functions.iter().find(|f| f.full_name == "media_module.adjust_volume").unwrap();
        assert_eq!(volume.call_count, 1);
        assert_eq!(volume.call_history.as_ref().unwrap().len(), 1);
        let without = serde_json::to_value(r.export_schema(false)).unwrap();
        assert!(without["functions"][0].get("call_history").is_none());
    }
}
