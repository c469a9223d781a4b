use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::registry::SimilarityKind;

/// Environment variable prefix for overrides (`JARVIS_SEARCH_LIMIT`, ...).
pub const ENV_PREFIX: &str = "JARVIS_";

/// All router parameters. Defaults, then the optional `jarvis_config` table,
/// then `JARVIS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JarvisCfg {
    // documents
    pub rules_path: String,
    pub catalogue_path: String,

    // catalogue search
    pub search_limit: usize,
    pub search_threshold: f64,
    /// Lower bar used when resolving a raw utterance to a function.
    pub route_search_threshold: f64,
    pub similarity: SimilarityKind,

    // time limits (ms)
    pub dispatch_timeout_ms: u64,
    pub collaborator_timeout_ms: u64,

    // call statistics
    pub call_history_cap: usize,
}

impl Default for JarvisCfg {
    fn default() -> Self {
        Self {
            rules_path: "config/rules.json".into(),
            catalogue_path: "config/catalogue.json".into(),
            search_limit: 5,
            search_threshold: 60.0,
            route_search_threshold: 30.0,
            similarity: SimilarityKind::Weighted,
            dispatch_timeout_ms: 5_000,
            collaborator_timeout_ms: 30_000,
            call_history_cap: 10,
        }
    }
}

impl JarvisCfg {
    /// Load config from `jarvis_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM jarvis_config")
            .fetch_all(pool)
            .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `jarvis_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO jarvis_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Overlay `JARVIS_<KEY>` variables from the process environment.
    pub fn with_env(self) -> Self {
        self.with_vars(std::env::vars())
    }

    /// Overlay `JARVIS_<KEY>` pairs. Unparseable values keep the current setting.
    pub fn with_vars(self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let map: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|key| (key.to_ascii_lowercase(), v)))
            .collect();
        if map.is_empty() {
            return self;
        }
        self.merge(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        Self::default().merge(m)
    }

    fn merge(self, m: &HashMap<String, String>) -> Self {
        let d = self;
        Self {
            rules_path: get_or(m, "rules_path", d.rules_path),
            catalogue_path: get_or(m, "catalogue_path", d.catalogue_path),
            search_limit: get_or(m, "search_limit", d.search_limit),
            search_threshold: get_or(m, "search_threshold", d.search_threshold),
            route_search_threshold: get_or(m, "route_search_threshold", d.route_search_threshold),
            similarity: get_or(m, "similarity", d.similarity),
            dispatch_timeout_ms: get_or(m, "dispatch_timeout_ms", d.dispatch_timeout_ms),
            collaborator_timeout_ms: get_or(m, "collaborator_timeout_ms", d.collaborator_timeout_ms),
            call_history_cap: get_or(m, "call_history_cap", d.call_history_cap),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("rules_path", self.rules_path.clone(), "Rule document path"),
            ("catalogue_path", self.catalogue_path.clone(), "Capability catalogue path"),
            ("search_limit", self.search_limit.to_string(), "Max catalogue search results"),
            ("search_threshold", self.search_threshold.to_string(), "Catalogue search score threshold"),
            ("route_search_threshold", self.route_search_threshold.to_string(), "Score threshold when resolving utterances"),
            ("similarity", self.similarity.to_string(), "Similarity backend (weighted|overlap)"),
            ("dispatch_timeout_ms", self.dispatch_timeout_ms.to_string(), "Capability call timeout ms"),
            ("collaborator_timeout_ms", self.collaborator_timeout_ms.to_string(), "Chat/extraction call timeout ms"),
            ("call_history_cap", self.call_history_cap.to_string(), "Recent calls kept per function"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
