use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::types::Args;

pub const DEFAULT_HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub at: DateTime<Utc>,
    pub parameters: Args,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionStats {
    pub call_count: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub last_called: Option<DateTime<Utc>>,
    /// Most recent calls, oldest first.
    pub history: VecDeque<CallRecord>,
}

/// Per-function call counters. Best effort; nothing depends on them for routing.
#[derive(Debug)]
pub struct CallStats {
    capacity: usize,
    inner: Mutex<HashMap<String, FunctionStats>>,
}

impl Default for CallStats {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl CallStats {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, search_key: &str, parameters: &Args, success: bool) {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entry(search_key.to_string()).or_default();
        entry.call_count += 1;
        if success {
            entry.success_count += 1;
        } else {
            entry.fail_count += 1;
        }
        entry.last_called = Some(now);
        if self.capacity > 0 {
            if entry.history.len() == self.capacity {
                entry.history.pop_front();
            }
            entry.history.push_back(CallRecord { at: now, parameters: parameters.clone(), success });
        }
    }

    pub fn get(&self, search_key: &str) -> Option<FunctionStats> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).get(search_key).cloned()
    }

    /// Total calls across all functions.
    pub fn total_calls(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|s| s.call_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_is_bounded() {
        let stats = CallStats::new(3);
        for i in 0..5 {
            let mut args = Args::new();
            args.insert("i".into(), json!(i));
            stats.record("media_module.adjust_volume", &args, i % 2 == 0);
        }
        let s = stats.get("media_module.adjust_volume").unwrap();
        assert_eq!(s.call_count, 5);
        assert_eq!(s.success_count, 3);
        assert_eq!(s.fail_count, 2);
        let kept: Vec<i64> = s.history.iter().map(|r| r.parameters["i"].as_i64().unwrap()).collect();
        assert_eq!(kept, [2, 3, 4]);
        assert!(s.last_called.is_some());
        assert_eq!(stats.total_calls(), 5);
    }

    #[test]
    fn zero_capacity_keeps_counts_only() {
        let stats = CallStats::new(0);
        stats.record("a.b", &Args::new(), true);
        let s = stats.get("a.b").unwrap();
        assert_eq!(s.call_count, 1);
        assert!(s.history.is_empty());
        assert!(stats.get("x.y").is_none());
    }
}
