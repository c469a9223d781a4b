use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::rules::default_risk_table;
use crate::types::{Disposition, RiskTier};

/// Disposition returned for tiers that are not in the table.
pub const DEFAULT_DISPOSITION: Disposition = Disposition::Allow;

/// Process-wide tier → disposition table.
///
/// Reads are concurrent. [`RiskGate::update_mapping`] merges under the write
/// lock and is visible to every request that resolves afterwards.
#[derive(Debug)]
pub struct RiskGate {
    table: RwLock<HashMap<RiskTier, Disposition>>,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(default_risk_table())
    }
}

impl RiskGate {
    pub fn new(table: HashMap<RiskTier, Disposition>) -> Self {
        Self { table: RwLock::new(table) }
    }

    pub fn resolve(&self, tier: &str) -> Disposition {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tier)
            .copied()
            .unwrap_or(DEFAULT_DISPOSITION)
    }

    /// Merge entries into the table. Tiers not mentioned keep their disposition.
    pub fn update_mapping<I, T>(&self, entries: I)
    where
        I: IntoIterator<Item = (T, Disposition)>,
        T: Into<RiskTier>,
    {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        for (tier, disposition) in entries {
            let tier = tier.into();
            tracing::info!(tier = %tier, disposition = %disposition, "risk mapping updated");
            table.insert(tier, disposition);
        }
    }

    /// Sorted copy of the current table.
    pub fn snapshot(&self) -> BTreeMap<RiskTier, Disposition> {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(t, d)| (t.clone(), *d))
            .collect()
    }
}
