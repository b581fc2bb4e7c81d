use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::product::{FeatureId, MaintenancePlanId, TierId};

/// Everything the calculator needs to price one configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSelection {
    pub tier: TierId,
    #[serde(default)]
    pub selected_feature_ids: BTreeSet<FeatureId>,
    #[serde(default)]
    pub rush_requested: bool,
    pub maintenance_plan: MaintenancePlanId,
}

/// Price breakdown in minor units. Derived on demand, never stored as the source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub package_base: u64,
    pub addons: u64,
    pub maintenance_monthly: u64,
    pub rush_fee: u64,
    pub subtotal: u64,
    pub deposit: u64,
    pub total: u64,
    pub monthly: u64,
    pub recurring: bool,
}

impl Totals {
    /// Amount still owed after the deposit is collected.
    pub fn balance_due(&self) -> u64 {
        self.total.saturating_sub(self.deposit)
    }

    /// True when the ceiling trimmed the subtotal.
    pub fn is_capped(&self) -> bool {
        self.total < self.subtotal
    }
}

#[cfg(test)]
mod tests {
    use super::Totals;

    fn totals(subtotal: u64, total: u64, deposit: u64) -> Totals {
        Totals {
            package_base: subtotal,
            addons: 0,
            maintenance_monthly: 9_900,
            rush_fee: 0,
            subtotal,
            deposit,
            total,
            monthly: 9_900,
            recurring: true,
        }
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(totals(120_000, 120_000, 30_000)).expect("serialize");

        assert_eq!(value["packageBase"], 120_000);
        assert_eq!(value["rushFee"], 0);
        assert_eq!(value["maintenanceMonthly"], 9_900);
        assert_eq!(value["recurring"], true);
    }

    #[test]
    fn balance_and_cap_flags_follow_amounts() {
        let capped = totals(367_885, 350_000, 87_500);
        assert!(capped.is_capped());
        assert_eq!(capped.balance_due(), 262_500);

        let plain = totals(120_000, 120_000, 30_000);
        assert!(!plain.is_capped());
        assert_eq!(plain.balance_due(), 90_000);
    }
}
