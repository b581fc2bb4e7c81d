use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub use crate::config::PricingConfig;
use crate::cpq::catalog::Catalog;
use crate::domain::product::{FeatureId, TierId};
use crate::domain::quote::{QuoteSelection, Totals};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub tier: TierId,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub totals: Totals,
    pub trace: PricingTrace,
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        catalog: &Catalog,
        selection: &QuoteSelection,
    ) -> Result<PricingResult, DomainError>;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicPricingEngine {
    config: PricingConfig,
}

impl DeterministicPricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }
}

impl PricingEngine for DeterministicPricingEngine {
    fn price(
        &self,
        catalog: &Catalog,
        selection: &QuoteSelection,
    ) -> Result<PricingResult, DomainError> {
        price_with_trace(catalog, selection, &self.config)
    }
}

pub fn compute_totals(
    catalog: &Catalog,
    selection: &QuoteSelection,
    config: &PricingConfig,
) -> Result<Totals, DomainError> {
    price_with_trace(catalog, selection, config).map(|result| result.totals)
}

pub fn price_with_trace(
    catalog: &Catalog,
    selection: &QuoteSelection,
    config: &PricingConfig,
) -> Result<PricingResult, DomainError> {
    let tier = catalog.tier(selection.tier)?;

    let unknown: Vec<FeatureId> = selection
        .selected_feature_ids
        .iter()
        .filter(|id| catalog.get_feature(id.as_str()).is_err())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(DomainError::InvalidFeatureSelection { unknown });
    }

    let plan = catalog.get_maintenance_plan(selection.maintenance_plan.as_str())?;

    let effective: BTreeSet<&FeatureId> =
        selection.selected_feature_ids.iter().chain(tier.included_feature_ids.iter()).collect();
    let mut addons = 0_u64;
    for id in &effective {
        let feature = catalog.get_feature(id.as_str())?;
        if !feature.is_locked_for(tier.id) {
            addons = addons.saturating_add(feature.price_cents);
        }
    }

    if addons > tier.max_addons_cost_cents {
        return Err(DomainError::AddonsCapExceeded {
            cap_cents: tier.max_addons_cost_cents,
            requested_cents: addons,
        });
    }

    let package_base = tier.base_price_cents;
    let build = package_base.saturating_add(addons);
    let rush_fee = if selection.rush_requested {
        round_cents(Decimal::from(build) * (config.rush_multiplier - Decimal::ONE))
    } else {
        0
    };
    let subtotal = build.saturating_add(rush_fee);
    let total = subtotal.min(config.price_ceiling_cents);
    let deposit = round_cents(Decimal::from(total) * config.deposit_percent)
        .max(config.min_deposit_cents)
        .min(total);
    let maintenance_monthly = plan.monthly_price_cents;

    let steps = vec![
        step("package_base", format!("{} base price", tier.id), package_base),
        step("addons", "sum of feature prices not bundled with the tier", addons),
        step(
            "rush_fee",
            if selection.rush_requested {
                format!("(base + addons) * ({} - 1)", config.rush_multiplier)
            } else {
                "rush not requested".to_string()
            },
            rush_fee,
        ),
        step("subtotal", "base + addons + rush", subtotal),
        step("total", format!("min(subtotal, {})", config.price_ceiling_cents), total),
        step(
            "deposit",
            format!(
                "clamp(total * {}, {}, total)",
                config.deposit_percent, config.min_deposit_cents
            ),
            deposit,
        ),
        step("maintenance", format!("{} plan, billed monthly", plan.id), maintenance_monthly),
    ];

    Ok(PricingResult {
        totals: Totals {
            package_base,
            addons,
            maintenance_monthly,
            rush_fee,
            subtotal,
            deposit,
            total,
            monthly: maintenance_monthly,
            recurring: true,
        },
        trace: PricingTrace { tier: tier.id, steps },
    })
}

/// What a selection looks like against its tier: bundled, paid and suggested features.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub tier: TierId,
    pub included: Vec<FeatureId>,
    pub addons: Vec<FeatureId>,
    pub recommended: Vec<FeatureId>,
    pub addons_cost_cents: u64,
    pub cap_cents: u64,
    pub cap_remaining_cents: u64,
}

pub fn selection_report(
    catalog: &Catalog,
    tier: TierId,
    selected: &BTreeSet<FeatureId>,
) -> Result<SelectionReport, DomainError> {
    let tier = catalog.tier(tier)?;

    let mut addons = Vec::new();
    let mut addons_cost_cents = 0_u64;
    let mut unknown = Vec::new();
    for id in selected {
        match catalog.get_feature(id.as_str()) {
            Ok(feature) if feature.is_locked_for(tier.id) => {}
            Ok(feature) => {
                addons.push(feature.id.clone());
                addons_cost_cents = addons_cost_cents.saturating_add(feature.price_cents);
            }
            Err(_) => unknown.push(id.clone()),
        }
    }
    if !unknown.is_empty() {
        return Err(DomainError::InvalidFeatureSelection { unknown });
    }

    let recommended = catalog
        .features()
        .iter()
        .filter(|feature| feature.is_recommended_for(tier.id) && !selected.contains(&feature.id))
        .map(|feature| feature.id.clone())
        .collect();

    Ok(SelectionReport {
        tier: tier.id,
        included: tier.included_feature_ids.iter().cloned().collect(),
        addons,
        recommended,
        addons_cost_cents,
        cap_cents: tier.max_addons_cost_cents,
        cap_remaining_cents: tier.max_addons_cost_cents.saturating_sub(addons_cost_cents),
    })
}

fn step(stage: &str, detail: impl Into<String>, amount: u64) -> PricingTraceStep {
    PricingTraceStep { stage: stage.to_string(), detail: detail.into(), amount }
}

/// Whole cents, half away from zero. Negative intermediates floor at zero.
fn round_cents(value: Decimal) -> u64 {
    value
        .max(Decimal::ZERO)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap_or(u64::MAX)
}
