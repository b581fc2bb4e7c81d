use quoteflow_core::{
    DeterministicPricingEngine, FeatureId, MaintenancePlanId, PricingEngine, QuoteSelection,
    TierId,
};
use serde_json::json;

use crate::commands::{load_catalog, load_config, CommandResult};

#[derive(Debug, Clone, Default)]
pub struct QuoteArgs {
    pub tier: String,
    pub features: Vec<String>,
    pub rush: bool,
    pub maintenance_plan: Option<String>,
    pub trace: bool,
}

pub fn run(args: QuoteArgs) -> CommandResult {
    let config = match load_config("quote") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let catalog = match load_catalog("quote", &config) {
        Ok(catalog) => catalog,
        Err(failure) => return failure,
    };
    let engine = DeterministicPricingEngine::new(config.pricing.clone());

    let tier = match args.tier.parse::<TierId>() {
        Ok(tier) => tier,
        Err(error) => return CommandResult::failure("quote", error.kind(), error.to_string(), 7),
    };
    let selection = QuoteSelection {
        tier,
        selected_feature_ids: args.features.into_iter().map(FeatureId::new).collect(),
        rush_requested: args.rush,
        maintenance_plan: args
            .maintenance_plan
            .map(MaintenancePlanId::new)
            .unwrap_or_else(|| catalog.default_maintenance_plan().id.clone()),
    };

    match engine.price(&catalog, &selection) {
        Ok(result) => {
            let mut data = json!({
                "totals": result.totals,
                "balanceDueCents": result.totals.balance_due(),
                "ceilingApplied": result.totals.is_capped(),
            });
            if args.trace {
                data["trace"] = json!(result.trace);
            }
            CommandResult::with_data(
                "quote",
                format!(
                    "{} total {} cents, deposit {} cents",
                    tier.as_str(),
                    result.totals.total,
                    result.totals.deposit
                ),
                data,
            )
        }
        Err(error) => CommandResult::failure("quote", error.kind(), error.to_string(), 7),
    }
}
