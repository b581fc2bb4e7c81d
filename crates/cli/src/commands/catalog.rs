use std::collections::BTreeSet;

use quoteflow_core::cpq::selection_report;
use quoteflow_core::TierId;
use serde_json::json;

use crate::commands::{load_catalog, load_config, to_data, CommandResult};

/// Prints the effective catalog, or one tier's bundle and recommendations when `tier` is set.
pub fn run(tier: Option<&str>) -> CommandResult {
    let config = match load_config("catalog") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let catalog = match load_catalog("catalog", &config) {
        Ok(catalog) => catalog,
        Err(failure) => return failure,
    };

    let Some(tier) = tier else {
        return match to_data("catalog", &catalog) {
            Ok(data) => CommandResult::with_data(
                "catalog",
                format!(
                    "{} tiers, {} features, {} maintenance plans",
                    catalog.tiers().len(),
                    catalog.features().len(),
                    catalog.maintenance_plans().len()
                ),
                data,
            ),
            Err(failure) => failure,
        };
    };

    let report = tier
        .parse::<TierId>()
        .and_then(|tier| selection_report(&catalog, tier, &BTreeSet::new()));
    match report {
        Ok(report) => {
            let locked = catalog.locked_features_for(report.tier);
            CommandResult::with_data(
                "catalog",
                format!("tier `{}` bundles {} features", report.tier.as_str(), locked.len()),
                json!({
                    "tier": report.tier,
                    "locked": locked,
                    "recommended": report.recommended,
                    "capCents": report.cap_cents,
                }),
            )
        }
        Err(error) => CommandResult::failure("catalog", error.kind(), error.to_string(), 7),
    }
}
