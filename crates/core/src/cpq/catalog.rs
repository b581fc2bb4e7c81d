use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::config::CatalogConfig;
use crate::domain::product::{
    Feature, FeatureCategory, FeatureId, MaintenancePlan, MaintenancePlanId, Tier, TierId,
};
use crate::errors::DomainError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("tier `{0}` is missing from the catalog")]
    MissingTier(TierId),
    #[error("tier `{0}` is defined more than once")]
    DuplicateTier(TierId),
    #[error("feature `{0}` is defined more than once")]
    DuplicateFeature(FeatureId),
    #[error("tier `{tier}` includes unknown feature `{feature}`")]
    UnknownIncludedFeature { tier: TierId, feature: FeatureId },
    #[error("tier `{tier}` includes `{feature}` but the feature is not locked for it")]
    IncludedNotLocked { tier: TierId, feature: FeatureId },
    #[error("feature `{feature}` is locked for `{tier}` but the tier does not include it")]
    LockedNotIncluded { tier: TierId, feature: FeatureId },
    #[error("the catalog must offer at least one maintenance plan")]
    NoMaintenancePlans,
    #[error("maintenance plan `{0}` is defined more than once")]
    DuplicateMaintenancePlan(MaintenancePlanId),
    #[error("price override in `{section}` names unknown id `{id}`")]
    UnknownOverride { section: &'static str, id: String },
}

/// Read-only product catalog: tiers, add-on features and maintenance plans.
///
/// Construction validates that tier bundles and feature locks agree in both
/// directions, so lookups never have to second-guess the data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    tiers: Vec<Tier>,
    features: Vec<Feature>,
    maintenance_plans: Vec<MaintenancePlan>,
}

impl Catalog {
    /// The first maintenance plan is the default one.
    pub fn new(
        tiers: Vec<Tier>,
        features: Vec<Feature>,
        maintenance_plans: Vec<MaintenancePlan>,
    ) -> Result<Self, CatalogError> {
        let mut tiers_by_id = BTreeMap::new();
        for tier in tiers {
            let id = tier.id;
            if tiers_by_id.insert(id, tier).is_some() {
                return Err(CatalogError::DuplicateTier(id));
            }
        }
        if let Some(missing) = TierId::ALL.into_iter().find(|id| !tiers_by_id.contains_key(id)) {
            return Err(CatalogError::MissingTier(missing));
        }

        let mut seen_features = BTreeSet::new();
        for feature in &features {
            if !seen_features.insert(feature.id.clone()) {
                return Err(CatalogError::DuplicateFeature(feature.id.clone()));
            }
        }

        for tier in tiers_by_id.values() {
            for included in &tier.included_feature_ids {
                let feature =
                    features.iter().find(|feature| &feature.id == included).ok_or_else(|| {
                        CatalogError::UnknownIncludedFeature {
                            tier: tier.id,
                            feature: included.clone(),
                        }
                    })?;
                if !feature.is_locked_for(tier.id) {
                    return Err(CatalogError::IncludedNotLocked {
                        tier: tier.id,
                        feature: included.clone(),
                    });
                }
            }
        }

        for feature in &features {
            for tier_id in &feature.locked_for_tiers {
                let includes = tiers_by_id
                    .get(tier_id)
                    .is_some_and(|tier| tier.included_feature_ids.contains(&feature.id));
                if !includes {
                    return Err(CatalogError::LockedNotIncluded {
                        tier: *tier_id,
                        feature: feature.id.clone(),
                    });
                }
            }
        }

        if maintenance_plans.is_empty() {
            return Err(CatalogError::NoMaintenancePlans);
        }
        let mut seen_plans = BTreeSet::new();
        for plan in &maintenance_plans {
            if !seen_plans.insert(plan.id.clone()) {
                return Err(CatalogError::DuplicateMaintenancePlan(plan.id.clone()));
            }
        }

        Ok(Self { tiers: tiers_by_id.into_values().collect(), features, maintenance_plans })
    }

    /// Built-in catalog at list prices.
    pub fn standard() -> Result<Self, CatalogError> {
        Self::new(standard_tiers(), standard_features(), standard_maintenance_plans())
    }

    /// Built-in catalog with configured price overrides applied.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut tiers = standard_tiers();
        for tier in &mut tiers {
            if let Some(price) = config.tier_base_prices.get(&tier.id) {
                tier.base_price_cents = *price;
            }
        }

        let mut features = standard_features();
        for (id, price) in &config.feature_prices {
            let feature = features
                .iter_mut()
                .find(|feature| feature.id.as_str() == id)
                .ok_or_else(|| CatalogError::UnknownOverride {
                    section: "catalog.feature_prices",
                    id: id.clone(),
                })?;
            feature.price_cents = *price;
        }

        let mut plans = standard_maintenance_plans();
        for (id, price) in &config.maintenance_prices {
            let plan = plans.iter_mut().find(|plan| plan.id.as_str() == id).ok_or_else(|| {
                CatalogError::UnknownOverride {
                    section: "catalog.maintenance_prices",
                    id: id.clone(),
                }
            })?;
            plan.monthly_price_cents = *price;
        }

        Self::new(tiers, features, plans)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn features_in(&self, category: FeatureCategory) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(move |feature| feature.category == category)
    }

    pub fn maintenance_plans(&self) -> &[MaintenancePlan] {
        &self.maintenance_plans
    }

    pub fn tier(&self, id: TierId) -> Result<&Tier, DomainError> {
        self.tiers
            .iter()
            .find(|tier| tier.id == id)
            .ok_or_else(|| DomainError::InvalidTier(id.to_string()))
    }

    pub fn get_tier(&self, id: &str) -> Result<&Tier, DomainError> {
        self.tier(id.parse::<TierId>()?)
    }

    pub fn get_feature(&self, id: &str) -> Result<&Feature, DomainError> {
        self.features.iter().find(|feature| feature.id.as_str() == id).ok_or_else(|| {
            DomainError::InvalidFeatureSelection { unknown: vec![FeatureId::new(id)] }
        })
    }

    pub fn locked_features_for(&self, tier: TierId) -> BTreeSet<FeatureId> {
        self.features
            .iter()
            .filter(|feature| feature.is_locked_for(tier))
            .map(|feature| feature.id.clone())
            .collect()
    }

    /// Unknown feature ids are never locked.
    pub fn is_locked(&self, feature: &FeatureId, tier: TierId) -> bool {
        self.features
            .iter()
            .any(|candidate| &candidate.id == feature && candidate.is_locked_for(tier))
    }

    pub fn is_recommended(&self, feature: &FeatureId, tier: TierId) -> bool {
        self.features
            .iter()
            .any(|candidate| &candidate.id == feature && candidate.is_recommended_for(tier))
    }

    pub fn get_maintenance_plan(&self, id: &str) -> Result<&MaintenancePlan, DomainError> {
        self.maintenance_plans
            .iter()
            .find(|plan| plan.id.as_str() == id)
            .ok_or_else(|| DomainError::UnknownMaintenancePlan(id.to_string()))
    }

    pub fn default_maintenance_plan(&self) -> &MaintenancePlan {
        // Non-empty is checked in `new`.
        &self.maintenance_plans[0]
    }
}

fn ids<const N: usize>(values: [&str; N]) -> BTreeSet<FeatureId> {
    values.into_iter().map(FeatureId::new).collect()
}

fn tier_set<const N: usize>(values: [TierId; N]) -> BTreeSet<TierId> {
    values.into_iter().collect()
}

fn standard_tiers() -> Vec<Tier> {
    vec![
        Tier {
            id: TierId::Starter,
            name: "Starter".to_string(),
            base_price_cents: 120_000,
            max_addons_cost_cents: 130_000,
            included_feature_ids: ids(["responsive_design", "contact_form", "basic_seo"]),
        },
        Tier {
            id: TierId::Pro,
            name: "Pro".to_string(),
            base_price_cents: 199_900,
            max_addons_cost_cents: 90_000,
            included_feature_ids: ids([
                "responsive_design",
                "custom_branding",
                "contact_form",
                "blog",
                "basic_seo",
                "analytics",
            ]),
        },
        Tier {
            id: TierId::Elite,
            name: "Elite".to_string(),
            base_price_cents: 299_900,
            max_addons_cost_cents: 50_000,
            included_feature_ids: ids([
                "responsive_design",
                "custom_branding",
                "premium_animations",
                "copywriting",
                "contact_form",
                "blog",
                "booking_system",
                "basic_seo",
                "analytics",
                "crm_integration",
                "email_marketing",
            ]),
        },
    ]
}

fn feature(
    id: &str,
    name: &str,
    category: FeatureCategory,
    price_cents: u64,
    locked_for_tiers: BTreeSet<TierId>,
    recommended_for_tiers: BTreeSet<TierId>,
) -> Feature {
    Feature {
        id: FeatureId::new(id),
        name: name.to_string(),
        category,
        price_cents,
        locked_for_tiers,
        recommended_for_tiers,
    }
}

fn standard_features() -> Vec<Feature> {
    use FeatureCategory::{Design, Functionality, Integrations};
    use TierId::{Elite, Pro, Starter};

    let all = || tier_set([Starter, Pro, Elite]);
    let none = BTreeSet::new;

    vec![
        feature("responsive_design", "Responsive design", Design, 0, all(), none()),
        feature(
            "custom_branding",
            "Custom branding",
            Design,
            25_000,
            tier_set([Pro, Elite]),
            tier_set([Starter]),
        ),
        feature(
            "premium_animations",
            "Premium animations",
            Design,
            30_000,
            tier_set([Elite]),
            tier_set([Pro]),
        ),
        feature("copywriting", "Copywriting", Design, 20_000, tier_set([Elite]), tier_set([Pro])),
        feature("contact_form", "Contact form", Functionality, 0, all(), none()),
        feature("blog", "Blog", Functionality, 15_000, tier_set([Pro, Elite]), tier_set([Starter])),
        feature(
            "ecommerce",
            "E-commerce store",
            Functionality,
            60_000,
            none(),
            tier_set([Pro, Elite]),
        ),
        feature(
            "booking_system",
            "Booking system",
            Functionality,
            35_000,
            tier_set([Elite]),
            tier_set([Pro]),
        ),
        feature("member_portal", "Member portal", Functionality, 45_000, none(), tier_set([Elite])),
        feature(
            "multilingual",
            "Multilingual content",
            Functionality,
            25_000,
            none(),
            tier_set([Elite]),
        ),
        feature("basic_seo", "Basic SEO", Integrations, 0, all(), none()),
        feature(
            "analytics",
            "Analytics dashboard",
            Integrations,
            10_000,
            tier_set([Pro, Elite]),
            tier_set([Starter]),
        ),
        feature(
            "crm_integration",
            "CRM integration",
            Integrations,
            35_000,
            tier_set([Elite]),
            tier_set([Pro]),
        ),
        feature(
            "payment_gateway",
            "Payment gateway",
            Integrations,
            20_000,
            none(),
            tier_set([Pro, Elite]),
        ),
        feature(
            "email_marketing",
            "Email marketing",
            Integrations,
            15_000,
            tier_set([Elite]),
            tier_set([Pro]),
        ),
    ]
}

fn standard_maintenance_plans() -> Vec<MaintenancePlan> {
    [
        ("basic", "Basic care", 9_900),
        ("growth", "Growth care", 19_900),
        ("premium", "Premium care", 39_900),
    ]
    .into_iter()
    .map(|(id, name, monthly_price_cents)| MaintenancePlan {
        id: MaintenancePlanId::new(id),
        name: name.to_string(),
        monthly_price_cents,
    })
    .collect()
}
