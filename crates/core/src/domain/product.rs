use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Service packages on offer. The set is closed: adding a tier is a code change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    Starter,
    Pro,
    Elite,
}

impl TierId {
    pub const ALL: [TierId; 3] = [TierId::Starter, TierId::Pro, TierId::Elite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Elite => "elite",
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "elite" => Ok(Self::Elite),
            _ => Err(DomainError::InvalidTier(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

impl FeatureId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Design,
    Functionality,
    Integrations,
}

impl FeatureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Functionality => "functionality",
            Self::Integrations => "integrations",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    pub base_price_cents: u64,
    pub max_addons_cost_cents: u64,
    pub included_feature_ids: BTreeSet<FeatureId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub category: FeatureCategory,
    pub price_cents: u64,
    pub locked_for_tiers: BTreeSet<TierId>,
    pub recommended_for_tiers: BTreeSet<TierId>,
}

impl Feature {
    pub fn is_locked_for(&self, tier: TierId) -> bool {
        self.locked_for_tiers.contains(&tier)
    }

    pub fn is_recommended_for(&self, tier: TierId) -> bool {
        self.recommended_for_tiers.contains(&tier)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaintenancePlanId(pub String);

impl MaintenancePlanId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaintenancePlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monthly care plan billed on top of the one-off build price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePlan {
    pub id: MaintenancePlanId,
    pub name: String,
    pub monthly_price_cents: u64,
}
