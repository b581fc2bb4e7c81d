use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::customer::Contact;
use crate::domain::draft::DraftToken;
use crate::domain::product::{FeatureId, MaintenancePlanId, TierId};
use crate::domain::questionnaire::QuestionnaireAnswers;
use crate::domain::quote::Totals;

/// Wizard pages in display order. Serialized as the 0-based index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum WizardStep {
    TierSelection,
    FeatureSelection,
    Questionnaire,
    Contact,
    Review,
}

impl WizardStep {
    pub const FIRST: WizardStep = WizardStep::TierSelection;
    pub const LAST: WizardStep = WizardStep::Review;

    pub fn index(self) -> u8 {
        match self {
            Self::TierSelection => 0,
            Self::FeatureSelection => 1,
            Self::Questionnaire => 2,
            Self::Contact => 3,
            Self::Review => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::TierSelection),
            1 => Some(Self::FeatureSelection),
            2 => Some(Self::Questionnaire),
            3 => Some(Self::Contact),
            4 => Some(Self::Review),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }
}

impl From<WizardStep> for u8 {
    fn from(step: WizardStep) -> Self {
        step.index()
    }
}

impl TryFrom<u8> for WizardStep {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or_else(|| format!("wizard step must be 0..=4, got {index}"))
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TierSelection => "tier_selection",
            Self::FeatureSelection => "feature_selection",
            Self::Questionnaire => "questionnaire",
            Self::Contact => "contact",
            Self::Review => "review",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Draft,
    Submitting,
    Submitted,
    Checkout,
    Paid,
    Error,
}

/// Navigation requests between wizard pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "step", rename_all = "snake_case")]
pub enum WizardEvent {
    Next,
    Back,
    GoTo(WizardStep),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WizardStep,
    pub to: WizardStep,
    pub event: WizardEvent,
}

/// Everything a customer can do to the wizard. Scriptable as JSON for the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WizardAction {
    SetTier(String),
    ToggleFeature(String),
    SetRush(bool),
    SetMaintenancePlan(String),
    SetQuestionnaireAnswers(Map<String, Value>),
    SetContact(Contact),
    SetStatus(SubmissionStatus),
    SetDraftToken(DraftToken),
    Navigate(WizardEvent),
    Reset,
}

impl WizardAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTier(_) => "set_tier",
            Self::ToggleFeature(_) => "toggle_feature",
            Self::SetRush(_) => "set_rush",
            Self::SetMaintenancePlan(_) => "set_maintenance_plan",
            Self::SetQuestionnaireAnswers(_) => "set_questionnaire_answers",
            Self::SetContact(_) => "set_contact",
            Self::SetStatus(_) => "set_status",
            Self::SetDraftToken(_) => "set_draft_token",
            Self::Navigate(_) => "navigate",
            Self::Reset => "reset",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    LockedFeature,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum WizardOutcome {
    Applied,
    Ignored(IgnoreReason),
}

/// Full wizard state for one browser tab.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub step: WizardStep,
    pub tier: Option<TierId>,
    #[serde(default)]
    pub selected_feature_ids: BTreeSet<FeatureId>,
    #[serde(default)]
    pub rush_requested: bool,
    pub maintenance_plan: MaintenancePlanId,
    pub totals: Option<Totals>,
    #[serde(default)]
    pub questionnaire_answers: QuestionnaireAnswers,
    pub contact: Option<Contact>,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub draft_token: Option<DraftToken>,
}

impl WizardState {
    pub fn new(maintenance_plan: MaintenancePlanId) -> Self {
        Self {
            step: WizardStep::FIRST,
            tier: None,
            selected_feature_ids: BTreeSet::new(),
            rush_requested: false,
            maintenance_plan,
            totals: None,
            questionnaire_answers: QuestionnaireAnswers::default(),
            contact: None,
            status: SubmissionStatus::Draft,
            draft_token: None,
        }
    }

    /// Partial payload for draft sync. The token travels separately, so it is left out.
    pub fn draft_snapshot(&self) -> Value {
        let mut snapshot = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        snapshot.remove("draftToken");
        Value::Object(snapshot)
    }
}
