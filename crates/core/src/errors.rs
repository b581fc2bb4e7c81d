use thiserror::Error;

use crate::{
    domain::{draft::DraftToken, product::FeatureId},
    flows::{FlowTransitionError, SubmissionStatus},
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown tier `{0}`")]
    InvalidTier(String),
    #[error("unknown feature ids in selection: {}", join_ids(.unknown))]
    InvalidFeatureSelection { unknown: Vec<FeatureId> },
    #[error("add-on cost {requested_cents} exceeds the tier cap of {cap_cents}")]
    AddonsCapExceeded { cap_cents: u64, requested_cents: u64 },
    #[error("invalid contact: {0}")]
    InvalidContact(String),
    #[error("draft `{0}` not found")]
    DraftNotFound(DraftToken),
    #[error("a tier must be selected first")]
    TierRequired,
    #[error("unknown maintenance plan `{0}`")]
    UnknownMaintenancePlan(String),
    #[error("invalid questionnaire answer for `{key}`: {reason}")]
    InvalidQuestionnaire { key: String, reason: String },
    #[error("status {0:?} is reserved for the payment collaborator")]
    ReservedStatus(SubmissionStatus),
    #[error("invalid draft payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    WizardTransition(#[from] FlowTransitionError),
}

impl DomainError {
    /// Stable identifier for clients that branch on the failure type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTier(_) => "invalid_tier",
            Self::InvalidFeatureSelection { .. } => "invalid_feature_selection",
            Self::AddonsCapExceeded { .. } => "addons_cap_exceeded",
            Self::InvalidContact(_) => "invalid_contact",
            Self::DraftNotFound(_) => "not_found",
            Self::TierRequired => "tier_required",
            Self::UnknownMaintenancePlan(_) => "unknown_maintenance_plan",
            Self::InvalidQuestionnaire { .. } => "invalid_questionnaire",
            Self::ReservedStatus(_) => "reserved_status",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::WizardTransition(_) => "invalid_step_transition",
        }
    }
}

fn join_ids(ids: &[FeatureId]) -> String {
    ids.iter().map(FeatureId::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { kind: &'static str, message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { kind: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested quote draft could not be found.",
            Self::Unprocessable { .. } => {
                "The selected add-ons exceed what this package allows. \
                 Remove a feature or choose a larger package."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { kind, .. }
            | Self::NotFound { kind, .. }
            | Self::Unprocessable { kind, .. } => *kind,
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error @ DomainError::DraftNotFound(_)) => Self::NotFound {
                kind: error.kind(),
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(error @ DomainError::AddonsCapExceeded { .. }) => {
                Self::Unprocessable {
                    kind: error.kind(),
                    message: error.to_string(),
                    correlation_id: unassigned(),
                }
            }
            ApplicationError::Domain(error) => Self::BadRequest {
                kind: error.kind(),
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
