pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod flows;

pub use cpq::{Catalog, CatalogError, DeterministicPricingEngine, PricingConfig, PricingEngine};
pub use domain::customer::Contact;
pub use domain::draft::{DraftRecord, DraftToken, DRAFT_EMAIL_PLACEHOLDER};
pub use domain::product::{
    Feature, FeatureCategory, FeatureId, MaintenancePlan, MaintenancePlanId, Tier, TierId,
};
pub use domain::questionnaire::QuestionnaireAnswers;
pub use domain::quote::{QuoteSelection, Totals};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    SubmissionStatus, WizardAction, WizardEngine, WizardOutcome, WizardSession, WizardState,
    WizardStep, WizardStorage,
};
