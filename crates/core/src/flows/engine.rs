use serde_json::{Map, Value};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::cpq::catalog::Catalog;
use crate::cpq::pricing::{DeterministicPricingEngine, PricingEngine};
use crate::domain::customer::Contact;
use crate::domain::draft::DraftToken;
use crate::domain::quote::QuoteSelection;
use crate::errors::DomainError;
use crate::flows::states::{
    IgnoreReason, SubmissionStatus, TransitionOutcome, WizardAction, WizardEvent, WizardOutcome,
    WizardState, WizardStep,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before leaving step {step}: {missing_fields:?}")]
    MissingRequiredFields { step: WizardStep, missing_fields: Vec<String> },
    #[error("invalid transition from step {step} using event {event:?}")]
    InvalidTransition { step: WizardStep, event: WizardEvent },
}

/// Result of a successful reducer call.
#[derive(Clone, Debug, PartialEq)]
pub struct WizardUpdate {
    pub state: WizardState,
    pub outcome: WizardOutcome,
}

impl WizardUpdate {
    fn applied(state: WizardState) -> Self {
        Self { state, outcome: WizardOutcome::Applied }
    }
}

/// Pure reducer for the quote wizard.
///
/// Every operation takes the current state by reference and returns the next
/// one; a rejected operation returns an error and the caller keeps its state.
pub struct WizardEngine<P = DeterministicPricingEngine> {
    catalog: Catalog,
    pricing: P,
}

impl<P> WizardEngine<P>
where
    P: PricingEngine,
{
    pub fn new(catalog: Catalog, pricing: P) -> Self {
        Self { catalog, pricing }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pricing(&self) -> &P {
        &self.pricing
    }

    pub fn initial_state(&self) -> WizardState {
        WizardState::new(self.catalog.default_maintenance_plan().id.clone())
    }

    pub fn apply(
        &self,
        state: &WizardState,
        action: &WizardAction,
    ) -> Result<WizardUpdate, DomainError> {
        match action {
            WizardAction::SetTier(id) => self.set_tier(state, id),
            WizardAction::ToggleFeature(id) => self.toggle_feature(state, id),
            WizardAction::SetRush(rush) => self.set_rush(state, *rush),
            WizardAction::SetMaintenancePlan(id) => self.set_maintenance_plan(state, id),
            WizardAction::SetQuestionnaireAnswers(partial) => {
                self.set_questionnaire_answers(state, partial)
            }
            WizardAction::SetContact(contact) => self.set_contact(state, contact.clone()),
            WizardAction::SetStatus(status) => self.set_status(state, *status),
            WizardAction::SetDraftToken(token) => Ok(self.set_draft_token(state, token.clone())),
            WizardAction::Navigate(event) => {
                let outcome = self.navigate(state, event)?;
                let mut next = state.clone();
                next.step = outcome.to;
                Ok(WizardUpdate::applied(next))
            }
            WizardAction::Reset => Ok(WizardUpdate::applied(self.reset())),
        }
    }

    pub fn apply_with_audit<S>(
        &self,
        state: &WizardState,
        action: &WizardAction,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WizardUpdate, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(state, action);
        match &result {
            Ok(update) => {
                let (event_type, outcome) = match update.outcome {
                    WizardOutcome::Applied => ("wizard.action_applied", AuditOutcome::Success),
                    WizardOutcome::Ignored(_) => ("wizard.action_ignored", AuditOutcome::Ignored),
                };
                let mut event = AuditEvent::new(audit, event_type, AuditCategory::Wizard, outcome)
                    .with_metadata("action", action.name())
                    .with_metadata("step", update.state.step.to_string());
                if let Some(totals) = &update.state.totals {
                    event = event
                        .with_metadata("total", totals.total.to_string())
                        .with_metadata("deposit", totals.deposit.to_string());
                }
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.action_rejected",
                        AuditCategory::Wizard,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("action", action.name())
                    .with_metadata("kind", error.kind())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Replaces the tier and resets the selection to the tier's bundled features.
    pub fn set_tier(&self, state: &WizardState, id: &str) -> Result<WizardUpdate, DomainError> {
        let tier = self.catalog.get_tier(id)?.id;

        let mut next = state.clone();
        next.tier = Some(tier);
        next.selected_feature_ids = self.catalog.locked_features_for(tier);
        self.recompute(&mut next)?;
        Ok(WizardUpdate::applied(next))
    }

    pub fn toggle_feature(
        &self,
        state: &WizardState,
        id: &str,
    ) -> Result<WizardUpdate, DomainError> {
        let feature = self.catalog.get_feature(id)?;
        let tier = state.tier.ok_or(DomainError::TierRequired)?;

        if feature.is_locked_for(tier) {
            return Ok(WizardUpdate {
                state: state.clone(),
                outcome: WizardOutcome::Ignored(IgnoreReason::LockedFeature),
            });
        }

        let mut next = state.clone();
        if !next.selected_feature_ids.remove(&feature.id) {
            next.selected_feature_ids.insert(feature.id.clone());
        }
        self.recompute(&mut next)?;
        Ok(WizardUpdate::applied(next))
    }

    pub fn set_rush(&self, state: &WizardState, rush: bool) -> Result<WizardUpdate, DomainError> {
        let mut next = state.clone();
        next.rush_requested = rush;
        self.recompute(&mut next)?;
        Ok(WizardUpdate::applied(next))
    }

    pub fn set_maintenance_plan(
        &self,
        state: &WizardState,
        id: &str,
    ) -> Result<WizardUpdate, DomainError> {
        let plan = self.catalog.get_maintenance_plan(id)?;

        let mut next = state.clone();
        next.maintenance_plan = plan.id.clone();
        self.recompute(&mut next)?;
        Ok(WizardUpdate::applied(next))
    }

    pub fn set_questionnaire_answers(
        &self,
        state: &WizardState,
        partial: &Map<String, Value>,
    ) -> Result<WizardUpdate, DomainError> {
        let answers = state.questionnaire_answers.merge(partial)?;

        let mut next = state.clone();
        next.questionnaire_answers = answers;
        Ok(WizardUpdate::applied(next))
    }

    pub fn set_contact(
        &self,
        state: &WizardState,
        contact: Contact,
    ) -> Result<WizardUpdate, DomainError> {
        let contact = contact.normalized()?;

        let mut next = state.clone();
        next.contact = Some(contact);
        Ok(WizardUpdate::applied(next))
    }

    /// `Paid` is only ever set by the payment collaborator.
    pub fn set_status(
        &self,
        state: &WizardState,
        status: SubmissionStatus,
    ) -> Result<WizardUpdate, DomainError> {
        if status == SubmissionStatus::Paid {
            return Err(DomainError::ReservedStatus(status));
        }

        let mut next = state.clone();
        next.status = status;
        Ok(WizardUpdate::applied(next))
    }

    pub fn set_draft_token(&self, state: &WizardState, token: DraftToken) -> WizardUpdate {
        let mut next = state.clone();
        next.draft_token = Some(token);
        WizardUpdate::applied(next)
    }

    pub fn reset(&self) -> WizardState {
        self.initial_state()
    }

    pub fn navigate(
        &self,
        state: &WizardState,
        event: &WizardEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let current = state.step;
        let invalid = || FlowTransitionError::InvalidTransition { step: current, event: *event };

        let to = match event {
            WizardEvent::Next => {
                let missing = missing_fields_before_leaving(state);
                if !missing.is_empty() {
                    return Err(FlowTransitionError::MissingRequiredFields {
                        step: current,
                        missing_fields: missing,
                    });
                }
                current.next().ok_or_else(invalid)?
            }
            WizardEvent::Back => current.previous().ok_or_else(invalid)?,
            WizardEvent::GoTo(target) if *target < current => *target,
            WizardEvent::GoTo(_) => return Err(invalid()),
        };

        Ok(TransitionOutcome { from: current, to, event: *event })
    }

    /// Re-derives totals for a state loaded from storage, rejecting stale references.
    pub fn refresh(&self, state: &WizardState) -> Result<WizardState, DomainError> {
        self.catalog.get_maintenance_plan(state.maintenance_plan.as_str())?;
        let mut next = state.clone();
        self.recompute(&mut next)?;
        Ok(next)
    }

    fn recompute(&self, state: &mut WizardState) -> Result<(), DomainError> {
        state.totals = match state.tier {
            Some(tier) => {
                let selection = QuoteSelection {
                    tier,
                    selected_feature_ids: state.selected_feature_ids.clone(),
                    rush_requested: state.rush_requested,
                    maintenance_plan: state.maintenance_plan.clone(),
                };
                Some(self.pricing.price(&self.catalog, &selection)?.totals)
            }
            None => None,
        };
        Ok(())
    }
}

fn missing_fields_before_leaving(state: &WizardState) -> Vec<String> {
    let mut missing = Vec::new();
    match state.step {
        WizardStep::TierSelection if state.tier.is_none() => missing.push("tier".to_string()),
        WizardStep::Contact if state.contact.is_none() => missing.push("contact".to_string()),
        _ => {}
    }
    missing
}
