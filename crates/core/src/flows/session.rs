use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::audit::{AuditContext, AuditSink};
use crate::cpq::pricing::{DeterministicPricingEngine, PricingEngine};
use crate::domain::customer::Contact;
use crate::domain::draft::DraftToken;
use crate::errors::DomainError;
use crate::flows::engine::WizardEngine;
use crate::flows::states::{
    SubmissionStatus, WizardAction, WizardEvent, WizardOutcome, WizardState, WizardStep,
};
use crate::flows::storage::{StorageError, WizardStorage, WIZARD_STORAGE_KEY};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("could not encode wizard state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One tab's wizard: the reducer, its current state and where that state is kept.
///
/// Successful mutations are written through to storage before they become
/// visible, so a reload always sees the last applied state.
pub struct WizardSession<S, P = DeterministicPricingEngine> {
    engine: WizardEngine<P>,
    storage: S,
    state: WizardState,
    audit: Option<(Arc<dyn AuditSink>, AuditContext)>,
}

impl<S, P> WizardSession<S, P>
where
    S: WizardStorage,
    P: PricingEngine,
{
    /// Rehydrates from storage. Unreadable or stale state is dropped and the wizard starts over.
    pub fn open(engine: WizardEngine<P>, storage: S) -> Result<Self, SessionError> {
        let state = match storage.load(WIZARD_STORAGE_KEY)? {
            None => engine.initial_state(),
            Some(raw) => match restore(&engine, &raw) {
                Ok(state) => {
                    debug!(
                        event_name = "wizard.state.rehydrated",
                        step = %state.step,
                        "wizard state restored from storage"
                    );
                    state
                }
                Err(reason) => {
                    warn!(
                        event_name = "wizard.state.discarded",
                        reason = %reason,
                        "discarding unusable wizard state"
                    );
                    storage.remove(WIZARD_STORAGE_KEY)?;
                    engine.initial_state()
                }
            },
        };

        Ok(Self { engine, storage, state, audit: None })
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some((sink, context));
        self
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn engine(&self) -> &WizardEngine<P> {
        &self.engine
    }

    pub fn dispatch(&mut self, action: WizardAction) -> Result<WizardOutcome, SessionError> {
        let update = match &self.audit {
            Some((sink, context)) => {
                let mut context = context.clone();
                if self.state.draft_token.is_some() {
                    context.draft_token = self.state.draft_token.clone();
                }
                self.engine.apply_with_audit(&self.state, &action, sink.as_ref(), &context)?
            }
            None => self.engine.apply(&self.state, &action)?,
        };

        if matches!(action, WizardAction::Reset) {
            self.storage.remove(WIZARD_STORAGE_KEY)?;
        } else if update.outcome == WizardOutcome::Applied {
            let raw = serde_json::to_string(&update.state)?;
            self.storage.save(WIZARD_STORAGE_KEY, &raw)?;
            debug!(
                event_name = "wizard.state.persisted",
                action = action.name(),
                step = %update.state.step,
                "wizard state persisted"
            );
        }

        self.state = update.state;
        Ok(update.outcome)
    }

    pub fn set_tier(&mut self, id: &str) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetTier(id.to_string()))
    }

    pub fn toggle_feature(&mut self, id: &str) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::ToggleFeature(id.to_string()))
    }

    pub fn set_rush(&mut self, rush: bool) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetRush(rush))
    }

    pub fn set_maintenance_plan(&mut self, id: &str) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetMaintenancePlan(id.to_string()))
    }

    pub fn set_questionnaire_answers(
        &mut self,
        partial: Map<String, Value>,
    ) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetQuestionnaireAnswers(partial))
    }

    pub fn set_contact(&mut self, contact: Contact) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetContact(contact))
    }

    pub fn set_status(&mut self, status: SubmissionStatus) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetStatus(status))
    }

    pub fn set_draft_token(&mut self, token: DraftToken) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::SetDraftToken(token))
    }

    pub fn next(&mut self) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::Navigate(WizardEvent::Next))
    }

    pub fn back(&mut self) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::Navigate(WizardEvent::Back))
    }

    pub fn go_to(&mut self, step: WizardStep) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::Navigate(WizardEvent::GoTo(step)))
    }

    /// Clears stored state and the draft token.
    pub fn reset(&mut self) -> Result<WizardOutcome, SessionError> {
        self.dispatch(WizardAction::Reset)
    }

    pub fn draft_snapshot(&self) -> Value {
        self.state.draft_snapshot()
    }
}

fn restore<P: PricingEngine>(engine: &WizardEngine<P>, raw: &str) -> Result<WizardState, String> {
    let state: WizardState = serde_json::from_str(raw).map_err(|error| error.to_string())?;
    engine.refresh(&state).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::{SessionError, WizardSession};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::cpq::catalog::Catalog;
    use crate::cpq::pricing::DeterministicPricingEngine;
    use crate::domain::customer::Contact;
    use crate::domain::draft::DraftToken;
    use crate::domain::product::{FeatureId, TierId};
    use crate::errors::DomainError;
    use crate::flows::engine::WizardEngine;
    use crate::flows::states::{IgnoreReason, WizardOutcome, WizardStep};
    use crate::flows::storage::{
        InMemoryWizardStorage, JsonFileWizardStorage, WizardStorage, WIZARD_STORAGE_KEY,
    };

    fn engine() -> WizardEngine {
        let catalog = Catalog::standard().expect("standard catalog is valid");
        WizardEngine::new(catalog, DeterministicPricingEngine::default())
    }

    fn open(storage: &InMemoryWizardStorage) -> WizardSession<InMemoryWizardStorage> {
        WizardSession::open(engine(), storage.clone()).expect("session opens")
    }

    #[test]
    fn state_survives_a_reload() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("starter").expect("tier");
        session.toggle_feature("ecommerce").expect("feature");
        session.set_rush(true).expect("rush");
        session.next().expect("next");

        let reloaded = open(&storage);

        assert_eq!(reloaded.state(), session.state());
        assert_eq!(reloaded.state().step, WizardStep::FeatureSelection);
        assert_eq!(reloaded.state().totals.as_ref().map(|totals| totals.addons), Some(60_000));
    }

    #[test]
    fn questionnaire_answers_survive_a_reload() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("pro").expect("tier");

        let answers = json!({ "industry": "retail", " industry": 42 });
        let error = session
            .set_questionnaire_answers(answers.as_object().cloned().unwrap_or_default())
            .expect_err("padded key is validated as the typed field");
        assert!(matches!(error, SessionError::Domain(DomainError::InvalidQuestionnaire { .. })));

        let answers = json!({ "industry": "retail", " budgetNotes": "flexible" });
        session
            .set_questionnaire_answers(answers.as_object().cloned().unwrap_or_default())
            .expect("answers");

        let reloaded = open(&storage);

        assert_eq!(reloaded.state().tier, Some(TierId::Pro));
        assert_eq!(reloaded.state().questionnaire_answers.industry.as_deref(), Some("retail"));
        assert_eq!(reloaded.state(), session.state());
    }

    #[test]
    fn rejected_mutation_is_not_persisted() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("elite").expect("tier");
        let before = storage.load(WIZARD_STORAGE_KEY).expect("load");

        let error = session.toggle_feature("ecommerce").expect_err("over cap");

        assert!(matches!(error, SessionError::Domain(DomainError::AddonsCapExceeded { .. })));
        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("load"), before);
        assert!(!session.state().selected_feature_ids.contains(&FeatureId::new("ecommerce")));
    }

    #[test]
    fn locked_toggle_is_reported_and_keeps_selection() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("pro").expect("tier");
        let before = session.state().clone();

        let outcome = session.toggle_feature("custom_branding").expect("locked toggle");

        assert_eq!(outcome, WizardOutcome::Ignored(IgnoreReason::LockedFeature));
        assert_eq!(session.state(), &before);
        assert_eq!(session.state().tier, Some(TierId::Pro));
    }

    #[test]
    fn corrupt_state_is_discarded() {
        let storage = InMemoryWizardStorage::default();
        storage.save(WIZARD_STORAGE_KEY, "{\"step\": 9}").expect("seed corrupt state");

        let session = open(&storage);

        assert_eq!(session.state(), &engine().initial_state());
        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("load"), None);
    }

    #[test]
    fn state_naming_a_retired_plan_is_discarded() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("pro").expect("tier");
        let raw = storage.load(WIZARD_STORAGE_KEY).expect("load").expect("stored");
        let stale = raw.replace("\"basic\"", "\"legacy\"");
        storage.save(WIZARD_STORAGE_KEY, &stale).expect("seed stale state");

        let reloaded = open(&storage);

        assert_eq!(reloaded.state().tier, None);
    }

    #[test]
    fn reset_clears_storage_and_token() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("pro").expect("tier");
        session.set_draft_token(DraftToken::new("tok-1")).expect("token");

        session.reset().expect("reset");

        assert_eq!(session.state().draft_token, None);
        assert_eq!(session.state().tier, None);
        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("load"), None);
    }

    #[test]
    fn draft_snapshot_carries_contact_and_totals() {
        let storage = InMemoryWizardStorage::default();
        let mut session = open(&storage);
        session.set_tier("starter").expect("tier");
        session
            .set_contact(Contact {
                name: "Jane".to_string(),
                email: "jane@acme.com".to_string(),
                phone: None,
                company: Some("Acme".to_string()),
            })
            .expect("contact");
        session.set_draft_token(DraftToken::new("tok-2")).expect("token");

        let snapshot = session.draft_snapshot();

        assert_eq!(snapshot["contact"]["email"], json!("jane@acme.com"));
        assert_eq!(snapshot["totals"]["total"], json!(120_000));
        assert_eq!(snapshot["totals"]["deposit"], json!(30_000));
        assert!(snapshot.get("draftToken").is_none());
    }

    #[test]
    fn file_backed_session_rehydrates() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("wizard.json");

        let mut session =
            WizardSession::open(engine(), JsonFileWizardStorage::new(&path)).expect("open");
        session.set_tier("elite").expect("tier");
        session.set_maintenance_plan("premium").expect("plan");

        let reloaded =
            WizardSession::open(engine(), JsonFileWizardStorage::new(&path)).expect("reopen");
        assert_eq!(reloaded.state().maintenance_plan.as_str(), "premium");
        assert_eq!(reloaded.state().totals.as_ref().map(|totals| totals.monthly), Some(39_900));
    }

    #[test]
    fn audited_session_tags_events_with_the_draft_token() {
        let storage = InMemoryWizardStorage::default();
        let sink = InMemoryAuditSink::default();
        let mut session = open(&storage)
            .with_audit(Arc::new(sink.clone()), AuditContext::new(None, "req-1", "test"));

        session.set_draft_token(DraftToken::new("tok-3")).expect("token");
        session.set_tier("pro").expect("tier");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].draft_token, Some(DraftToken::new("tok-3")));
    }
}
