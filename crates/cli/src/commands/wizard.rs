use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use quoteflow_core::audit::{AuditContext, InMemoryAuditSink};
use quoteflow_core::flows::{
    JsonFileWizardStorage, SessionError, WizardAction, WizardEngine, WizardOutcome, WizardSession,
};
use quoteflow_core::DeterministicPricingEngine;
use serde::Serialize;
use serde_json::json;

use crate::commands::{load_catalog, load_config, CommandResult};

#[derive(Debug, Clone)]
pub struct WizardArgs {
    /// JSON file standing in for the browser tab's session storage.
    pub storage: PathBuf,
    /// JSON array of wizard actions to dispatch in order.
    pub script: Option<PathBuf>,
    pub reset: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepReport {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<WizardOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Replays a script against the persisted wizard. Rejected actions are reported and skipped,
/// storage failures abort the run.
pub fn run(args: WizardArgs) -> CommandResult {
    let config = match load_config("wizard") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let catalog = match load_catalog("wizard", &config) {
        Ok(catalog) => catalog,
        Err(failure) => return failure,
    };
    let actions = match args.script.as_deref().map(read_script).transpose() {
        Ok(actions) => actions.unwrap_or_default(),
        Err(error) => return CommandResult::failure("wizard", "script", format!("{error:#}"), 8),
    };

    let engine = WizardEngine::new(catalog, DeterministicPricingEngine::new(config.pricing));
    let audit = InMemoryAuditSink::default();
    let session = match WizardSession::open(engine, JsonFileWizardStorage::new(&args.storage)) {
        Ok(session) => session,
        Err(error) => return storage_failure(&error),
    };
    let mut session =
        session.with_audit(Arc::new(audit.clone()), AuditContext::new(None, "cli-wizard", "cli"));

    if args.reset {
        if let Err(error) = session.reset() {
            return storage_failure(&error);
        }
    }

    let mut steps = Vec::with_capacity(actions.len());
    for action in actions {
        let name = action.name();
        match session.dispatch(action) {
            Ok(outcome) => steps.push(StepReport {
                action: name,
                outcome: Some(outcome),
                error_kind: None,
                error: None,
            }),
            Err(SessionError::Domain(error)) => steps.push(StepReport {
                action: name,
                outcome: None,
                error_kind: Some(error.kind()),
                error: Some(error.to_string()),
            }),
            Err(error) => return storage_failure(&error),
        }
    }

    let rejected = steps.iter().filter(|step| step.error_kind.is_some()).count();
    CommandResult::with_data(
        "wizard",
        format!(
            "dispatched {} actions ({rejected} rejected), wizard at step {}",
            steps.len(),
            session.state().step
        ),
        json!({
            "state": session.state(),
            "steps": steps,
            "draftSnapshot": session.draft_snapshot(),
            "auditEvents": audit.events().len(),
        }),
    )
}

fn read_script(path: &Path) -> anyhow::Result<Vec<WizardAction>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read wizard script `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("wizard script `{}` is not a list of actions", path.display()))
}

fn storage_failure(error: &SessionError) -> CommandResult {
    CommandResult::failure("wizard", "wizard_storage", error.to_string(), 9)
}
