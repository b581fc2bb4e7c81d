//! Durable side of the wizard: one draft record per token, merged last-write-wins.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use quoteflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use quoteflow_core::domain::draft::{DraftRecord, DraftToken};
use quoteflow_core::errors::{ApplicationError, DomainError};

use crate::repositories::{DraftRepository, RepositoryError};

const MAX_TOKEN_ATTEMPTS: usize = 3;
const AUDIT_ACTOR: &str = "draft_sync";

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Rejected(error) => ApplicationError::Domain(error),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct DraftSyncService {
    repository: Arc<dyn DraftRepository>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl DraftSyncService {
    pub fn new(repository: Arc<dyn DraftRepository>) -> Self {
        Self { repository, audit: None }
    }

    /// Draft audit events correlate on the draft token.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Returns the record behind `known_token` when it resolves, otherwise creates a record
    /// under a freshly generated token. Unresolvable tokens are never adopted.
    pub async fn ensure_draft(
        &self,
        known_token: Option<&DraftToken>,
    ) -> Result<DraftRecord, ApplicationError> {
        self.ensure_draft_from(known_token.map(std::slice::from_ref).unwrap_or_default()).await
    }

    /// Like [`Self::ensure_draft`], trying each candidate in order before creating a record.
    pub async fn ensure_draft_from(
        &self,
        candidates: &[DraftToken],
    ) -> Result<DraftRecord, ApplicationError> {
        for token in candidates {
            if let Some(existing) = self.repository.find_by_token(token).await? {
                info!(
                    event_name = "draft.ensure.reused",
                    draft_token = %existing.token,
                    "existing draft reused"
                );
                return Ok(existing);
            }
        }

        let stale_token_supplied = !candidates.is_empty();
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let draft = DraftRecord::new(DraftToken::generate(), Utc::now());
            if self.repository.insert_if_absent(&draft).await? {
                info!(
                    event_name = "draft.ensure.created",
                    draft_token = %draft.token,
                    stale_token_supplied,
                    "draft created"
                );
                self.record(&draft.token, "draft.created", AuditOutcome::Success, |event| {
                    event.with_metadata("stale_token_supplied", stale_token_supplied.to_string())
                });
                return Ok(draft);
            }
            warn!(
                event_name = "draft.ensure.token_collision",
                draft_token = %draft.token,
                "generated draft token already taken, retrying"
            );
        }

        Err(ApplicationError::Persistence(format!(
            "could not allocate a unique draft token after {MAX_TOKEN_ATTEMPTS} attempts"
        )))
    }

    /// Shallow-merges `partial` into an existing draft. Unknown tokens are reported, never
    /// created. The repository applies the merge atomically, so overlapping merges on one
    /// draft keep each other's keys.
    pub async fn merge_draft(
        &self,
        token: &DraftToken,
        partial: &Value,
    ) -> Result<DraftRecord, ApplicationError> {
        let Some(keys) = partial.as_object().map(|object| object.len()) else {
            return Err(DomainError::InvalidPayload(
                "draft payload must be a JSON object".to_string(),
            )
            .into());
        };

        let Some(draft) = self.repository.merge(token, partial, Utc::now()).await? else {
            self.record(token, "draft.merge_rejected", AuditOutcome::Rejected, |event| {
                event.with_metadata("reason", "not_found")
            });
            return Err(DomainError::DraftNotFound(token.clone()).into());
        };

        info!(
            event_name = "draft.merge.applied",
            draft_token = %draft.token,
            keys,
            estimate_cents = draft.estimate_cents,
            "draft merged"
        );
        self.record(&draft.token, "draft.merged", AuditOutcome::Success, |event| {
            event
                .with_metadata("keys", keys.to_string())
                .with_metadata("has_contact", draft.has_contact().to_string())
                .with_metadata("estimate_cents", draft.estimate_cents.to_string())
        });
        Ok(draft)
    }

    pub async fn get_draft(&self, token: &DraftToken) -> Result<DraftRecord, ApplicationError> {
        self.repository
            .find_by_token(token)
            .await?
            .ok_or_else(|| DomainError::DraftNotFound(token.clone()).into())
    }

    fn record(
        &self,
        token: &DraftToken,
        event_type: &str,
        outcome: AuditOutcome,
        decorate: impl FnOnce(AuditEvent) -> AuditEvent,
    ) {
        if let Some(sink) = &self.audit {
            let context = AuditContext::new(Some(token.clone()), token.as_str(), AUDIT_ACTOR);
            sink.emit(decorate(AuditEvent::new(
                &context,
                event_type,
                AuditCategory::Draft,
                outcome,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    use quoteflow_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use quoteflow_core::domain::draft::{DraftRecord, DraftToken, DRAFT_EMAIL_PLACEHOLDER};
    use quoteflow_core::errors::{ApplicationError, DomainError};

    use super::DraftSyncService;
    use crate::repositories::{
        DraftRepository, InMemoryDraftRepository, RepositoryError, SqlDraftRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    /// Stalls every read so concurrent calls overlap.
    #[derive(Default)]
    struct DelayedRepository {
        inner: InMemoryDraftRepository,
    }

    const DELAY: Duration = Duration::from_millis(50);

    #[async_trait]
    impl DraftRepository for DelayedRepository {
        async fn find_by_token(
            &self,
            token: &DraftToken,
        ) -> Result<Option<DraftRecord>, RepositoryError> {
            tokio::time::sleep(DELAY).await;
            self.inner.find_by_token(token).await
        }

        async fn insert_if_absent(&self, draft: &DraftRecord) -> Result<bool, RepositoryError> {
            self.inner.insert_if_absent(draft).await
        }

        async fn merge(
            &self,
            token: &DraftToken,
            partial: &Value,
            now: DateTime<Utc>,
        ) -> Result<Option<DraftRecord>, RepositoryError> {
            tokio::time::sleep(DELAY).await;
            self.inner.merge(token, partial, now).await
        }
    }

    async fn sql_service() -> (DraftSyncService, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (DraftSyncService::new(Arc::new(SqlDraftRepository::new(pool.clone()))), pool)
    }

    fn memory_service() -> (DraftSyncService, Arc<InMemoryDraftRepository>) {
        let repository = Arc::new(InMemoryDraftRepository::default());
        (DraftSyncService::new(repository.clone()), repository)
    }

    #[tokio::test]
    async fn ensure_with_known_token_returns_the_same_record() {
        let (service, pool) = sql_service().await;

        let created = service.ensure_draft(None).await.expect("create");
        let again = service.ensure_draft(Some(&created.token)).await.expect("reuse");

        assert_eq!(again, created);
        assert_eq!(again.contact_email_or_placeholder, DRAFT_EMAIL_PLACEHOLDER);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quote_draft")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn ensure_without_token_always_creates_distinct_drafts() {
        let (service, repository) = memory_service();

        let mut tokens = BTreeSet::new();
        for _ in 0..5 {
            tokens.insert(service.ensure_draft(None).await.expect("create").token);
        }

        assert_eq!(tokens.len(), 5);
        assert_eq!(repository.len().await, 5);
    }

    #[tokio::test]
    async fn ensure_with_stale_token_issues_a_new_one() {
        let (service, repository) = memory_service();
        let stale = DraftToken::new("stale-token");

        let created = service.ensure_draft(Some(&stale)).await.expect("create");

        assert_ne!(created.token, stale);
        assert_eq!(repository.len().await, 1);
    }

    #[tokio::test]
    async fn merge_on_unknown_token_is_not_found_and_creates_nothing() {
        let (service, repository) = memory_service();
        let token = DraftToken::new("never-issued");

        let error = service.merge_draft(&token, &json!({"tier": "pro"})).await.expect_err("404");

        assert_eq!(error, ApplicationError::Domain(DomainError::DraftNotFound(token)));
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn merge_rejects_non_object_payloads() {
        let (service, _repository) = memory_service();
        let draft = service.ensure_draft(None).await.expect("create");

        for payload in [json!([1, 2]), json!("tier"), Value::Null] {
            let error = service.merge_draft(&draft.token, &payload).await.expect_err("invalid");
            assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidPayload(_))));
        }
    }

    #[tokio::test]
    async fn merges_are_shallow_and_last_write_wins() {
        let (service, pool) = sql_service().await;
        let draft = service.ensure_draft(None).await.expect("create");

        service
            .merge_draft(
                &draft.token,
                &json!({
                    "tier": "pro",
                    "questionnaireAnswers": {"industry": "retail", "pages": 8},
                }),
            )
            .await
            .expect("first merge");
        let merged = service
            .merge_draft(
                &draft.token,
                &json!({
                    "questionnaireAnswers": {"pages": 12},
                    "rushRequested": null,
                    "contact": {"name": "Lee", "email": "LEE@example.com"},
                    "totals": {"total": 287500, "deposit": 71875},
                }),
            )
            .await
            .expect("second merge");

        assert_eq!(merged.payload.get("tier"), Some(&json!("pro")));
        assert_eq!(merged.payload.get("questionnaireAnswers"), Some(&json!({"pages": 12})));
        assert_eq!(merged.payload.get("rushRequested"), Some(&Value::Null));
        assert_eq!(merged.contact_email_or_placeholder, "lee@example.com");
        assert_eq!(merged.estimate_cents, 287500);
        assert_eq!(merged.deposit_cents, 71875);
        assert!(merged.updated_at >= draft.updated_at);
        assert_eq!(merged.created_at, draft.created_at);

        let fetched = service.get_draft(&draft.token).await.expect("get");
        assert_eq!(fetched, merged);

        pool.close().await;
    }

    #[tokio::test]
    async fn get_unknown_draft_is_not_found() {
        let (service, _repository) = memory_service();

        let error = service.get_draft(&DraftToken::new("missing")).await.expect_err("missing");

        assert_eq!(error.to_string(), "draft `missing` not found");
    }

    #[tokio::test]
    async fn overlapping_merges_keep_disjoint_keys() {
        let service = DraftSyncService::new(Arc::new(DelayedRepository::default()));
        let draft = service.ensure_draft(None).await.expect("create");

        let tier = json!({"tier": "pro"});
        let contact = json!({"contact": {"name": "Ana", "email": "ana@example.com"}});
        let (first, second) = tokio::join!(
            service.merge_draft(&draft.token, &tier),
            service.merge_draft(&draft.token, &contact),
        );
        first.expect("tier merge");
        second.expect("contact merge");

        let stored = service.get_draft(&draft.token).await.expect("get");
        assert_eq!(stored.payload.get("tier"), Some(&json!("pro")));
        assert_eq!(stored.payload["contact"]["name"], json!("Ana"));
        assert_eq!(stored.contact_email_or_placeholder, "ana@example.com");
    }

    #[tokio::test]
    async fn draft_lifecycle_is_audited() {
        let sink = InMemoryAuditSink::default();
        let service = DraftSyncService::new(Arc::new(InMemoryDraftRepository::default()))
            .with_audit(Arc::new(sink.clone()));

        let draft = service.ensure_draft(None).await.expect("create");
        service.ensure_draft(Some(&draft.token)).await.expect("reuse");
        service.merge_draft(&draft.token, &json!({"tier": "elite"})).await.expect("merge");
        service
            .merge_draft(&DraftToken::new("ghost"), &json!({"tier": "pro"}))
            .await
            .expect_err("unknown token");

        let events = sink.events();
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(types, ["draft.created", "draft.merged", "draft.merge_rejected"]);
        assert!(events.iter().all(|event| event.category == AuditCategory::Draft));
        assert_eq!(events[1].draft_token.as_ref(), Some(&draft.token));
        assert_eq!(events[1].metadata.get("has_contact").map(String::as_str), Some("false"));
        assert_eq!(events[2].outcome, AuditOutcome::Rejected);
    }
}
