use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use quoteflow_core::domain::draft::{DraftRecord, DraftToken};

use super::{DraftRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryDraftRepository {
    drafts: RwLock<HashMap<String, DraftRecord>>,
}

impl InMemoryDraftRepository {
    pub async fn len(&self) -> usize {
        self.drafts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drafts.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl DraftRepository for InMemoryDraftRepository {
    async fn find_by_token(
        &self,
        token: &DraftToken,
    ) -> Result<Option<DraftRecord>, RepositoryError> {
        let drafts = self.drafts.read().await;
        Ok(drafts.get(token.as_str()).cloned())
    }

    async fn insert_if_absent(&self, draft: &DraftRecord) -> Result<bool, RepositoryError> {
        let mut drafts = self.drafts.write().await;
        if drafts.contains_key(draft.token.as_str()) {
            return Ok(false);
        }
        drafts.insert(draft.token.0.clone(), draft.clone());
        Ok(true)
    }

    async fn merge(
        &self,
        token: &DraftToken,
        partial: &Value,
        now: DateTime<Utc>,
    ) -> Result<Option<DraftRecord>, RepositoryError> {
        let mut drafts = self.drafts.write().await;
        let Some(current) = drafts.get(token.as_str()) else {
            return Ok(None);
        };

        let mut merged = current.clone();
        merged.apply_partial(partial, now)?;
        drafts.insert(token.as_str().to_string(), merged.clone());
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use quoteflow_core::domain::draft::{DraftRecord, DraftToken};

    use super::InMemoryDraftRepository;
    use crate::repositories::{DraftRepository, RepositoryError};

    #[tokio::test]
    async fn in_memory_repo_never_replaces_on_insert() {
        let repo = InMemoryDraftRepository::default();
        let mut draft = DraftRecord::new(DraftToken::new("tok-mem"), Utc::now());

        assert!(repo.insert_if_absent(&draft).await.expect("insert"));
        draft.estimate_cents = 999;
        assert!(!repo.insert_if_absent(&draft).await.expect("duplicate insert"));

        let stored = repo.find_by_token(&draft.token).await.expect("find").expect("exists");
        assert_eq!(stored.estimate_cents, 0);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn merge_updates_in_place_and_skips_unknown_tokens() {
        let repo = InMemoryDraftRepository::default();
        let draft = DraftRecord::new(DraftToken::new("tok-mem-merge"), Utc::now());
        repo.insert_if_absent(&draft).await.expect("insert");

        let merged = repo
            .merge(&draft.token, &json!({"totals": {"total": 999, "deposit": 250}}), Utc::now())
            .await
            .expect("merge")
            .expect("known token");
        assert_eq!(merged.estimate_cents, 999);

        let stored = repo.find_by_token(&draft.token).await.expect("find").expect("exists");
        assert_eq!(stored, merged);

        let missing = repo
            .merge(&DraftToken::new("nope"), &json!({"tier": "pro"}), Utc::now())
            .await
            .expect("merge");
        assert!(missing.is_none());
        assert_eq!(repo.len().await, 1);

        let error = repo.merge(&draft.token, &json!([1]), Utc::now()).await.expect_err("array");
        assert!(matches!(error, RepositoryError::Rejected(_)));
        let stored = repo.find_by_token(&draft.token).await.expect("find").expect("exists");
        assert_eq!(stored, merged);
    }
}
