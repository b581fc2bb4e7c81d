use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use quoteflow_core::domain::draft::{DraftRecord, DraftToken};
use quoteflow_core::errors::DomainError;

pub mod draft;
pub mod memory;

pub use draft::SqlDraftRepository;
pub use memory::InMemoryDraftRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error(transparent)]
    Rejected(#[from] DomainError),
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn find_by_token(&self, token: &DraftToken)
        -> Result<Option<DraftRecord>, RepositoryError>;

    /// Returns `false` when a record with the same token already exists.
    async fn insert_if_absent(&self, draft: &DraftRecord) -> Result<bool, RepositoryError>;

    /// Applies `partial` to the stored record as one atomic read-modify-write, so overlapping
    /// merges on the same token each see the other's keys. `None` when the token is unknown.
    async fn merge(
        &self,
        token: &DraftToken,
        partial: &Value,
        now: DateTime<Utc>,
    ) -> Result<Option<DraftRecord>, RepositoryError>;
}
