use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Row};

use quoteflow_core::domain::draft::{DraftRecord, DraftToken};

use super::{DraftRepository, RepositoryError};
use crate::DbPool;

const SELECT_DRAFT: &str = "SELECT token, contact_email, payload_json, estimate_cents,
                                   deposit_cents, created_at, updated_at
                            FROM quote_draft
                            WHERE token = ?";

pub struct SqlDraftRepository {
    pool: DbPool,
}

impl SqlDraftRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DraftRepository for SqlDraftRepository {
    async fn find_by_token(
        &self,
        token: &DraftToken,
    ) -> Result<Option<DraftRecord>, RepositoryError> {
        let row =
            sqlx::query(SELECT_DRAFT).bind(token.as_str()).fetch_optional(&self.pool).await?;

        row.map(draft_from_row).transpose()
    }

    async fn insert_if_absent(&self, draft: &DraftRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO quote_draft (
                token, contact_email, payload_json, estimate_cents, deposit_cents,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(token) DO NOTHING",
        )
        .bind(draft.token.as_str())
        .bind(&draft.contact_email_or_placeholder)
        .bind(encode_payload(&draft.payload)?)
        .bind(to_i64("estimate_cents", draft.estimate_cents)?)
        .bind(to_i64("deposit_cents", draft.deposit_cents)?)
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn merge(
        &self,
        token: &DraftToken,
        partial: &Value,
        now: DateTime<Utc>,
    ) -> Result<Option<DraftRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before the read, so merges serialize.
        let claimed = sqlx::query("UPDATE quote_draft SET updated_at = updated_at WHERE token = ?")
            .bind(token.as_str())
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(SELECT_DRAFT).bind(token.as_str()).fetch_one(&mut *tx).await?;
        let mut draft = draft_from_row(row)?;
        draft.apply_partial(partial, now)?;

        sqlx::query(
            "UPDATE quote_draft
             SET contact_email = ?, payload_json = ?, estimate_cents = ?, deposit_cents = ?,
                 updated_at = ?
             WHERE token = ?",
        )
        .bind(&draft.contact_email_or_placeholder)
        .bind(encode_payload(&draft.payload)?)
        .bind(to_i64("estimate_cents", draft.estimate_cents)?)
        .bind(to_i64("deposit_cents", draft.deposit_cents)?)
        .bind(draft.updated_at.to_rfc3339())
        .bind(draft.token.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(draft))
    }
}

fn draft_from_row(row: SqliteRow) -> Result<DraftRecord, RepositoryError> {
    let payload_raw = row.try_get::<String, _>("payload_json")?;
    let payload = match serde_json::from_str::<Value>(&payload_raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(RepositoryError::Decode(format!(
                "draft payload must be a JSON object, found `{other}`"
            )))
        }
        Err(error) => {
            return Err(RepositoryError::Decode(format!("invalid draft payload json: {error}")))
        }
    };

    Ok(DraftRecord {
        token: DraftToken::new(row.try_get::<String, _>("token")?),
        contact_email_or_placeholder: row.try_get("contact_email")?,
        payload,
        estimate_cents: parse_u64("estimate_cents", row.try_get("estimate_cents")?)?,
        deposit_cents: parse_u64("deposit_cents", row.try_get("deposit_cents")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn encode_payload(payload: &Map<String, Value>) -> Result<String, RepositoryError> {
    serde_json::to_string(payload).map_err(|error| RepositoryError::Encode(error.to_string()))
}

fn to_i64(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| {
        RepositoryError::Encode(format!("value for `{column}` does not fit in i64: {value}"))
    })
}

fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative integer): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
