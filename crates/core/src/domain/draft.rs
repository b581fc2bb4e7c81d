use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::DomainError;

/// Stored in place of a contact email until the customer reaches the contact step.
pub const DRAFT_EMAIL_PLACEHOLDER: &str = "pending@draft.invalid";

/// Opaque handle linking a browser tab's quote to its durable record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftToken(pub String);

impl DraftToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 128 random bits, hex encoded.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Rejects blank or oversized tokens before they reach storage.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let acceptable = !trimmed.is_empty()
            && trimmed.len() <= 128
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        acceptable.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub token: DraftToken,
    pub contact_email_or_placeholder: String,
    pub payload: Map<String, Value>,
    pub estimate_cents: u64,
    pub deposit_cents: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftRecord {
    pub fn new(token: DraftToken, now: DateTime<Utc>) -> Self {
        Self {
            token,
            contact_email_or_placeholder: DRAFT_EMAIL_PLACEHOLDER.to_string(),
            payload: Map::new(),
            estimate_cents: 0,
            deposit_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_contact(&self) -> bool {
        self.contact_email_or_placeholder != DRAFT_EMAIL_PLACEHOLDER
    }

    /// Last-write-wins shallow merge of a wizard snapshot.
    ///
    /// Top-level keys replace their stored value wholesale, nested objects are not
    /// combined. A contact email and the totals' `total`/`deposit` are mirrored onto
    /// the record columns when present.
    pub fn apply_partial(
        &mut self,
        partial: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let Value::Object(partial) = partial else {
            return Err(DomainError::InvalidPayload(
                "draft payload must be a JSON object".to_string(),
            ));
        };

        if let Some(email) = contact_email(partial) {
            self.contact_email_or_placeholder = email;
        }
        if let Some(totals) = partial.get("totals").and_then(Value::as_object) {
            if let Some(total) = totals.get("total").and_then(Value::as_u64) {
                self.estimate_cents = total;
            }
            if let Some(deposit) = totals.get("deposit").and_then(Value::as_u64) {
                self.deposit_cents = deposit;
            }
        }

        for (key, value) in partial {
            self.payload.insert(key.clone(), value.clone());
        }
        self.updated_at = now;
        Ok(())
    }
}

fn contact_email(partial: &Map<String, Value>) -> Option<String> {
    partial
        .get("contact")
        .and_then(|contact| contact.get("email"))
        .or_else(|| partial.get("email"))
        .and_then(Value::as_str)
        .map(|email| email.trim().to_ascii_lowercase())
        .filter(|email| !email.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{DraftRecord, DraftToken, DRAFT_EMAIL_PLACEHOLDER};
    use crate::errors::DomainError;

    #[test]
    fn generated_tokens_are_distinct_and_parseable() {
        let first = DraftToken::generate();
        let second = DraftToken::generate();

        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
        assert_eq!(DraftToken::parse(first.as_str()), Some(first));
    }

    #[test]
    fn parse_rejects_blank_and_odd_characters() {
        assert_eq!(DraftToken::parse("   "), None);
        assert_eq!(DraftToken::parse("abc;drop"), None);
        assert_eq!(DraftToken::parse(&"x".repeat(129)), None);
        assert_eq!(DraftToken::parse(" abc-123 "), Some(DraftToken::new("abc-123")));
    }

    #[test]
    fn merge_mirrors_contact_and_totals() {
        let created = Utc::now();
        let mut record = DraftRecord::new(DraftToken::new("t1"), created);
        assert!(!record.has_contact());

        let later = created + Duration::seconds(5);
        record
            .apply_partial(
                &json!({
                    "contact": { "name": "Jane", "email": "Jane@Acme.com" },
                    "totals": { "total": 287_500, "deposit": 71_875 }
                }),
                later,
            )
            .expect("merge");

        assert_eq!(record.contact_email_or_placeholder, "jane@acme.com");
        assert_eq!(record.estimate_cents, 287_500);
        assert_eq!(record.deposit_cents, 71_875);
        assert_eq!(record.updated_at, later);
        assert_eq!(record.created_at, created);
    }

    #[test]
    fn nested_objects_are_replaced_not_deep_merged() {
        let now = Utc::now();
        let mut record = DraftRecord::new(DraftToken::new("t2"), now);

        record
            .apply_partial(
                &json!({ "questionnaire": { "industry": "retail", "goals": "sell" } }),
                now,
            )
            .expect("first merge");
        record
            .apply_partial(&json!({ "questionnaire": { "industry": "legal" }, "step": 2 }), now)
            .expect("second merge");

        assert_eq!(record.payload["questionnaire"], json!({ "industry": "legal" }));
        assert_eq!(record.payload["step"], json!(2));
    }

    #[test]
    fn repeated_merge_is_idempotent() {
        let now = Utc::now();
        let partial = json!({ "tier": "pro", "totals": { "total": 199_900, "deposit": 49_975 } });
        let mut once = DraftRecord::new(DraftToken::new("t3"), now);
        once.apply_partial(&partial, now).expect("merge");
        let mut twice = once.clone();
        twice.apply_partial(&partial, now).expect("merge again");

        assert_eq!(once, twice);
    }

    #[test]
    fn top_level_email_is_accepted_and_blank_ignored() {
        let now = Utc::now();
        let mut record = DraftRecord::new(DraftToken::new("t4"), now);

        record.apply_partial(&json!({ "email": "   " }), now).expect("blank email");
        assert_eq!(record.contact_email_or_placeholder, DRAFT_EMAIL_PLACEHOLDER);

        record.apply_partial(&json!({ "email": "ops@acme.com" }), now).expect("email");
        assert_eq!(record.contact_email_or_placeholder, "ops@acme.com");
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let now = Utc::now();
        let mut record = DraftRecord::new(DraftToken::new("t5"), now);

        let error = record.apply_partial(&json!(["not", "an", "object"]), now).expect_err("array");
        assert!(matches!(error, DomainError::InvalidPayload(_)));
        assert!(record.payload.is_empty());
    }
}
