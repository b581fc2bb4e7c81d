use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

const MAX_TEXT_LEN: usize = 5_000;
const MAX_LIST_LEN: usize = 20;
const MAX_EXTRA_KEY_LEN: usize = 64;
const MAX_PAGE_COUNT: u64 = 500;

/// Open-ended project answers from the third wizard step.
///
/// Known questions are typed and validated on merge. Anything else is kept
/// verbatim in `extra` so new questions can ship before this type learns them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_website: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitor_sites: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brand_colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_launch_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl QuestionnaireAnswers {
    /// Shallow merge: each key in `partial` replaces the stored answer, `null` clears it.
    /// Validation is all-or-nothing; on error `self` is untouched.
    pub fn merge(&self, partial: &Map<String, Value>) -> Result<Self, DomainError> {
        let mut next = self.clone();

        for (raw_key, value) in partial {
            // Padded keys resolve to the typed field they name, never to a shadow in `extra`.
            let key = raw_key.trim();
            match key {
                "businessName" => next.business_name = text(key, value)?,
                "industry" => next.industry = text(key, value)?,
                "targetAudience" => next.target_audience = text(key, value)?,
                "projectGoals" => next.project_goals = text(key, value)?,
                "existingWebsite" => next.existing_website = website(key, value)?,
                "competitorSites" => next.competitor_sites = text_list(key, value)?,
                "brandColors" => next.brand_colors = text_list(key, value)?,
                "desiredLaunchDate" => next.desired_launch_date = date(key, value)?,
                "estimatedPageCount" => next.estimated_page_count = page_count(key, value)?,
                "additionalNotes" => next.additional_notes = text(key, value)?,
                _ => {
                    if key.is_empty() || key.len() > MAX_EXTRA_KEY_LEN {
                        return Err(invalid(
                            raw_key,
                            "custom answer keys must be 1..=64 characters",
                        ));
                    }
                    if value.is_null() {
                        next.extra.remove(key);
                    } else {
                        next.extra.insert(key.to_string(), value.clone());
                    }
                }
            }
        }

        Ok(next)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> DomainError {
    DomainError::InvalidQuestionnaire { key: key.to_string(), reason: reason.into() }
}

fn text(key: &str, value: &Value) -> Result<Option<String>, DomainError> {
    match value {
        Value::Null => Ok(None),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.len() > MAX_TEXT_LEN {
                return Err(invalid(key, format!("must be at most {MAX_TEXT_LEN} characters")));
            }
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        _ => Err(invalid(key, "expected a string")),
    }
}

fn website(key: &str, value: &Value) -> Result<Option<String>, DomainError> {
    let url = text(key, value)?;
    if let Some(url) = &url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(invalid(key, "must start with http:// or https://"));
        }
    }
    Ok(url)
}

fn text_list(key: &str, value: &Value) -> Result<Vec<String>, DomainError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            if items.len() > MAX_LIST_LEN {
                return Err(invalid(key, format!("at most {MAX_LIST_LEN} entries are allowed")));
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(raw) if !raw.trim().is_empty() => {
                        out.push(raw.trim().to_string())
                    }
                    Value::String(_) => {}
                    _ => return Err(invalid(key, "expected a list of strings")),
                }
            }
            Ok(out)
        }
        _ => Err(invalid(key, "expected a list of strings")),
    }
}

fn date(key: &str, value: &Value) -> Result<Option<NaiveDate>, DomainError> {
    match text(key, value)? {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(key, "expected a date formatted as YYYY-MM-DD")),
    }
}

fn page_count(key: &str, value: &Value) -> Result<Option<u32>, DomainError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => match number.as_u64() {
            Some(count @ 1..=MAX_PAGE_COUNT) => Ok(Some(count as u32)),
            _ => Err(invalid(key, format!("expected a whole number in 1..={MAX_PAGE_COUNT}"))),
        },
        _ => Err(invalid(key, "expected a number")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::QuestionnaireAnswers;
    use crate::errors::DomainError;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn merges_known_and_custom_keys() {
        let answers = QuestionnaireAnswers::default()
            .merge(&object(json!({
                "businessName": "  Acme Bakery ",
                "brandColors": ["#ff0000", " ", "teal"],
                "desiredLaunchDate": "2026-12-01",
                "estimatedPageCount": 8,
                "favouriteFont": "Inter"
            })))
            .expect("valid answers");

        assert_eq!(answers.business_name.as_deref(), Some("Acme Bakery"));
        assert_eq!(answers.brand_colors, vec!["#ff0000".to_string(), "teal".to_string()]);
        assert_eq!(answers.desired_launch_date, NaiveDate::from_ymd_opt(2026, 12, 1));
        assert_eq!(answers.estimated_page_count, Some(8));
        assert_eq!(answers.extra.get("favouriteFont"), Some(&json!("Inter")));
    }

    #[test]
    fn later_merge_wins_and_null_clears() {
        let first = QuestionnaireAnswers::default()
            .merge(&object(json!({ "industry": "retail", "projectGoals": "sell online" })))
            .expect("first merge");
        let second = first
            .merge(&object(json!({ "industry": "hospitality", "projectGoals": null })))
            .expect("second merge");

        assert_eq!(second.industry.as_deref(), Some("hospitality"));
        assert_eq!(second.project_goals, None);
    }

    #[test]
    fn wrong_type_for_known_key_is_rejected_atomically() {
        let base = QuestionnaireAnswers::default()
            .merge(&object(json!({ "industry": "retail" })))
            .expect("base");

        let error = base
            .merge(&object(json!({ "industry": "legal", "estimatedPageCount": "many" })))
            .expect_err("page count must be numeric");

        assert!(matches!(
            error,
            DomainError::InvalidQuestionnaire { ref key, .. } if key == "estimatedPageCount"
        ));
        assert_eq!(base.industry.as_deref(), Some("retail"));
    }

    #[test]
    fn website_and_date_shapes_are_enforced() {
        let base = QuestionnaireAnswers::default();
        assert!(base.merge(&object(json!({ "existingWebsite": "acme.com" }))).is_err());
        assert!(base.merge(&object(json!({ "desiredLaunchDate": "next week" }))).is_err());
        assert!(base.merge(&object(json!({ "estimatedPageCount": 0 }))).is_err());
    }

    #[test]
    fn padded_keys_are_validated_as_the_typed_field() {
        let base = QuestionnaireAnswers::default()
            .merge(&object(json!({ "industry": "retail" })))
            .expect("base");

        let error = base
            .merge(&object(json!({ " industry": 42 })))
            .expect_err("padded typed key must still be a string");
        assert!(matches!(
            error,
            DomainError::InvalidQuestionnaire { ref key, .. } if key == "industry"
        ));

        let padded = base
            .merge(&object(json!({ "industry ": "legal", " budgetNotes ": "tight" })))
            .expect("padded keys merge");
        assert_eq!(padded.industry.as_deref(), Some("legal"));
        assert!(!padded.extra.contains_key("industry"));
        assert_eq!(padded.extra.get("budgetNotes"), Some(&json!("tight")));

        let value = serde_json::to_value(&padded).expect("serialize");
        let restored: QuestionnaireAnswers = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored, padded);
    }

    #[test]
    fn serialized_form_is_flat() {
        let answers = QuestionnaireAnswers::default()
            .merge(&object(json!({ "businessName": "Acme", "budgetNotes": "flexible" })))
            .expect("valid answers");

        let value = serde_json::to_value(&answers).expect("serialize");
        assert_eq!(value, json!({ "businessName": "Acme", "budgetNotes": "flexible" }));

        let restored: QuestionnaireAnswers = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored, answers);
    }
}
