use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Contact details captured on the fourth wizard step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl Contact {
    /// Trims every field, drops blank optionals and lowercases the email.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::InvalidContact("name is required".to_string()));
        }

        let email = self.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            return Err(DomainError::InvalidContact(format!(
                "`{}` is not a valid email address",
                self.email.trim()
            )));
        }

        Ok(Self { name, email, phone: non_blank(self.phone), company: non_blank(self.company) })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Syntactic check only: `local@domain.tld`, no whitespace, no empty labels.
pub fn is_valid_email(value: &str) -> bool {
    if value.len() > 254 || value.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, Contact};
    use crate::errors::DomainError;

    fn contact(name: &str, email: &str) -> Contact {
        Contact { name: name.to_string(), email: email.to_string(), phone: None, company: None }
    }

    #[test]
    fn accepts_common_addresses() {
        for email in ["jane@acme.com", "first.last+quote@mail.example.co.uk", "a@b.io"] {
            assert!(is_valid_email(email), "{email} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        let malformed = [
            "",
            "jane",
            "jane@",
            "@acme.com",
            "jane@acme",
            "jane@@acme.com",
            "ja ne@acme.com",
            "jane@acme..com",
            ".jane@acme.com",
            "jane@-acme.com",
        ];
        for email in malformed {
            assert!(!is_valid_email(email), "{email} should be invalid");
        }
    }

    #[test]
    fn normalization_trims_and_lowercases() {
        let normalized = Contact {
            name: "  Jane Doe ".to_string(),
            email: " Jane@Acme.COM ".to_string(),
            phone: Some("  ".to_string()),
            company: Some(" Acme ".to_string()),
        }
        .normalized()
        .expect("valid contact");

        assert_eq!(normalized.name, "Jane Doe");
        assert_eq!(normalized.email, "jane@acme.com");
        assert_eq!(normalized.phone, None);
        assert_eq!(normalized.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn blank_name_is_invalid_contact() {
        let error = contact("   ", "jane@acme.com").normalized().expect_err("blank name");
        assert!(matches!(
            error,
            DomainError::InvalidContact(ref message) if message.contains("name")
        ));
    }

    #[test]
    fn bad_email_is_invalid_contact() {
        let error = contact("Jane", "jane.acme.com").normalized().expect_err("bad email");
        assert_eq!(error.kind(), "invalid_contact");
    }
}
