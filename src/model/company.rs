use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A partner company. Quotes refer to it by name, not by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            name: name.trim().to_string(),
            email: super::non_blank(email),
            phone: super::non_blank(phone),
            address: super::non_blank(address),
            created_at: now,
        }
    }

    /// Company names are unique ignoring case and surrounding whitespace.
    pub fn same_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}
