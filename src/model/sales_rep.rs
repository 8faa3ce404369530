use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRep {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SalesRep {
    pub fn new(name: &str, email: Option<&str>, phone: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            name: name.trim().to_string(),
            email: super::non_blank(email),
            phone: super::non_blank(phone),
            created_at: now,
        }
    }
}
