use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A construction site ("chantier").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Empty when no sales rep is assigned.
    #[serde(default)]
    pub sales_rep_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: &str, address: &str, sales_rep_id: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            name: name.trim().to_string(),
            address: address.trim().to_string(),
            sales_rep_id: sales_rep_id.unwrap_or_default().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn sales_rep(&self) -> Option<&str> {
        if self.sales_rep_id.is_empty() {
            None
        } else {
            Some(&self.sales_rep_id)
        }
    }
}
