use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteSettings,
    pub sync: SyncSection,
    pub commission: CommissionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// PostgREST endpoint such as a Supabase project.
    #[default]
    Rest,
    /// JSON file, for a shared drive or single-user setups.
    File,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub backend: Backend,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    pub path: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Rest,
            url: None,
            api_key: None,
            table: "shared_crm_data".to_string(),
            path: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteSettings {
    /// Non-empty `CRM_REMOTE_URL` / `CRM_REMOTE_API_KEY` values win over the
    /// file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(url) = set(var("CRM_REMOTE_URL")) {
            self.url = Some(url);
        }
        if let Some(key) = set(var("CRM_REMOTE_API_KEY")) {
            self.api_key = Some(key);
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSection {
    pub debounce_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self { debounce_ms: 2000 }
    }
}

/// Default rates for new quotes, in percent.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CommissionSettings {
    pub equation_rate: f64,
    pub sales_rep_rate: f64,
    /// Days after collection before an unpaid commission counts as overdue.
    pub overdue_days: i64,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            equation_rate: 5.0,
            sales_rep_rate: 40.0,
            overdue_days: 15,
        }
    }
}
