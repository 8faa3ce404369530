use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Company, FilterOptions, Project, Quote, SalesRep};
use crate::state::AppState;

/// JSON document stored in the shared row.
///
/// Collections are optional on the way in so that older or partial documents
/// still load; they are always written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default)]
    pub projects: Option<Vec<Project>>,
    #[serde(default)]
    pub quotes: Option<Vec<Quote>>,
    #[serde(default)]
    pub sales_reps: Option<Vec<SalesRep>>,
    #[serde(default)]
    pub companies: Option<Vec<Company>>,
    #[serde(default)]
    pub filters: Option<FilterOptions>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl RemoteDocument {
    pub fn from_state(state: &AppState, saved_at: DateTime<Utc>) -> Self {
        Self {
            projects: Some(state.projects.clone()),
            quotes: Some(state.quotes.clone()),
            sales_reps: Some(state.sales_reps.clone()),
            companies: Some(state.companies.clone()),
            filters: Some(state.filters.clone()),
            last_saved: Some(saved_at),
            last_modified: Some(state.last_modified),
        }
    }

    /// Missing collections become empty, missing filters cover the current
    /// year to date, a missing modification time becomes `now`.
    pub fn into_state(self, now: DateTime<Utc>) -> AppState {
        AppState {
            projects: self.projects.unwrap_or_default(),
            quotes: self.quotes.unwrap_or_default(),
            sales_reps: self.sales_reps.unwrap_or_default(),
            companies: self.companies.unwrap_or_default(),
            filters: self.filters.unwrap_or_else(|| FilterOptions::current_year(now)),
            selected_project: None,
            selected_quote: None,
            last_modified: self.last_modified.unwrap_or(now),
        }
    }
}
