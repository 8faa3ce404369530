//! Portable JSON backup of the four collections.
//!
//! The envelope shape `{version, timestamp, data: {projects, quotes,
//! salesReps, companies}}` must stay readable by older exports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormatError;
use crate::model::{Company, Project, Quote, SalesRep};
use crate::state::AppState;

pub const BACKUP_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEnvelope {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub data: BackupData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub projects: Vec<Project>,
    pub quotes: Vec<Quote>,
    pub sales_reps: Vec<SalesRep>,
    pub companies: Vec<Company>,
}

pub fn encode(state: &AppState, now: DateTime<Utc>) -> BackupEnvelope {
    BackupEnvelope {
        version: BACKUP_VERSION.to_string(),
        timestamp: now,
        data: BackupData {
            projects: state.projects.clone(),
            quotes: state.quotes.clone(),
            sales_reps: state.sales_reps.clone(),
            companies: state.companies.clone(),
        },
    }
}

pub fn to_json(envelope: &BackupEnvelope) -> Result<String, FormatError> {
    if let Some((quote, field)) = envelope
        .data
        .quotes
        .iter()
        .find_map(|q| q.non_finite_field().map(|f| (q, f)))
    {
        return Err(FormatError::Shape(format!(
            "quote {} has a non-finite {field}",
            quote.id
        )));
    }
    Ok(serde_json::to_string_pretty(envelope)?)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// Check the top-level shape before any field is decoded.
fn validate(root: &Value) -> Result<(), FormatError> {
    let obj = root
        .as_object()
        .ok_or_else(|| FormatError::Shape("expected a JSON object".to_string()))?;
    for key in ["version", "timestamp", "data"] {
        if !truthy(obj.get(key)) {
            return Err(FormatError::Shape(format!("missing '{key}'")));
        }
    }
    let data = obj
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| FormatError::Shape("'data' must be an object".to_string()))?;
    for key in ["projects", "quotes", "salesReps", "companies"] {
        if !data.get(key).is_some_and(Value::is_array) {
            return Err(FormatError::Shape(format!("'data.{key}' must be an array")));
        }
    }
    Ok(())
}

pub fn decode(text: &str) -> Result<BackupEnvelope, FormatError> {
    let root: Value = serde_json::from_str(text)?;
    validate(&root)?;
    Ok(serde_json::from_value(root)?)
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("crm-backup-{}.json", date.format("%Y-%m-%d"))
}
