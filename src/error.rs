use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the shared remote store.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote store unreachable: {0}")]
    Transport(String),

    #[error("Remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote store sent an unreadable response: {0}")]
    Decode(String),

    #[error("Remote store file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote store is not configured: {0}")]
    NotConfigured(String),

    #[error("State cannot be written to the remote store: {0}")]
    Unencodable(String),
}

/// Malformed backup file or unexpected remote document shape.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid backup format: {0}")]
    Shape(String),
}

/// An action that would leave a dangling reference or break a business rule.
#[derive(Error, Debug, PartialEq)]
pub enum IntegrityError {
    #[error("Project '{0}' still has quotes and cannot be deleted")]
    ProjectHasQuotes(String),

    #[error("Sales rep '{0}' is assigned to projects and cannot be deleted")]
    SalesRepHasProjects(String),

    #[error("Company '{0}' is used by quotes and cannot be deleted")]
    CompanyHasQuotes(String),

    #[error("A company named '{0}' already exists")]
    DuplicateCompany(String),

    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("Quote '{0}' not found")]
    QuoteNotFound(String),

    #[error("Sales rep '{0}' not found")]
    SalesRepNotFound(String),

    #[error("Company '{0}' not found")]
    CompanyNotFound(String),

    #[error("Commission for quote '{0}' is not payable until the quote is collected")]
    NotPayable(String),

    #[error("Commission for quote '{0}' has not been paid")]
    NotPaid(String),
}

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Config directory not found at {0}. Run 'crm init' to create it.")]
    ConfigNotFound(PathBuf),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config directory already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Remote store is unreachable; refusing changes that could overwrite the shared copy")]
    Offline,

    #[error("Shared data could not be read ({0}); refusing to modify it")]
    LoadFailed(String),

    #[error("{0}. Re-run with --yes to confirm")]
    NotConfirmed(&'static str),

    #[error("Invalid amount '{0}': must be a positive number")]
    InvalidAmount(String),

    #[error("Invalid rate '{0}': must be a percentage between 0 and 100")]
    InvalidRate(String),

    #[error("Invalid date '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrmError>;
