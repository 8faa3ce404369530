pub mod backup;
pub mod commission;
pub mod config;
pub mod error;
pub mod model;
pub mod report;
pub mod state;
pub mod sync;

pub use backup::BackupEnvelope;
pub use commission::{compute_commissions, Commissions};
pub use config::Config;
pub use error::{CrmError, FormatError, IntegrityError, RemoteError, Result};
pub use state::{reduce, Action, AppState};
pub use sync::{Gateway, StartupOutcome, SyncService, SyncSettings, SyncStatus};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the CRM_LOG environment variable.
///
/// Defaults to "warn". Logs go to stderr so tables on stdout stay clean.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CRM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
