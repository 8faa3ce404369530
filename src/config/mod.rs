mod settings;

pub use settings::{Backend, CommissionSettings, Config, RemoteSettings, SyncSection};

use crate::error::{CrmError, RemoteError, Result};
use crate::sync::store::{FileStore, RemoteStore, RestStore};
use crate::sync::SyncSettings;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Get the config directory path (~/.config/crm/ or ~/.crm/)
pub fn config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "crm") {
        return Ok(proj_dirs.config_dir().to_path_buf());
    }

    let home = dirs_home().ok_or_else(|| {
        CrmError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        ))
    })?;

    Ok(home.join(".crm"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand ~ in paths
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Load config.toml, then apply environment overrides.
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let path = config_dir.join("config.toml");
    if !path.exists() {
        return Err(CrmError::ConfigFileNotFound(path));
    }
    let content = fs::read_to_string(&path)?;
    let mut config: Config =
        toml::from_str(&content).map_err(|e| CrmError::ConfigParse { path, source: e })?;
    config.remote.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Write the commented template. Refuses to touch an existing directory.
pub fn init_config_dir(config_dir: &Path) -> Result<PathBuf> {
    if config_dir.exists() {
        return Err(CrmError::AlreadyInitialized(config_dir.to_path_buf()));
    }
    fs::create_dir_all(config_dir)?;
    let path = config_dir.join("config.toml");
    fs::write(&path, CONFIG_TEMPLATE)?;
    Ok(path)
}

impl Config {
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.sync.debounce_ms),
        }
    }

    /// Where the file backend keeps its table. Relative paths are taken from
    /// the config directory.
    pub fn store_path(&self, config_dir: &Path) -> PathBuf {
        match self.remote.path.as_deref() {
            Some(p) => {
                let expanded = expand_path(p);
                if expanded.is_absolute() {
                    expanded
                } else {
                    config_dir.join(expanded)
                }
            }
            None => config_dir.join(format!("{}.json", self.remote.table)),
        }
    }

    pub fn build_store(&self, config_dir: &Path) -> Result<Arc<dyn RemoteStore>> {
        let remote = &self.remote;
        match remote.backend {
            Backend::File => Ok(Arc::new(FileStore::new(self.store_path(config_dir)))),
            Backend::Rest => {
                let url = remote.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                    RemoteError::NotConfigured("set remote.url or CRM_REMOTE_URL".to_string())
                })?;
                let key = remote
                    .api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        RemoteError::NotConfigured(
                            "set remote.api_key or CRM_REMOTE_API_KEY".to_string(),
                        )
                    })?;
                Ok(Arc::new(RestStore::new(
                    url,
                    key,
                    &remote.table,
                    Duration::from_secs(remote.timeout_secs),
                )))
            }
        }
    }
}

/// Template content for config.toml
pub const CONFIG_TEMPLATE: &str = r#"[remote]
# "rest" talks to a PostgREST endpoint (e.g. Supabase),
# "file" keeps the shared table in a JSON file.
backend = "rest"
url = "https://your-project.supabase.co"   # or CRM_REMOTE_URL
api_key = "your-anon-key"                  # or CRM_REMOTE_API_KEY
table = "shared_crm_data"
# path = "~/Shared/crm.json"               # file backend only
timeout_secs = 10

[sync]
debounce_ms = 2000

[commission]
equation_rate = 5.0     # platform share of the amount excl. tax, in %
sales_rep_rate = 40.0   # sales rep share of the platform commission, in %
overdue_days = 15
"#;
