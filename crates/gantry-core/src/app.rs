//! Application context: folder layout and node identity.
//!
//! Every command builds one `AppContext` at boot and hands it to the
//! supervisor and scheduler. There is no ambient container.

use std::path::{Path, PathBuf};

use crate::config::GantryConfig;

/// Resolved folders plus the identity this process uses as lease holder.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: GantryConfig,
    base_folder: PathBuf,
    runtime_folder: PathBuf,
    log_folder: PathBuf,
    app_id: String,
}

impl AppContext {
    /// Build the context from config, resolving `~` and empty path overrides.
    pub fn new(config: GantryConfig) -> Self {
        let base_folder = expand(&config.paths.base);
        let runtime_folder = if config.paths.runtime.is_empty() {
            base_folder.join("runtime")
        } else {
            expand(&config.paths.runtime)
        };
        let log_folder = if config.paths.log.is_empty() {
            base_folder.join("logs")
        } else {
            expand(&config.paths.log)
        };
        let app_id = if config.app.id.is_empty() {
            generate_app_id()
        } else {
            config.app.id.clone()
        };
        Self {
            config,
            base_folder,
            runtime_folder,
            log_folder,
            app_id,
        }
    }

    /// Context rooted at an explicit folder. Used by tests and embedders.
    pub fn with_base(base: impl AsRef<Path>, app_id: impl Into<String>) -> Self {
        let mut config = GantryConfig::default();
        config.paths.base = base.as_ref().to_string_lossy().into_owned();
        config.app.id = app_id.into();
        Self::new(config)
    }

    pub fn config(&self) -> &GantryConfig {
        &self.config
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    /// PID files and lease files live here.
    pub fn runtime_folder(&self) -> &Path {
        &self.runtime_folder
    }

    pub fn log_folder(&self) -> &Path {
        &self.log_folder
    }

    /// Node identity written into lease files.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

fn expand(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).into_owned())
}

/// `<hostname>-<8 hex chars>`, unique per process start.
fn generate_app_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "node".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-{}", &suffix[..8])
}
