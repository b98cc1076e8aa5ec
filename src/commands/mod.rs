//! CLI command handlers.

pub mod app;
pub mod cron;

use std::path::PathBuf;

use gantry_core::AppContext;

/// State shared by every command.
pub struct Globals {
    pub ctx: AppContext,
    /// Explicit `--config`, made absolute so a re-exec finds it.
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Globals {
    /// Arguments for a detached re-exec of this binary running `tail`.
    pub fn child_args(&self, tail: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }
}
