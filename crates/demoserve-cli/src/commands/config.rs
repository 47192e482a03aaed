//! `demoserve config`: print the resolved configuration as JSON.

use super::{exit_with, resolve_config, ConfigSource};
use miette::Result;
use std::path::PathBuf;

/// Config command action.
#[derive(Debug, Clone)]
pub struct ConfigAction {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    pub demo: bool,
    pub json: bool,
}

pub fn run(action: ConfigAction) -> Result<()> {
    let (source, config) = resolve_config(&action.cwd, action.config.as_deref(), action.demo)
        .unwrap_or_else(|e| exit_with(&e, action.json));

    match &source {
        ConfigSource::File(path) => tracing::info!(path = %path.display(), "Resolved config"),
        ConfigSource::Preset => tracing::info!("Resolved demo preset"),
    }

    let out = config.to_json_pretty().unwrap_or_else(|e| exit_with(&e, action.json));
    println!("{out}");
    Ok(())
}
