//! `demoserve resolve`: show where import specifiers point.

use super::{exit_with, resolve_config};
use demoserve_core::dev::{DevServerConfig, ImportRewriter};
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Resolve command action.
#[derive(Debug, Clone)]
pub struct ResolveAction {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    pub specifiers: Vec<String>,
    pub json: bool,
}

/// Resolution of one specifier.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Resolution {
    pub specifier: String,
    /// Matching alias, if any.
    pub alias: Option<String>,
    /// Absolute file path the alias maps to.
    pub path: Option<PathBuf>,
    /// URL the dev server rewrites the import to.
    pub url: Option<String>,
}

pub fn run(action: ResolveAction) -> Result<()> {
    let (_, config) = resolve_config(&action.cwd, action.config.as_deref(), false)
        .unwrap_or_else(|e| exit_with(&e, action.json));

    let resolutions = resolve_all(&config, &action.specifiers);

    if action.json {
        let out = serde_json::json!({ "ok": true, "resolutions": resolutions });
        println!("{out}");
        return Ok(());
    }

    for r in &resolutions {
        match (&r.path, &r.url) {
            (Some(path), Some(url)) => {
                println!("{} -> {} ({url})", r.specifier, path.display());
            }
            _ => println!("{} -> (no alias matched)", r.specifier),
        }
    }
    Ok(())
}

fn resolve_all(config: &DevServerConfig, specifiers: &[String]) -> Vec<Resolution> {
    let aliases = &config.resolve.alias;
    let rewriter = ImportRewriter::new(config.root.clone(), aliases.clone());

    specifiers
        .iter()
        .map(|specifier| {
            let alias = aliases.matching(specifier).map(|(alias, _)| alias.to_string());
            let path = aliases.resolve(specifier);
            let url = path.as_deref().map(|p| rewriter.url_for(p));
            Resolution {
                specifier: specifier.clone(),
                alias,
                path,
                url,
            }
        })
        .collect()
}
