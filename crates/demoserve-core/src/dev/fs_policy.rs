//! Which files outside the serving root may be served through `/@fs/`.

use super::alias::AliasTable;
use super::config::FsConfig;
use demoserve_util::fs::{is_within, normalize_lexically};
use std::path::{Path, PathBuf};

/// Filesystem access policy for the dev server.
#[derive(Debug, Clone)]
pub struct FsPolicy {
    strict: bool,
    allow: Vec<PathBuf>,
}

impl FsPolicy {
    /// Build the policy for a root directory.
    ///
    /// When strict, the allowed set is the root, every `fs.allow` entry and
    /// every alias target.
    #[must_use]
    pub fn new(root: &Path, fs: &FsConfig, aliases: &AliasTable) -> Self {
        let mut allow = vec![normalize_lexically(root)];
        allow.extend(fs.allow.iter().map(|p| normalize_lexically(p)));
        allow.extend(aliases.targets().map(normalize_lexically));
        allow.sort();
        allow.dedup();
        Self {
            strict: fs.strict,
            allow,
        }
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Directories a strict policy serves from.
    #[must_use]
    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allow
    }

    /// Whether an absolute path may be served.
    #[must_use]
    pub fn is_allowed(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        if !self.strict {
            return true;
        }
        self.allow.iter().any(|dir| is_within(path, dir))
    }
}
