//! Import alias table (`@` → `<dir>/src`, `~cmk-frontend` → sibling package).
//!
//! An alias matches a specifier that equals it or starts with `alias/`. The
//! matched prefix is replaced by the target directory; the remainder is
//! joined on and the result normalised lexically, so `@/../x` lands beside
//! the `@` target.

use crate::error::Error;
use demoserve_util::fs::{normalize_lexically, resolve_against};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping from alias to directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable(BTreeMap<String, PathBuf>);

impl AliasTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias.
    #[must_use]
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<PathBuf>) -> Self {
        self.0.insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&Path> {
        self.0.get(alias).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.0.iter()
    }

    /// Target directories, in alias order.
    pub fn targets(&self) -> impl Iterator<Item = &Path> {
        self.0.values().map(PathBuf::as_path)
    }

    /// Make every relative target absolute against `base`.
    #[must_use]
    pub fn absolutize(self, base: &Path) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(from, to)| (from, resolve_against(base, &to)))
                .collect(),
        )
    }

    /// Find the alias that applies to `specifier`, longest alias first.
    #[must_use]
    pub fn matching(&self, specifier: &str) -> Option<(&str, &Path)> {
        self.0
            .iter()
            .filter(|(from, _)| {
                specifier == from.as_str()
                    || specifier
                        .strip_prefix(from.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(from, _)| from.len())
            .map(|(from, to)| (from.as_str(), to.as_path()))
    }

    /// Resolve an import specifier through the table.
    ///
    /// Returns `None` when no alias applies.
    #[must_use]
    pub fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        let (from, to) = self.matching(specifier)?;
        let rest = specifier[from.len()..].trim_start_matches('/');
        if rest.is_empty() {
            Some(to.to_path_buf())
        } else {
            Some(normalize_lexically(&to.join(rest)))
        }
    }

    /// Reject empty aliases and relative targets.
    pub fn validate(&self) -> Result<(), Error> {
        for (from, to) in &self.0 {
            if from.is_empty() {
                return Err(Error::invalid("alias keys must not be empty"));
            }
            if !to.is_absolute() {
                return Err(Error::invalid(format!(
                    "alias '{from}' must map to an absolute path, got '{}'",
                    to.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_table() -> AliasTable {
        AliasTable::new()
            .alias("@", "/work/cmk-frontend-vue/src")
            .alias("~cmk-frontend", "/work/cmk-frontend")
    }

    #[test]
    fn test_resolve_at_alias() {
        let table = demo_table();
        assert_eq!(
            table.resolve("@/components/Button.vue"),
            Some(PathBuf::from("/work/cmk-frontend-vue/src/components/Button.vue"))
        );
        assert_eq!(
            table.resolve("@"),
            Some(PathBuf::from("/work/cmk-frontend-vue/src"))
        );
    }

    #[test]
    fn test_resolve_sibling_package_alias() {
        let table = demo_table();
        assert_eq!(
            table.resolve("~cmk-frontend/themes/facelift/theme.scss"),
            Some(PathBuf::from("/work/cmk-frontend/themes/facelift/theme.scss"))
        );
    }

    #[test]
    fn test_no_match_for_lookalike_prefixes() {
        let table = demo_table();
        assert_eq!(table.resolve("@vue/runtime-core"), None);
        assert_eq!(table.resolve("~cmk-frontend-extra/x"), None);
        assert_eq!(table.resolve("vue"), None);
        assert_eq!(table.resolve("./local"), None);
    }

    #[test]
    fn test_resolve_folds_parent_segments() {
        let table = demo_table();
        assert_eq!(
            table.resolve("@/../shared/x.js"),
            Some(PathBuf::from("/work/cmk-frontend-vue/shared/x.js"))
        );
        assert_eq!(
            table.resolve("@/components/./forms/../Button.vue"),
            Some(PathBuf::from("/work/cmk-frontend-vue/src/components/Button.vue"))
        );
    }

    #[test]
    fn test_longest_alias_wins() {
        let table = AliasTable::new()
            .alias("@", "/a")
            .alias("@/lib", "/b");
        assert_eq!(table.resolve("@/lib/x.js"), Some(PathBuf::from("/b/x.js")));
        assert_eq!(table.resolve("@/other.js"), Some(PathBuf::from("/a/other.js")));
    }

    #[test]
    fn test_absolutize_normalizes_against_base() {
        let table = AliasTable::new()
            .alias("@", "./src")
            .alias("~cmk-frontend", "../cmk-frontend/")
            .absolutize(Path::new("/work/cmk-frontend-vue"));
        assert_eq!(table.get("@"), Some(Path::new("/work/cmk-frontend-vue/src")));
        assert_eq!(
            table.get("~cmk-frontend"),
            Some(Path::new("/work/cmk-frontend"))
        );
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_and_empty() {
        assert!(AliasTable::new().alias("@", "src").validate().is_err());
        assert!(AliasTable::new().alias("", "/src").validate().is_err());
    }
}
