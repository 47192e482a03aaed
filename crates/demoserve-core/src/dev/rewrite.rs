//! Alias-aware import rewriting for served modules.
//!
//! Scans JavaScript-like sources for import/export statements and rewrites
//! specifiers that match an alias:
//! - aliased paths under the root → root-relative URL (`@/x.js` → `/x.js`)
//! - aliased paths elsewhere → `/@fs/<absolute path>`
//!
//! Every other specifier is left untouched; bare package imports are the
//! browser's (or an import map's) business.

use super::alias::AliasTable;
use demoserve_util::fs::normalize_lexically;
use std::path::{Component, Path, PathBuf};

/// URL prefix for files served from outside the root.
pub const FS_PREFIX: &str = "/@fs";

/// File extensions whose imports are rewritten.
const MODULE_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "jsx", "tsx", "vue"];

/// Whether a file with this extension is rewritten before serving.
#[must_use]
pub fn is_module_extension(ext: &str) -> bool {
    MODULE_EXTENSIONS.contains(&ext)
}

/// Rewrites aliased import specifiers into URLs the dev server can serve.
#[derive(Debug, Clone)]
pub struct ImportRewriter {
    root: PathBuf,
    aliases: AliasTable,
}

impl ImportRewriter {
    #[must_use]
    pub fn new(root: PathBuf, aliases: AliasTable) -> Self {
        Self { root, aliases }
    }

    /// Map an import specifier to a served URL, if an alias applies.
    #[must_use]
    pub fn rewrite_specifier(&self, specifier: &str) -> Option<String> {
        let resolved = self.aliases.resolve(specifier)?;
        Some(self.url_for(&resolved))
    }

    /// The URL under which an absolute file path is served.
    #[must_use]
    pub fn url_for(&self, path: &Path) -> String {
        let path = normalize_lexically(path);
        match path.strip_prefix(&self.root) {
            Ok(rel) => format!("/{}", to_url_path(rel)),
            Err(_) => format!("{FS_PREFIX}/{}", to_url_path(&path).trim_start_matches('/')),
        }
    }

    /// Rewrite every aliased specifier in `code`.
    ///
    /// An `import {` or `export {` whose `from '...'` clause sits on a later
    /// line stays open until that clause or a `;` closes it.
    #[must_use]
    pub fn rewrite(&self, code: &str) -> String {
        if self.aliases.is_empty() {
            return code.to_string();
        }

        let mut result = String::with_capacity(code.len());
        let mut open_statement = false;

        for line in code.split_inclusive('\n') {
            let trimmed = line.trim_start();

            if open_statement {
                if let Some((start, end)) = find_from_literal(line) {
                    result.push_str(&self.splice(line, start, end));
                    open_statement = false;
                } else {
                    open_statement = !line.contains(';');
                    result.push_str(line);
                }
            } else if is_import_line(trimmed) || is_export_from_line(trimmed) {
                if let Some((start, end)) = static_literal(line) {
                    result.push_str(&self.splice(line, start, end));
                } else {
                    open_statement = !line.contains(';');
                    result.push_str(line);
                }
            } else if line.contains("import(") {
                result.push_str(&self.rewrite_dynamic(line));
            } else {
                result.push_str(line);
            }
        }
        result
    }

    /// Rewrite every `import('...')` call with a string literal argument.
    fn rewrite_dynamic(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut cursor = 0;

        while let Some(found) = line[cursor..].find("import(") {
            let after_paren = cursor + found + "import(".len();
            match find_string_literal(line, after_paren) {
                Some((start, end)) => {
                    out.push_str(&line[cursor..start]);
                    out.push_str(&self.replacement(&line[start..end]));
                    cursor = end;
                }
                None => {
                    out.push_str(&line[cursor..after_paren]);
                    cursor = after_paren;
                }
            }
        }

        out.push_str(&line[cursor..]);
        out
    }

    fn splice(&self, line: &str, start: usize, end: usize) -> String {
        format!(
            "{}{}{}",
            &line[..start],
            self.replacement(&line[start..end]),
            &line[end..]
        )
    }

    fn replacement(&self, specifier: &str) -> String {
        self.rewrite_specifier(specifier)
            .unwrap_or_else(|| specifier.to_string())
    }
}

/// The specifier of `import x from '...'`, `export * from '...'` or
/// `import '...'` when it is on this line.
fn static_literal(line: &str) -> Option<(usize, usize)> {
    find_from_literal(line).or_else(|| {
        line.find("import")
            .and_then(|idx| find_string_literal(line, idx + "import".len()))
    })
}

/// The literal following a `from` keyword, as in `} from '@/x.js'`.
fn find_from_literal(line: &str) -> Option<(usize, usize)> {
    let mut cursor = 0;
    while let Some(found) = line[cursor..].find("from") {
        let idx = cursor + found;
        let keyword = match line[..idx].chars().next_back() {
            None => true,
            Some(c) => c.is_whitespace() || c == '}' || c == '*',
        };
        if keyword {
            if let Some(literal) = find_string_literal(line, idx + "from".len()) {
                return Some(literal);
            }
        }
        cursor = idx + "from".len();
    }
    None
}

/// Locate the body of a quoted string literal starting at or after `from`
/// (leading whitespace only). Returns byte offsets of the text between quotes.
fn find_string_literal(line: &str, from: usize) -> Option<(usize, usize)> {
    let rest = &line[from..];
    let skipped = rest.len() - rest.trim_start().len();
    let open = from + skipped;
    let quote = line[open..].chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let body_start = open + 1;
    let body_len = line[body_start..].find(quote)?;
    Some((body_start, body_start + body_len))
}

fn is_import_line(trimmed: &str) -> bool {
    trimmed.starts_with("import ") || trimmed.starts_with("import'") || trimmed.starts_with("import\"")
}

/// `export ... from '...'`, or the head of a re-export list (`export {`,
/// `export *`) whose `from` clause may follow on a later line.
fn is_export_from_line(trimmed: &str) -> bool {
    let Some(rest) = trimmed.strip_prefix("export") else {
        return false;
    };
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("type ").map_or(rest, str::trim_start);
    rest.starts_with('{') || rest.starts_with('*') || trimmed.contains(" from ")
}

/// Join path components as URL segments. `..` is kept, never dropped.
fn to_url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
