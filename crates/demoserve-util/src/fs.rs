use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: drop `.` components and fold `..` into the
/// preceding component. The filesystem is never consulted, so symlinks are
/// not resolved.
///
/// A `..` that would climb above the root of an absolute path is dropped;
/// leading `..` components of a relative path are kept.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Resolve `path` against `base` unless it is already absolute, then normalize.
#[must_use]
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base.join(path))
    }
}

/// Whether `path` lies inside `dir` (or is `dir` itself), compared lexically.
#[must_use]
pub fn is_within(path: &Path, dir: &Path) -> bool {
    normalize_lexically(path).starts_with(normalize_lexically(dir))
}

/// Join a `/`-separated relative request path onto `dir`, refusing any path
/// whose `..` components would escape `dir`.
#[must_use]
pub fn join_contained(dir: &Path, rel: &str) -> Option<PathBuf> {
    let mut depth: usize = 0;
    let mut joined = dir.to_path_buf();

    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth = depth.checked_sub(1)?;
                joined.pop();
            }
            s if s.contains('\\') || s.contains('\0') => return None,
            s => {
                depth += 1;
                joined.push(s);
            }
        }
    }

    Some(joined)
}

/// Decode `%XX` escapes in a URL path. Returns `None` for malformed escapes
/// or when the decoded bytes are not UTF-8.
#[must_use]
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}
