//! Proxy rules for forwarding dev-server requests to a backend.
//!
//! A rule is keyed by a *context*: either a literal path prefix (`/site-api`)
//! or, when the key starts with `^`, a regular expression tested against the
//! request path and query. The first matching rule wins, longer contexts are
//! tried first.
//!
//! ```text
//! GET /site-api/users?page=2
//!   → context `/site-api` matches
//!   → rewrite `^/site-api` → ``        => /users?page=2
//!   → join onto target http://localhost/ => http://localhost/users?page=2
//! ```

use crate::error::Error;
use axum::http::{header, HeaderMap, HeaderName};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Headers that describe a single transport hop and must not be forwarded.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A regex-based rewrite of the forwarded path.
///
/// Only the first match is replaced. On the wire it is written as
/// `{ "from": "^/site-api", "to": "" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RewriteSpec", into = "RewriteSpec")]
pub struct PathRewrite {
    from: Regex,
    to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RewriteSpec {
    from: String,
    #[serde(default)]
    to: String,
}

impl TryFrom<RewriteSpec> for PathRewrite {
    type Error = String;

    fn try_from(spec: RewriteSpec) -> Result<Self, Self::Error> {
        PathRewrite::new(&spec.from, spec.to).map_err(|e| e.to_string())
    }
}

impl From<PathRewrite> for RewriteSpec {
    fn from(rewrite: PathRewrite) -> Self {
        Self {
            from: rewrite.from.as_str().to_string(),
            to: rewrite.to,
        }
    }
}

impl PartialEq for PathRewrite {
    fn eq(&self, other: &Self) -> bool {
        self.from.as_str() == other.from.as_str() && self.to == other.to
    }
}

impl PathRewrite {
    /// Create a rewrite from a regular expression and a replacement.
    pub fn new(from: &str, to: impl Into<String>) -> Result<Self, Error> {
        let from = Regex::new(from)
            .map_err(|e| Error::invalid(format!("invalid rewrite pattern '{from}': {e}")))?;
        Ok(Self { from, to: to.into() })
    }

    /// A rewrite that removes a literal leading `prefix` exactly once.
    ///
    /// # Panics
    /// Never: the escaped pattern is always a valid regex.
    #[must_use]
    pub fn strip_prefix(prefix: &str) -> Self {
        let pattern = format!("^{}", regex_lite::escape(prefix));
        Self {
            from: Regex::new(&pattern).expect("escaped prefix is a valid regex"),
            to: String::new(),
        }
    }

    /// The source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.from.as_str()
    }

    /// Apply the rewrite to a path (which may carry a query string).
    #[must_use]
    pub fn apply(&self, path: &str) -> String {
        self.from.replace(path, self.to.as_str()).into_owned()
    }
}

/// Forwarding rule for one proxy context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRule {
    /// Origin (and optional base path) requests are forwarded to.
    pub target: Url,
    /// Present the target host as the `Host` header.
    #[serde(default)]
    pub change_origin: bool,
    /// Rewrite applied to the path before it is joined onto the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<PathRewrite>,
    /// Extra headers set on every forwarded request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ProxyRule {
    /// Create a rule with no rewrite that keeps the original `Host`.
    #[must_use]
    pub fn new(target: Url) -> Self {
        Self {
            target,
            change_origin: false,
            rewrite: None,
            headers: BTreeMap::new(),
        }
    }

    /// Set the `changeOrigin` flag.
    #[must_use]
    pub fn change_origin(mut self, change_origin: bool) -> Self {
        self.change_origin = change_origin;
        self
    }

    /// Set the path rewrite.
    #[must_use]
    pub fn rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// The path (and query) as it will be sent to the target, before joining.
    #[must_use]
    pub fn rewritten_path(&self, path_and_query: &str) -> String {
        match &self.rewrite {
            Some(rewrite) => rewrite.apply(path_and_query),
            None => path_and_query.to_string(),
        }
    }

    /// Build the upstream URL for an inbound request path (with optional query).
    #[must_use]
    pub fn forward_url(&self, path_and_query: &str) -> Url {
        let rewritten = self.rewritten_path(path_and_query);
        let (path, query) = match rewritten.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rewritten.as_str(), None),
        };

        let base = self.target.path().trim_end_matches('/');
        let tail = path.trim_start_matches('/');
        let joined = if tail.is_empty() {
            self.target.path().to_string()
        } else {
            format!("{base}/{tail}")
        };

        let mut url = self.target.clone();
        url.set_path(&joined);
        url.set_query(query);
        url
    }

    /// The `Host` header to send upstream.
    ///
    /// With `change_origin` this is the target's authority, otherwise the
    /// inbound header is passed through.
    #[must_use]
    pub fn host_header(&self, original: Option<&str>) -> Option<String> {
        if !self.change_origin {
            return original.map(str::to_string);
        }
        let host = self.target.host_str()?;
        Some(match self.target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    fn validate(&self, context: &str) -> Result<(), Error> {
        if !matches!(self.target.scheme(), "http" | "https") {
            return Err(Error::invalid(format!(
                "proxy '{context}': target must be http or https, got '{}'",
                self.target
            )));
        }
        if self.target.host_str().is_none() {
            return Err(Error::invalid(format!(
                "proxy '{context}': target has no host"
            )));
        }
        for name in self.headers.keys() {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                Error::invalid(format!("proxy '{context}': invalid header name '{name}'"))
            })?;
        }
        Ok(())
    }
}

/// Proxy rules keyed by context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyTable(BTreeMap<String, ProxyRule>);

impl ProxyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for a context.
    #[must_use]
    pub fn with(mut self, context: impl Into<String>, rule: ProxyRule) -> Self {
        self.0.insert(context.into(), rule);
        self
    }

    #[must_use]
    pub fn get(&self, context: &str) -> Option<&ProxyRule> {
        self.0.get(context)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProxyRule)> {
        self.0.iter()
    }

    /// Check every context and rule.
    pub fn validate(&self) -> Result<(), Error> {
        for (context, rule) in &self.0 {
            ContextMatcher::parse(context)?;
            rule.validate(context)?;
        }
        Ok(())
    }
}

/// How a proxy context selects requests.
#[derive(Debug, Clone)]
enum ContextMatcher {
    Prefix(String),
    Pattern(Regex),
}

impl ContextMatcher {
    fn parse(context: &str) -> Result<Self, Error> {
        if context.starts_with('^') {
            let re = Regex::new(context).map_err(|e| {
                Error::invalid(format!("invalid proxy context pattern '{context}': {e}"))
            })?;
            Ok(Self::Pattern(re))
        } else if context.starts_with('/') {
            Ok(Self::Prefix(context.to_string()))
        } else {
            Err(Error::invalid(format!(
                "proxy context '{context}' must start with '/' or '^'"
            )))
        }
    }

    fn matches(&self, path_and_query: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path_and_query.starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(path_and_query),
        }
    }
}

/// Compiled view of a [`ProxyTable`] used on the request path.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    routes: Vec<(String, ContextMatcher, ProxyRule)>,
}

impl ProxyRouter {
    /// Compile a proxy table.
    pub fn new(table: &ProxyTable) -> Result<Self, Error> {
        let mut routes = Vec::with_capacity(table.len());
        for (context, rule) in table.iter() {
            rule.validate(context)?;
            routes.push((context.clone(), ContextMatcher::parse(context)?, rule.clone()));
        }
        // Most specific first; BTreeMap order breaks ties deterministically.
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(Self { routes })
    }

    /// Find the rule for a request path (with optional query).
    #[must_use]
    pub fn match_path(&self, path_and_query: &str) -> Option<(&str, &ProxyRule)> {
        self.routes
            .iter()
            .find(|(_, matcher, _)| matcher.matches(path_and_query))
            .map(|(context, _, rule)| (context.as_str(), rule))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
    for name in named {
        headers.remove(name.as_str());
    }
}
