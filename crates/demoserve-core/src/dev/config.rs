//! Dev server configuration: model, demo preset, discovery and loading.
//!
//! Loads `demoserve.config.json`, `demoserve.config.js` or `vite.config.demo.js`
//! from a directory. JSON files are read with serde; JS files must export a
//! static object literal (see [`super::object`]).
//!
//! ## Supported config format
//!
//! ```js
//! export default {
//!   plugins: ['vue', 'vue-devtools'],
//!   clearScreen: false,
//!   root: './src/components/_demo/',
//!   build: { minify: false },
//!   server: {
//!     port: 5174,
//!     strictPort: true,
//!     fs: { strict: false },
//!     proxy: {
//!       '/site-api': {
//!         target: 'http://localhost/',
//!         changeOrigin: true,
//!         rewrite: { from: '^/site-api', to: '' },
//!       },
//!     },
//!   },
//!   resolve: { alias: { '@': './src', '~cmk-frontend': '../cmk-frontend/' } },
//! };
//! ```
//!
//! Relative paths (`root`, alias targets, `server.fs.allow`) are resolved
//! against the directory of the config file.

use super::alias::AliasTable;
use super::object::parse_default_export;
use super::proxy::{PathRewrite, ProxyRule, ProxyTable};
use crate::error::Error;
use demoserve_util::fs::resolve_against;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 5174;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Config file names in priority order.
pub const CONFIG_FILES: &[&str] = &[
    "demoserve.config.json",
    "demoserve.config.js",
    "vite.config.demo.js",
];

/// Configuration of one dev server instance.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevServerConfig {
    /// Plugin descriptors, in application order.
    pub plugins: Vec<PluginDescriptor>,
    /// Clear the terminal when files change.
    pub clear_screen: bool,
    /// Directory served at `/`.
    pub root: PathBuf,
    /// Build options.
    pub build: BuildConfig,
    /// Server options.
    pub server: ServerConfig,
    /// Resolve options.
    pub resolve: ResolveConfig,
}

/// An opaque plugin entry.
///
/// The server does not interpret plugins; it keeps their order and reports
/// them. In config files a bare string is shorthand for `{ name }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PluginSpec")]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PluginSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        options: serde_json::Value,
    },
}

impl From<PluginSpec> for PluginDescriptor {
    fn from(spec: PluginSpec) -> Self {
        match spec {
            PluginSpec::Name(name) => Self::named(name),
            PluginSpec::Full { name, options } => Self { name, options },
        }
    }
}

impl PluginDescriptor {
    /// A descriptor with no options.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Value::Null,
        }
    }
}

/// Build options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Minify production output.
    pub minify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { minify: true }
    }
}

/// Server options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Fail instead of trying the next port when `port` is taken.
    pub strict_port: bool,
    /// Open the browser after startup.
    pub open: bool,
    /// Send permissive CORS headers.
    pub cors: bool,
    /// Filesystem access options.
    pub fs: FsConfig,
    /// Proxy rules by context.
    pub proxy: ProxyTable,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            strict_port: false,
            open: false,
            cors: true,
            fs: FsConfig::default(),
            proxy: ProxyTable::new(),
        }
    }
}

/// Filesystem access options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FsConfig {
    /// Restrict `/@fs/` serving to the root, `allow` and alias targets.
    pub strict: bool,
    /// Extra directories served under a strict policy.
    pub allow: Vec<PathBuf>,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            strict: true,
            allow: Vec::new(),
        }
    }
}

/// Resolve options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveConfig {
    /// Import aliases.
    pub alias: AliasTable,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            clear_screen: true,
            root: PathBuf::from("."),
            build: BuildConfig::default(),
            server: ServerConfig::default(),
            resolve: ResolveConfig::default(),
        }
    }
}

impl DevServerConfig {
    /// The component-demo preset, for a package living in `config_dir`.
    ///
    /// Serves `./src/components/_demo/` on port 5174 (strict), forwards
    /// `/site-api` to `http://localhost/` with the prefix stripped, and maps
    /// `@` to `./src` and `~cmk-frontend` to `../cmk-frontend/`.
    ///
    /// # Panics
    /// Never: the proxy target is a valid constant URL.
    #[must_use]
    pub fn demo(config_dir: &Path) -> Self {
        let site_api = ProxyRule::new(Url::parse("http://localhost/").expect("valid URL"))
            .change_origin(true)
            .rewrite(PathRewrite::strip_prefix("/site-api"));

        let config = Self {
            plugins: vec![
                PluginDescriptor::named("vue"),
                PluginDescriptor::named("vue-devtools"),
            ],
            clear_screen: false,
            root: PathBuf::from("./src/components/_demo/"),
            build: BuildConfig { minify: false },
            server: ServerConfig {
                port: DEFAULT_PORT,
                strict_port: true,
                fs: FsConfig {
                    strict: false,
                    allow: Vec::new(),
                },
                proxy: ProxyTable::new().with("/site-api", site_api),
                ..ServerConfig::default()
            },
            resolve: ResolveConfig {
                alias: AliasTable::new()
                    .alias("@", "./src")
                    .alias("~cmk-frontend", "../cmk-frontend/"),
            },
        };
        config.resolve_paths(config_dir)
    }

    /// Resolve every relative path against `base` and normalize it.
    #[must_use]
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        self.root = resolve_against(base, &self.root);
        self.server.fs.allow = self
            .server
            .fs
            .allow
            .iter()
            .map(|p| resolve_against(base, p))
            .collect();
        self.resolve.alias = self.resolve.alias.absolutize(base);
        self
    }

    /// Check the configuration for values the server cannot honour.
    pub fn validate(&self) -> Result<(), Error> {
        if self.server.strict_port && self.server.port == 0 {
            return Err(Error::invalid(
                "server.strictPort requires a fixed server.port (got 0)",
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(Error::invalid("server.host must not be empty"));
        }
        if let Some(plugin) = self.plugins.iter().find(|p| p.name.trim().is_empty()) {
            return Err(Error::invalid(format!(
                "plugin names must not be empty (options: {})",
                plugin.options
            )));
        }
        self.server.proxy.validate()?;
        self.resolve.alias.validate()?;
        Ok(())
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid(e.to_string()))
    }

    /// Parse a configuration serialized with [`Self::to_json_pretty`].
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::ConfigParse {
            path: PathBuf::from("<json>"),
            message: e.to_string(),
        })
    }
}

/// Find a config file in the given directory.
#[must_use]
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load configuration from a config file in the given directory.
///
/// If `config_path` is `Some`, use that specific file. Otherwise, auto-discover.
/// Returns `Ok(None)` when auto-discovery finds nothing.
pub fn load_config(
    dir: &Path,
    config_path: Option<&Path>,
) -> Result<Option<(PathBuf, DevServerConfig)>, Error> {
    let path = match config_path {
        Some(p) => {
            let abs = resolve_against(dir, p);
            if !abs.is_file() {
                return Err(Error::ConfigNotFound { path: abs });
            }
            abs
        }
        None => match find_config_file(dir) {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;

    let config = parse_config_source(&source, &path)?;
    let base = path.parent().unwrap_or(dir);
    let config = config.resolve_paths(base);
    config.validate()?;

    Ok(Some((path, config)))
}

/// Parse config file contents, picking the format from the file extension.
fn parse_config_source(source: &str, path: &Path) -> Result<DevServerConfig, Error> {
    let parse_err = |message: String| Error::ConfigParse {
        path: path.to_path_buf(),
        message,
    };

    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_str::<serde_json::Value>(source).map_err(|e| parse_err(e.to_string()))?
        }
        Some("js" | "mjs") => parse_default_export(source).map_err(|e| parse_err(e.to_string()))?,
        other => {
            return Err(parse_err(format!(
                "unsupported config file extension: {}",
                other.unwrap_or("<none>")
            )))
        }
    };

    serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> DevServerConfig {
        DevServerConfig::demo(Path::new("/work/packages/cmk-frontend-vue"))
    }

    #[test]
    fn test_demo_preset_values() {
        let config = demo();
        let names: Vec<&str> = config.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["vue", "vue-devtools"]);
        assert!(!config.clear_screen);
        assert_eq!(
            config.root,
            PathBuf::from("/work/packages/cmk-frontend-vue/src/components/_demo")
        );
        assert!(!config.build.minify);
        assert_eq!(config.server.port, 5174);
        assert!(config.server.strict_port);
        assert!(!config.server.fs.strict);

        let rule = config.server.proxy.get("/site-api").unwrap();
        assert_eq!(rule.target.as_str(), "http://localhost/");
        assert!(rule.change_origin);
        assert_eq!(rule.forward_url("/site-api/users").path(), "/users");

        assert_eq!(
            config.resolve.alias.get("@"),
            Some(Path::new("/work/packages/cmk-frontend-vue/src"))
        );
        assert_eq!(
            config.resolve.alias.get("~cmk-frontend"),
            Some(Path::new("/work/packages/cmk-frontend"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_is_idempotent() {
        let config = demo();
        let first = config.to_json_pretty().unwrap();
        let reloaded = DevServerConfig::from_json(&first).unwrap();
        assert_eq!(reloaded, config);
        let second = reloaded.to_json_pretty().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_json_uses_camel_case_field_names() {
        let json: serde_json::Value =
            serde_json::from_str(&demo().to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["clearScreen"], false);
        assert_eq!(json["server"]["strictPort"], true);
        assert_eq!(json["server"]["fs"]["strict"], false);
        assert_eq!(json["build"]["minify"], false);
        assert_eq!(json["plugins"][0]["name"], "vue");
        assert!(json["server"]["proxy"]["/site-api"]["changeOrigin"]
            .as_bool()
            .unwrap());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: DevServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DevServerConfig::default());
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(!config.server.strict_port);
        assert!(config.server.fs.strict);
        assert!(config.clear_screen);
    }

    #[test]
    fn test_plugin_shorthand_and_full_form() {
        let config: DevServerConfig = serde_json::from_str(
            r#"{"plugins": ["vue", {"name": "inspect", "options": {"port": 1}}]}"#,
        )
        .unwrap();
        assert_eq!(config.plugins[0], PluginDescriptor::named("vue"));
        assert_eq!(config.plugins[1].name, "inspect");
        assert_eq!(config.plugins[1].options["port"], 1);
    }

    #[test]
    fn test_validate_rejects_strict_port_zero() {
        let mut config = demo();
        config.server.port = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), crate::error::codes::DEV_CONFIG_INVALID);
    }

    #[test]
    fn test_find_config_file_priority() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config_file(dir.path()).is_none());

        std::fs::write(dir.path().join("vite.config.demo.js"), "export default {}").unwrap();
        assert_eq!(
            find_config_file(dir.path()).unwrap(),
            dir.path().join("vite.config.demo.js")
        );

        std::fs::write(dir.path().join("demoserve.config.json"), "{}").unwrap();
        assert_eq!(
            find_config_file(dir.path()).unwrap(),
            dir.path().join("demoserve.config.json")
        );
    }

    #[test]
    fn test_load_js_config_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = r"
            export default {
              plugins: ['vue', 'vue-devtools'],
              clearScreen: false,
              root: './src/components/_demo/',
              server: {
                port: 5174,
                strictPort: true,
                fs: { strict: false },
                proxy: {
                  '/site-api': {
                    target: 'http://localhost/',
                    changeOrigin: true,
                    rewrite: { from: '^/site-api', to: '' },
                  },
                },
              },
              resolve: { alias: { '@': './src', '~cmk-frontend': '../cmk-frontend/' } },
            };
        ";
        std::fs::write(dir.path().join("vite.config.demo.js"), source).unwrap();

        let (path, config) = load_config(dir.path(), None).unwrap().unwrap();
        assert_eq!(path, dir.path().join("vite.config.demo.js"));
        assert_eq!(config.root, dir.path().join("src/components/_demo"));
        assert_eq!(
            config.resolve.alias.resolve("@/main.ts"),
            Some(dir.path().join("src/main.ts"))
        );
        let sibling = dir.path().parent().unwrap().join("cmk-frontend");
        assert_eq!(config.resolve.alias.get("~cmk-frontend"), Some(sibling.as_path()));
        assert_eq!(
            config
                .server
                .proxy
                .get("/site-api")
                .unwrap()
                .forward_url("/site-api/x")
                .path(),
            "/x"
        );
    }

    #[test]
    fn test_load_json_config_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.json");
        std::fs::write(&custom, r#"{"server": {"port": 9999}, "root": "public"}"#).unwrap();

        let (_, config) = load_config(dir.path(), Some(&custom)).unwrap().unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.root, dir.path().join("public"));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path(), Some(Path::new("nope.js"))).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::DEV_CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("demoserve.config.js"),
            "export default { plugins: [vue()] }",
        )
        .unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::DEV_CONFIG_PARSE);
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path(), None).unwrap().is_none());
    }
}
