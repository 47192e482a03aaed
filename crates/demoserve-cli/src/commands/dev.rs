//! `demoserve dev` command implementation.
//!
//! Loads the configuration, applies command-line overrides, starts the
//! dev server and watches the root and the alias targets for changes:
//!
//! ```text
//! file saved under root or an alias target
//!   → notify event (debounced 50ms)
//!   → terminal cleared (clearScreen)
//!   → {"type":"full-reload"} to every connected page
//! ```

use super::{exit_with, resolve_config, ConfigSource};
use demoserve_core::dev::{display_path, DevServer, DevServerConfig, ReloadMessage};
use miette::{IntoDiagnostic, Result};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Quiet period after the last event before a batch is reported.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Directory names never watched.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git"];

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Working directory.
    pub cwd: PathBuf,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
    /// Use the demo preset even when a config file exists.
    pub demo: bool,
    /// Port override.
    pub port: Option<u16>,
    /// Host override.
    pub host: Option<String>,
    /// Force strict port.
    pub strict_port: bool,
    /// Force opening the browser.
    pub open: bool,
    /// Report errors as JSON.
    pub json: bool,
}

impl DevAction {
    /// Apply command-line flags on top of the loaded configuration.
    fn apply(&self, mut config: DevServerConfig) -> DevServerConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if self.strict_port {
            config.server.strict_port = true;
        }
        if self.open {
            config.server.open = true;
        }
        config
    }
}

/// Run the dev server until Ctrl+C.
pub fn run(action: DevAction) -> Result<()> {
    let (source, config) = resolve_config(&action.cwd, action.config.as_deref(), action.demo)
        .unwrap_or_else(|e| exit_with(&e, action.json));

    match &source {
        ConfigSource::File(path) => {
            let rel = path.strip_prefix(&action.cwd).unwrap_or(path);
            tracing::info!(path = %rel.display(), "Loaded config");
        }
        ConfigSource::Preset => tracing::info!("Using demo preset"),
    }

    let config = Arc::new(action.apply(config));
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(serve(config, action.json))
}

async fn serve(config: Arc<DevServerConfig>, json: bool) -> Result<()> {
    let server = match DevServer::bind(Arc::clone(&config)).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Dev server failed to start");
            exit_with(&e, json)
        }
    };

    let url = format!("http://{}:{}/", config.server.host, server.local_addr().port());
    print_banner(&config, &url, json);

    if config.server.open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!(error = %e, "Failed to open browser");
        }
    }

    // Set up file watcher
    let (change_tx, mut change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let dirs = watch_dirs(&config);
    std::thread::spawn(move || {
        if let Err(e) = watch_files(&dirs, &change_tx) {
            tracing::warn!(error = %e, "File watcher stopped");
        }
    });

    let reload_tx = server.reload_sender();
    let change_config = Arc::clone(&config);
    tokio::spawn(async move {
        while let Some(changed) = change_rx.recv().await {
            handle_file_change(&change_config, &changed, &reload_tx);
        }
    });

    server.serve(shutdown_signal()).await.into_diagnostic()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
    }
}

fn print_banner(config: &DevServerConfig, url: &str, json: bool) {
    if json {
        let out = serde_json::json!({
            "ok": true,
            "url": url,
            "root": config.root,
            "strictPort": config.server.strict_port,
        });
        println!("{out}");
        return;
    }

    println!();
    println!("  demoserve dev server running at {url}");
    println!("  Root:  {}", config.root.display());
    for (context, rule) in config.server.proxy.iter() {
        println!("  Proxy: {context} -> {}", rule.target);
    }
    for (alias, target) in config.resolve.alias.iter() {
        println!("  Alias: {alias} -> {}", target.display());
    }
    if !config.plugins.is_empty() {
        let names: Vec<&str> = config.plugins.iter().map(|p| p.name.as_str()).collect();
        println!("  Plugins: {}", names.join(", "));
    }
    println!();
    println!("  Press Ctrl+C to stop");
    println!();
}

// ============================================================================
// File Watching
// ============================================================================

/// The root plus every existing alias target, minus directories nested in
/// another watched one.
fn watch_dirs(config: &DevServerConfig) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::iter::once(config.root.as_path())
        .chain(config.resolve.alias.targets())
        .filter(|dir| dir.is_dir())
        .map(Path::to_path_buf)
        .collect();
    candidates.sort_by_key(|dir| dir.components().count());

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in candidates {
        if !dirs.iter().any(|watched| dir.starts_with(watched)) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Check if a path should be ignored by the file watcher. Only components
/// below the watched directory count.
fn should_ignore(dirs: &[PathBuf], path: &Path) -> bool {
    let rel = dirs
        .iter()
        .find_map(|dir| path.strip_prefix(dir).ok())
        .unwrap_or(path);
    rel.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
        }
        _ => false,
    })
}

/// Watch `dirs` and send debounced batches of changed paths.
fn watch_files(dirs: &[PathBuf], change_tx: &mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .into_diagnostic()?;
        tracing::debug!(dir = %dir.display(), "Watching for changes");
    }

    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

    loop {
        let event = if pending.is_empty() {
            match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            }
        } else {
            match rx.recv_timeout(DEBOUNCE) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    let changed: Vec<PathBuf> = std::mem::take(&mut pending).into_iter().collect();
                    if change_tx.blocking_send(changed).is_err() {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match event {
            Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
                pending.extend(event.paths.into_iter().filter(|p| !should_ignore(dirs, p)));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Watch error"),
        }
    }

    Ok(())
}

/// Report changed files and reload every connected page.
fn handle_file_change(
    config: &DevServerConfig,
    changed: &[PathBuf],
    reload_tx: &broadcast::Sender<ReloadMessage>,
) {
    if changed.is_empty() {
        return;
    }

    if config.clear_screen {
        print!("\x1B[2J\x1B[1;1H");
    }

    let paths: Vec<String> = changed
        .iter()
        .map(|p| display_path(&config.root, p))
        .collect();
    for path in &paths {
        tracing::info!(path = %path, "Page reload");
    }

    let path = match paths.as_slice() {
        [single] => Some(single.clone()),
        _ => None,
    };
    // No receivers just means no page is open.
    let _ = reload_tx.send(ReloadMessage::FullReload { path });
}

/// Open a URL in the default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}
