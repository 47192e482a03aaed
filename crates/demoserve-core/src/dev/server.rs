//! The dev server: static serving from the root, `/@fs/` serving, proxying
//! and live reload.
//!
//! ## Request dispatch
//!
//! ```text
//! GET /__reload          → live-reload WebSocket
//! GET /@reload-client    → reload client script
//! GET /@fs/<abs path>    → file outside the root (FsPolicy)
//! *   <proxy context>    → forwarded upstream (any method)
//! GET /<path>            → file under the root, index.html for directories,
//!                          SPA fallback for extension-less paths
//! ```

use super::config::DevServerConfig;
use super::fs_policy::FsPolicy;
use super::proxy::{strip_hop_by_hop, ProxyRouter, ProxyRule};
use super::reload::{self, ReloadMessage};
use super::rewrite::{is_module_extension, ImportRewriter, FS_PREFIX};
use crate::error::Error;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use demoserve_util::fs::{join_contained, normalize_lexically, percent_decode};
use demoserve_util::hash::{etag_matches, weak_etag};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// How many ports after the configured one are tried without `strictPort`.
pub const MAX_PORT_ATTEMPTS: u16 = 10;

/// Largest request body forwarded to a proxy target.
pub const MAX_PROXY_BODY: usize = 32 * 1024 * 1024;

/// Bind the dev server listener.
///
/// With `strict_port` the configured port is tried once and a busy port is
/// [`Error::PortInUse`]. Otherwise the next ports are tried in turn.
pub async fn bind_listener(host: &str, port: u16, strict_port: bool) -> Result<TcpListener, Error> {
    let ip = if host == "localhost" { "127.0.0.1" } else { host };
    let attempts = if strict_port || port == 0 { 1 } else { MAX_PORT_ATTEMPTS + 1 };

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        let addr = format!("{ip}:{candidate}");

        match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => {
                if offset > 0 {
                    tracing::info!(requested = port, bound = candidate, "Port in use, using next free port");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port = candidate, "Port in use");
            }
            Err(source) => return Err(Error::Bind { addr, source }),
        }
    }

    Err(Error::PortInUse { port })
}

/// Shared state behind every request.
struct ServerState {
    config: Arc<DevServerConfig>,
    proxy: ProxyRouter,
    fs_policy: FsPolicy,
    rewriter: ImportRewriter,
    client: reqwest::Client,
    reload_tx: broadcast::Sender<ReloadMessage>,
}

/// A bound, not yet serving, dev server.
pub struct DevServer {
    state: Arc<ServerState>,
    listener: TcpListener,
    addr: SocketAddr,
}

impl DevServer {
    /// Validate the configuration and bind the listener.
    pub async fn bind(config: Arc<DevServerConfig>) -> Result<Self, Error> {
        config.validate()?;

        let proxy = ProxyRouter::new(&config.server.proxy)?;
        let fs_policy = FsPolicy::new(&config.root, &config.server.fs, &config.resolve.alias);
        let rewriter = ImportRewriter::new(config.root.clone(), config.resolve.alias.clone());
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .map_err(|e| Error::invalid(format!("failed to create proxy client: {e}")))?;

        tracing::debug!(
            strict = fs_policy.is_strict(),
            allowed = fs_policy.allowed_dirs().len(),
            proxied = !proxy.is_empty(),
            "Server policy"
        );
        for (index, plugin) in config.plugins.iter().enumerate() {
            tracing::debug!(index, plugin = %plugin.name, "Plugin registered");
        }

        let listener =
            bind_listener(&config.server.host, config.server.port, config.server.strict_port).await?;
        let addr = listener.local_addr()?;

        let (reload_tx, _) = broadcast::channel(16);
        let state = Arc::new(ServerState {
            config,
            proxy,
            fs_policy,
            rewriter,
            client,
            reload_tx,
        });

        Ok(Self {
            state,
            listener,
            addr,
        })
    }

    /// Address the server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sender used to push reload messages to connected browsers.
    #[must_use]
    pub fn reload_sender(&self) -> broadcast::Sender<ReloadMessage> {
        self.state.reload_tx.clone()
    }

    /// Serve until `shutdown` completes.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state);
        tracing::info!(address = %self.addr, "Dev server listening");
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Dev server stopped");
        Ok(())
    }
}

fn router(state: Arc<ServerState>) -> Router {
    let cors = state.config.server.cors;
    let app = Router::new()
        .route(reload::SOCKET_PATH, get(reload_socket))
        .route(reload::CLIENT_PATH, get(reload_client))
        .route("/@fs/*path", get(serve_fs))
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

type AppState = State<Arc<ServerState>>;

// ============================================================================
// Route Handlers
// ============================================================================

/// Proxy if a context matches, otherwise serve from the root.
async fn dispatch(State(state): AppState, request: Request<Body>) -> Response {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());

    if let Some((context, rule)) = state.proxy.match_path(&path_and_query) {
        return forward(&state, context, rule, request, &path_and_query).await;
    }

    let (parts, _body) = request.into_parts();
    match parts.method {
        Method::GET | Method::HEAD => serve_root(&state, &parts).await,
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn reload_client() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        reload::CLIENT_SCRIPT,
    )
}

async fn reload_socket(ws: WebSocketUpgrade, State(state): AppState) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_reload_socket(socket, state))
}

async fn handle_reload_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.reload_tx.subscribe();

    if socket
        .send(Message::Text(ReloadMessage::Connected.to_json()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    if socket.send(Message::Text(msg.to_json())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Serve an absolute path outside the root.
async fn serve_fs(
    State(state): AppState,
    AxumPath(path): AxumPath<String>,
    headers: HeaderMap,
    method: Method,
) -> Response {
    let abs = normalize_lexically(&Path::new("/").join(path.trim_start_matches('/')));

    if !state.fs_policy.is_allowed(&abs) {
        tracing::warn!(path = %abs.display(), "Denied by fs.strict");
        return (
            StatusCode::FORBIDDEN,
            format!(
                "The request url \"{FS_PREFIX}{}\" is outside of the allowed directories",
                abs.display()
            ),
        )
            .into_response();
    }

    file_response(&state, &abs, &headers, method == Method::HEAD).await
}

async fn serve_root(state: &ServerState, request: &Parts) -> Response {
    let root = &state.config.root;
    let raw = request.uri.path();
    let is_head = request.method == Method::HEAD;

    let Some(decoded) = percent_decode(raw) else {
        return (StatusCode::BAD_REQUEST, "Malformed request path").into_response();
    };
    let Some(mut path) = join_contained(root, &decoded) else {
        tracing::warn!(path = %decoded, "Rejected path outside the root");
        return StatusCode::FORBIDDEN.into_response();
    };

    if path.is_dir() {
        path = path.join("index.html");
    }

    if path.is_file() {
        return file_response(state, &path, &request.headers, is_head).await;
    }

    // SPA fallback: extension-less paths are client-side routes.
    if extension_of(&path).is_empty() {
        let index = root.join("index.html");
        if index.is_file() {
            return file_response(state, &index, &request.headers, is_head).await;
        }
    }

    (StatusCode::NOT_FOUND, format!("Not found: {decoded}")).into_response()
}

/// Read a file and build its response: reload-client injection for HTML,
/// alias rewriting for modules, `ETag` and conditional `304`.
async fn file_response(state: &ServerState, path: &Path, headers: &HeaderMap, is_head: bool) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, format!("Not found: {}", path.display())).into_response();
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let ext = extension_of(path);
    let body = if ext == "html" {
        reload::inject_client(&String::from_utf8_lossy(&bytes)).into_bytes()
    } else if is_module_extension(&ext) {
        state
            .rewriter
            .rewrite(&String::from_utf8_lossy(&bytes))
            .into_bytes()
    } else {
        bytes
    };

    let etag = weak_etag(&body);
    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| etag_matches(v, &etag));

    let mut response = if not_modified {
        StatusCode::NOT_MODIFIED.into_response()
    } else if is_head {
        let mut response = Response::new(Body::empty());
        if let Ok(len) = HeaderValue::from_str(&body.len().to_string()) {
            response.headers_mut().insert(header::CONTENT_LENGTH, len);
        }
        response
    } else {
        Response::new(Body::from(body))
    };

    let out = response.headers_mut();
    out.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(&ext)));
    out.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        out.insert(header::ETAG, value);
    }
    response
}

// ============================================================================
// Proxy
// ============================================================================

async fn forward(
    state: &ServerState,
    context: &str,
    rule: &ProxyRule,
    request: Request<Body>,
    path_and_query: &str,
) -> Response {
    let url = rule.forward_url(path_and_query);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(context, error = %e, "Rejected proxy request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let original_host = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let host = rule.host_header(original_host);

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    if let Some(value) = host.and_then(|h| HeaderValue::from_str(&h).ok()) {
        headers.insert(header::HOST, value);
    }
    for (name, value) in &rule.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    tracing::debug!(
        context,
        method = %parts.method,
        from = %path_and_query,
        to = %url,
        "Proxying request"
    );

    let upstream = state
        .client
        .request(parts.method.clone(), url.clone())
        .headers(headers)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(upstream) => {
            let status = upstream.status();
            let mut upstream_headers = upstream.headers().clone();
            strip_hop_by_hop(&mut upstream_headers);

            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = upstream_headers;
            response
        }
        Err(e) => {
            let err = Error::ProxyUpstream {
                target: url.to_string(),
                message: e.to_string(),
            };
            tracing::error!(code = err.code(), context, error = %err, "Proxy error");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Content type for a file extension.
fn content_type(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" | "ts" | "jsx" | "tsx" | "vue" => "application/javascript",
        "css" => "text/css",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Root-relative display form of a changed file, for reload messages.
#[must_use]
pub fn display_path(root: &Path, changed: &Path) -> String {
    match changed.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => changed.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("html"), "text/html; charset=utf-8");
        assert_eq!(content_type("vue"), "application/javascript");
        assert_eq!(content_type("woff2"), "font/woff2");
        assert_eq!(content_type("unknown"), "application/octet-stream");
    }

    #[test]
    fn test_display_path() {
        let root = Path::new("/work/demo");
        assert_eq!(display_path(root, Path::new("/work/demo/a/b.vue")), "/a/b.vue");
        assert_eq!(display_path(root, Path::new("/elsewhere/x.js")), "/elsewhere/x.js");
    }

    #[tokio::test]
    #[serial]
    async fn test_strict_port_fails_when_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_listener("127.0.0.1", port, true).await.unwrap_err();
        assert!(matches!(err, Error::PortInUse { port: p } if p == port));
        assert_eq!(err.code(), crate::error::codes::DEV_PORT_IN_USE);
    }

    #[tokio::test]
    #[serial]
    async fn test_non_strict_port_moves_on() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        match bind_listener("127.0.0.1", port, false).await {
            Ok(listener) => assert_ne!(listener.local_addr().unwrap().port(), port),
            // Every following port may be busy on a crowded host.
            Err(err) => assert_eq!(err.code(), crate::error::codes::DEV_PORT_IN_USE),
        }
    }

    #[tokio::test]
    async fn test_localhost_binds_loopback() {
        let listener = bind_listener("localhost", 0, false).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
