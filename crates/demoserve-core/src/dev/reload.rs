//! Live reload: the browser client and the messages sent to it.
//!
//! Pages served by the dev server get a `<script>` tag pointing at
//! [`CLIENT_PATH`]. The client opens a WebSocket to [`SOCKET_PATH`] and
//! reloads the page on a `full-reload` message.

use serde::Serialize;

/// URL of the reload client script.
pub const CLIENT_PATH: &str = "/@reload-client";

/// URL of the reload WebSocket.
pub const SOCKET_PATH: &str = "/__reload";

/// Messages pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadMessage {
    /// Sent once after the socket opens.
    Connected,
    /// Reload the page; `path` is the changed file relative to the root.
    FullReload {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl ReloadMessage {
    #[must_use]
    pub fn to_json(&self) -> String {
        // Serializing a fieldless/str-only enum cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"full-reload"}"#.to_string())
    }
}

/// Inject the reload client into an HTML document.
///
/// Placed before `</head>`, else before `</body>`, else appended. Documents
/// that already reference the client are returned unchanged.
#[must_use]
pub fn inject_client(html: &str) -> String {
    if html.contains(CLIENT_PATH) {
        return html.to_string();
    }
    let tag = format!(r#"<script type="module" src="{CLIENT_PATH}"></script>"#);

    let mut out = html.to_string();
    if let Some(pos) = out.find("</head>") {
        out.insert_str(pos, &format!("  {tag}\n  "));
    } else if let Some(pos) = out.find("</body>") {
        out.insert_str(pos, &format!("  {tag}\n  "));
    } else {
        out.push('\n');
        out.push_str(&tag);
    }
    out
}

/// The reload client runtime.
pub const CLIENT_SCRIPT: &str = r"
// demoserve live reload client
const socketUrl = `${location.protocol === 'https:' ? 'wss' : 'ws'}://${location.host}/__reload`;
let retryDelay = 250;

function connect() {
  const ws = new WebSocket(socketUrl);

  ws.onopen = () => {
    retryDelay = 250;
  };

  ws.onmessage = (event) => {
    const msg = JSON.parse(event.data);
    if (msg.type === 'connected') {
      console.debug('[demoserve] connected.');
    } else if (msg.type === 'full-reload') {
      console.debug('[demoserve] reloading', msg.path ?? '');
      location.reload();
    }
  };

  ws.onclose = () => {
    setTimeout(connect, retryDelay);
    retryDelay = Math.min(retryDelay * 2, 5000);
  };
}

connect();
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json() {
        assert_eq!(ReloadMessage::Connected.to_json(), r#"{"type":"connected"}"#);
        assert_eq!(
            ReloadMessage::FullReload { path: None }.to_json(),
            r#"{"type":"full-reload"}"#
        );
        assert_eq!(
            ReloadMessage::FullReload {
                path: Some("/index.html".into())
            }
            .to_json(),
            r#"{"type":"full-reload","path":"/index.html"}"#
        );
    }

    #[test]
    fn test_inject_before_head_close() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = inject_client(html);
        let script = out.find(CLIENT_PATH).unwrap();
        assert!(script < out.find("</head>").unwrap());
    }

    #[test]
    fn test_inject_without_head() {
        let out = inject_client("<body><div id=app></div></body>");
        assert!(out.find(CLIENT_PATH).unwrap() < out.find("</body>").unwrap());

        let bare = inject_client("<div></div>");
        assert!(bare.ends_with("</script>"));
    }

    #[test]
    fn test_inject_is_idempotent() {
        let once = inject_client("<head></head>");
        assert_eq!(inject_client(&once), once);
    }
}
