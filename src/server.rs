//! Development server with live reload.
//!
//! The server runs on its own thread with a dedicated tokio runtime so the
//! synchronous build pipeline never has to be async. It either serves the
//! target's output directory or reverse-proxies an existing site, and injects
//! a small client into every HTML response:
//!
//! ```text
//! build task ──Reloader::changed──▶ broadcast ──SSE──▶ browser client
//!                                                      ├─ css only: swap <link> hrefs
//!                                                      └─ anything else: location.reload()
//! ```
//!
//! Settings come from the `browsersync` section of `config.json`.

use crate::config::BrowserSyncSettings;
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const DEFAULT_PORT: u16 = 3000;
const EVENTS_PATH: &str = "/__sitepipe/events";
const CLIENT_PATH: &str = "/__sitepipe/client.js";
/// Largest HTML body the injector will buffer.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

const CLIENT_JS: &str = r#"(function () {
  var notify = document.currentScript && document.currentScript.dataset.notify === "true";
  function toast(text) {
    if (!notify) return;
    var el = document.createElement("div");
    el.textContent = text;
    el.style.cssText = "position:fixed;top:0;right:0;z-index:2147483647;padding:12px 16px;" +
      "background:#1b1b1b;color:#fff;font:14px sans-serif;border-bottom-left-radius:6px";
    document.body.appendChild(el);
    setTimeout(function () { el.remove(); }, 1500);
  }
  var source = new EventSource("/__sitepipe/events");
  source.addEventListener("css", function (e) {
    var changed = JSON.parse(e.data);
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
      var href = link.getAttribute("href").split("?")[0];
      if (changed.some(function (name) { return href.slice(-name.length) === name; })) {
        link.setAttribute("href", href + "?v=" + Date.now());
      }
    });
    toast("Injected: " + changed.join(", "));
  });
  source.addEventListener("reload", function () {
    toast("Reloading...");
    location.reload();
  });
})();
"#;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid dev server port {0:?}")]
    Port(String),
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to start the server runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Dev server thread exited before it was ready")]
    Startup,
}

/// What a reload event asks the browser to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// Only stylesheets changed: swap them in place.
    Css(Vec<String>),
    Page,
}

impl ReloadEvent {
    /// Classify a batch of written files (relative to the served root).
    pub fn for_changes(changed: &[String]) -> Self {
        if !changed.is_empty() && changed.iter().all(|c| c.ends_with(".css")) {
            ReloadEvent::Css(changed.to_vec())
        } else {
            ReloadEvent::Page
        }
    }

    fn to_sse(&self) -> Event {
        match self {
            ReloadEvent::Css(files) => Event::default()
                .event("css")
                .data(serde_json::to_string(files).unwrap_or_else(|_| "[]".into())),
            ReloadEvent::Page => Event::default().event("reload").data("{}"),
        }
    }
}

/// Sending half of the reload channel, shared with build tasks.
#[derive(Clone)]
pub struct Reloader {
    tx: broadcast::Sender<ReloadEvent>,
}

impl Reloader {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: ReloadEvent) {
        // No connected browsers is not an error.
        let _ = self.tx.send(event);
    }

    /// Announce files written under `root`.
    pub fn changed(&self, root: &Path, written: &[PathBuf]) {
        let names: Vec<String> = written
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        let event = ReloadEvent::for_changes(&names);
        tracing::debug!(?event, "reload");
        self.send(event);
    }
}

impl Default for Reloader {
    fn default() -> Self {
        Self::new()
    }
}

/// How the browser is opened once the server is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Local,
    External,
    Never,
}

impl OpenMode {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "local" | "true" => OpenMode::Local,
            "external" => OpenMode::External,
            _ => OpenMode::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub root: PathBuf,
    pub port: u16,
    /// Upstream origin, already carrying a scheme.
    pub proxy: Option<String>,
    pub open: OpenMode,
    pub notify: bool,
}

impl ServerOptions {
    pub fn from_settings(root: &Path, settings: &BrowserSyncSettings) -> Result<Self, ServerError> {
        let port = match settings.port.trim() {
            "" => DEFAULT_PORT,
            raw => raw.parse().map_err(|_| ServerError::Port(raw.to_string()))?,
        };
        let proxy = match settings.proxy.trim() {
            "" => None,
            p if p.contains("://") => Some(p.trim_end_matches('/').to_string()),
            p => Some(format!("http://{}", p.trim_end_matches('/'))),
        };
        Ok(Self {
            root: root.to_path_buf(),
            port,
            proxy,
            open: OpenMode::parse(&settings.open),
            notify: settings.notify.trim() == "true",
        })
    }
}

/// A running server. Dropping the handle leaves the server running until the
/// process exits.
pub struct DevServer {
    pub address: SocketAddr,
    pub reloader: Reloader,
    _thread: thread::JoinHandle<()>,
}

impl DevServer {
    /// Bind and start serving in the background.
    pub fn start(options: ServerOptions) -> Result<Self, ServerError> {
        let reloader = Reloader::new();
        let address = SocketAddr::from(([0, 0, 0, 0], options.port));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let app = router(&options, reloader.clone());
        let handle = thread::Builder::new()
            .name("dev-server".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ServerError::Runtime(e)));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::bind(address).await {
                        Ok(l) => l,
                        Err(source) => {
                            let _ = ready_tx.send(Err(ServerError::Bind { address, source }));
                            return;
                        }
                    };
                    let bound = listener.local_addr().unwrap_or(address);
                    let _ = ready_tx.send(Ok(bound));
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!(error = %e, "dev server stopped");
                    }
                });
            })
            .map_err(ServerError::Runtime)?;

        let bound = ready_rx.recv().map_err(|_| ServerError::Startup)??;
        tracing::info!(address = %bound, root = %options.root.display(), "dev server listening");
        open_browser(options.open, bound.port());

        Ok(Self {
            address: bound,
            reloader,
            _thread: handle,
        })
    }
}

#[derive(Clone)]
struct AppState {
    reloader: Reloader,
    proxy: Option<String>,
    client: reqwest::Client,
    notify: bool,
}

fn router(options: &ServerOptions, reloader: Reloader) -> Router {
    let state = AppState {
        reloader,
        proxy: options.proxy.clone(),
        client: reqwest::Client::new(),
        notify: options.notify,
    };

    let base = Router::new()
        .route(EVENTS_PATH, get(events))
        .route(CLIENT_PATH, get(client_js));

    let app = if state.proxy.is_some() {
        base.fallback(proxy)
    } else {
        base.fallback_service(ServeDir::new(&options.root).append_index_html_on_directories(true))
    };

    app.layer(axum::middleware::from_fn_with_state(
        state.clone(),
        inject_client,
    ))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.reloader.subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(event.to_sse()), rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn client_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_JS,
    )
}

async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let Some(upstream) = state.proxy.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = request
        .uri()
        .path_and_query()
        .map_or("/", |p| p.as_str())
        .to_string();
    let url = format!("{upstream}{path}");
    let method = request.method().clone();
    let mut headers = request.headers().clone();
    headers.remove(header::HOST);
    headers.remove(header::ACCEPT_ENCODING);

    let body = match axum::body::to_bytes(request.into_body(), MAX_INJECT_BYTES).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let upstream_response = match state
        .client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%url, error = %e, "proxy request failed");
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let status = upstream_response.status();
    let headers = upstream_response.headers().clone();
    match upstream_response.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response.headers_mut().remove(header::TRANSFER_ENCODING);
            response
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// Insert the live-reload client before `</body>` (or at the end).
pub fn inject_script(html: &str, notify: bool) -> String {
    let tag = format!(r#"<script src="{CLIENT_PATH}" data-notify="{notify}" async></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{html}{tag}"),
    }
}

async fn inject_client(
    State(state): State<AppState>,
    request: Request,
    next: axum::middleware::Next,
) -> Response {
    let response = next.run(request).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let Ok(html) = std::str::from_utf8(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };
    let injected = inject_script(html, state.notify);
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_ENCODING);
    if let Ok(len) = HeaderValue::from_str(&injected.len().to_string()) {
        parts.headers.insert(header::CONTENT_LENGTH, len);
    }
    Response::from_parts(parts, Body::from(injected))
}

/// The machine's LAN address, found by asking the OS which interface would
/// route outward. Nothing is sent.
fn external_ip() -> Option<std::net::IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}

fn open_browser(mode: OpenMode, port: u16) {
    let host = match mode {
        OpenMode::Never => return,
        OpenMode::Local => "localhost".to_string(),
        OpenMode::External => external_ip().map_or("localhost".to_string(), |ip| ip.to_string()),
    };
    let url = format!("http://{host}:{port}/");

    let command = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(&url).spawn()
    } else if cfg!(windows) {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &url])
            .spawn()
    } else {
        std::process::Command::new("xdg-open").arg(&url).spawn()
    };
    match command {
        Ok(_) => tracing::info!(%url, "opened browser"),
        Err(e) => tracing::warn!(%url, error = %e, "could not open a browser"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(proxy: &str, port: &str, open: &str, notify: &str) -> BrowserSyncSettings {
        BrowserSyncSettings {
            proxy: proxy.into(),
            port: port.into(),
            open: open.into(),
            notify: notify.into(),
        }
    }

    #[test]
    fn options_default_port_and_static_mode() {
        let opts = ServerOptions::from_settings(Path::new("/site/dev"), &settings("", "", "", ""))
            .unwrap();
        assert_eq!(opts.port, DEFAULT_PORT);
        assert_eq!(opts.proxy, None);
        assert_eq!(opts.open, OpenMode::Never);
        assert!(!opts.notify);
    }

    #[test]
    fn options_proxy_gets_scheme() {
        let opts = ServerOptions::from_settings(
            Path::new("/x"),
            &settings("localhost:8080/", "4000", "external", "true"),
        )
        .unwrap();
        assert_eq!(opts.proxy.as_deref(), Some("http://localhost:8080"));
        assert_eq!(opts.port, 4000);
        assert_eq!(opts.open, OpenMode::External);
        assert!(opts.notify);
    }

    #[test]
    fn options_reject_bad_port() {
        assert!(matches!(
            ServerOptions::from_settings(Path::new("/x"), &settings("", "abc", "", "")),
            Err(ServerError::Port(_))
        ));
    }

    #[test]
    fn open_mode_parsing() {
        assert_eq!(OpenMode::parse("true"), OpenMode::Local);
        assert_eq!(OpenMode::parse("local"), OpenMode::Local);
        assert_eq!(OpenMode::parse("external"), OpenMode::External);
        assert_eq!(OpenMode::parse("false"), OpenMode::Never);
        assert_eq!(OpenMode::parse(""), OpenMode::Never);
    }

    #[test]
    fn css_only_batches_hot_swap() {
        assert_eq!(
            ReloadEvent::for_changes(&["assets/styles/modern.css".into()]),
            ReloadEvent::Css(vec!["assets/styles/modern.css".into()])
        );
        assert_eq!(
            ReloadEvent::for_changes(&["a.css".into(), "index.html".into()]),
            ReloadEvent::Page
        );
        assert_eq!(ReloadEvent::for_changes(&[]), ReloadEvent::Page);
    }

    #[test]
    fn reloader_strips_root() {
        let reloader = Reloader::new();
        let mut rx = reloader.subscribe();
        reloader.changed(
            Path::new("/site/dev"),
            &[PathBuf::from("/site/dev/assets/styles/modern.css")],
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadEvent::Css(vec!["assets/styles/modern.css".into()])
        );
    }

    #[test]
    fn reloader_without_listeners_is_fine() {
        Reloader::new().send(ReloadEvent::Page);
    }

    #[test]
    fn inject_before_closing_body() {
        let out = inject_script("<html><BODY>hi</BODY></html>", false);
        assert!(out.starts_with("<html><BODY>hi<script"));
        assert!(out.ends_with("</script></BODY></html>"));
        assert!(out.contains(r#"data-notify="false""#));
    }

    #[test]
    fn inject_appends_without_body() {
        let out = inject_script("<p>fragment</p>", true);
        assert!(out.starts_with("<p>fragment</p><script"));
        assert!(out.contains(r#"data-notify="true""#));
    }

    #[test]
    fn serves_files_with_injected_client() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<body>home</body>").unwrap();
        let server = DevServer::start(ServerOptions {
            root: tmp.path().to_path_buf(),
            port: 0,
            proxy: None,
            open: OpenMode::Never,
            notify: false,
        })
        .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let url = format!("http://127.0.0.1:{}/", server.address.port());
        let body = runtime.block_on(async {
            reqwest::get(&url).await.unwrap().text().await.unwrap()
        });
        assert!(body.contains("home"));
        assert!(body.contains(CLIENT_PATH));
    }
}
