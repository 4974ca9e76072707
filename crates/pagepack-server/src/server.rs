//! Development server implementation.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::RwLock;

use pagepack_static::{BuildError, BuildOutput, ChunkManifest, InMemoryBuild, StaticBuilder};

use crate::watcher::{FileWatcher, WatchEvent};
use crate::websocket::{hmr_client_script, HmrHub, HmrMessage};

const HMR_PATH: &str = "/__hmr";
const HMR_SCRIPT_PATH: &str = "/__hmr.js";

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4200,
            open: false,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Initial build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Build task failed: {0}")]
    TaskError(String),
}

/// Shared server state.
struct ServerState {
    builder: Arc<StaticBuilder>,
    output: BuildOutput,
    manifest: ChunkManifest,
    hmr: HmrHub,
    hot: bool,
}

type SharedState = Arc<RwLock<ServerState>>;

/// Development server serving the build from memory.
pub struct DevServer {
    config: DevServerConfig,
    builder: StaticBuilder,
}

impl DevServer {
    pub fn new(builder: StaticBuilder, config: DevServerConfig) -> Self {
        Self { config, builder }
    }

    /// Build once, then serve and rebuild on changes until stopped.
    pub async fn start(self) -> Result<(), ServerError> {
        let hot = self.builder.descriptor().optimization().hot;
        let context = self.builder.descriptor().context.clone();
        let builder = Arc::new(self.builder);

        let build = run_blocking({
            let builder = Arc::clone(&builder);
            move || builder.build_in_memory()
        })
        .await??;

        tracing::info!(
            "Built {} pages, {} chunks, {} assets in memory",
            build.pages,
            build.chunks,
            build.assets
        );

        let state = Arc::new(RwLock::new(ServerState {
            builder,
            output: build.output,
            manifest: build.manifest,
            hmr: HmrHub::new(),
            hot,
        }));

        // Without hot reload no watcher runs
        let _watcher = if hot {
            let (watcher, mut rx) = FileWatcher::new(&[context])
                .map_err(|e| ServerError::WatchError(e.to_string()))?;

            let state_clone = Arc::clone(&state);
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    handle_watch_event(&state_clone, event).await;
                }
            });
            Some(watcher)
        } else {
            None
        };

        let app = router(state);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindError(addr.clone(), e.to_string()))?;

        tracing::info!("Starting dev server at http://{}", addr);

        if self.config.open {
            let url = format!("http://{}", addr);
            let _ = open::that(&url);
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route(HMR_PATH, get(ws_handler))
        .route(HMR_SCRIPT_PATH, get(hmr_script_handler))
        .fallback(file_handler)
        .with_state(state)
}

async fn run_blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::TaskError(e.to_string()))
}

/// Handle file watch events.
async fn handle_watch_event(state: &SharedState, event: WatchEvent) {
    let builder = Arc::clone(&state.read().await.builder);

    match event {
        WatchEvent::TemplateModified(path) => {
            tracing::info!("Template modified: {}", path.display());

            let manifest = state.read().await.manifest.clone();
            let result = run_blocking(move || reassemble(&builder, &path, &manifest)).await;

            match result {
                Ok(Ok(pages)) => {
                    let mut state = state.write().await;
                    for (filename, html) in pages {
                        state.output.insert(filename, html);
                    }
                    state.hmr.send(HmrMessage::Reload);
                }
                Ok(Err(e)) => report_error(state, e.to_string()).await,
                Err(e) => report_error(state, e.to_string()).await,
            }
        }

        other => {
            tracing::info!("Changed: {}", other.path().display());

            let result = run_blocking(move || builder.build_in_memory()).await;

            match result {
                Ok(Ok(build)) => apply_build(state, build).await,
                Ok(Err(e)) => report_error(state, e.to_string()).await,
                Err(e) => report_error(state, e.to_string()).await,
            }
        }
    }
}

/// Re-render the pages affected by an edited template.
fn reassemble(
    builder: &StaticBuilder,
    template: &std::path::Path,
    manifest: &ChunkManifest,
) -> Result<Vec<(String, String)>, BuildError> {
    builder
        .pages_using(template)
        .into_iter()
        .map(|page| {
            builder
                .reassemble_page(&page.filename, manifest)
                .map(|html| (page.filename.clone(), html))
        })
        .collect()
}

async fn apply_build(state: &SharedState, build: InMemoryBuild) {
    let mut state = state.write().await;

    let message = update_message(&state.output, &state.manifest, &build.output, &build.manifest);

    state.output = build.output;
    state.manifest = build.manifest;

    match message {
        Some(message) => {
            tracing::debug!("Rebuilt, sending {:?}", message);
            state.hmr.send(message);
        }
        None => tracing::debug!("Rebuilt, output unchanged"),
    }
}

async fn report_error(state: &SharedState, message: String) {
    tracing::error!("Rebuild failed: {}", message);
    state.read().await.hmr.send(HmrMessage::Error { message });
}

/// What clients need to do to show `new` instead of `old`.
///
/// Stylesheet-only changes are applied in place; anything else reloads.
fn update_message(
    old: &BuildOutput,
    old_manifest: &ChunkManifest,
    new: &BuildOutput,
    new_manifest: &ChunkManifest,
) -> Option<HmrMessage> {
    if old == new && old_manifest == new_manifest {
        return None;
    }

    if old_manifest != new_manifest {
        return Some(HmrMessage::Reload);
    }

    let non_css = |output: &BuildOutput| -> Vec<(String, Vec<u8>)> {
        output
            .iter()
            .filter(|(path, _)| !path.ends_with(".css"))
            .map(|(path, contents)| (path.to_string(), contents.to_vec()))
            .collect()
    };

    if non_css(old) == non_css(new) {
        Some(HmrMessage::CssUpdate)
    } else {
        Some(HmrMessage::Reload)
    }
}

/// Serve a file from the in-memory output.
async fn file_handler(State(state): State<SharedState>, uri: Uri) -> impl IntoResponse {
    let state = state.read().await;

    match lookup(&state.output, uri.path()) {
        Some((path, contents)) => {
            let body = if state.hot && path.ends_with(".html") {
                inject_hmr_script(&String::from_utf8_lossy(contents)).into_bytes()
            } else {
                contents.to_vec()
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type(&path))],
                body,
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Not found: {}", uri.path()).into_bytes(),
        ),
    }
}

/// Map a request path to an output file: `/` and `/dir/` serve `index.html`.
///
/// The path is percent-decoded first; invalid UTF-8 finds nothing.
fn lookup<'a>(output: &'a BuildOutput, request: &str) -> Option<(String, &'a [u8])> {
    let decoded = urlencoding::decode(request).ok()?;
    let trimmed = decoded.trim_start_matches('/');
    let mut path = PathBuf::from(trimmed)
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    if trimmed.is_empty() || trimmed.ends_with('/') {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str("index.html");
    }

    output.get(&path).map(|contents| (path, contents))
}

fn inject_hmr_script(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", HMR_SCRIPT_PATH);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = html.to_string();
            out.insert_str(pos, &tag);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "html" => "text/html; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// Handler for the HMR WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: SharedState) {
    let mut rx = state.read().await.hmr.subscribe();

    if !send(&mut socket, &HmrMessage::Connected).await {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if !send(&mut socket, &msg).await {
            break;
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &HmrMessage) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handler for the HMR client script.
async fn hmr_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        hmr_client_script(HMR_PATH),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepack_descriptor::{Descriptor, Mode};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn output(files: &[(&str, &str)]) -> BuildOutput {
        let mut out = BuildOutput::new();
        for (path, contents) in files {
            out.insert(*path, *contents);
        }
        out
    }

    fn manifest() -> ChunkManifest {
        ChunkManifest {
            scripts: vec!["main.js".to_string()],
            styles: vec!["main.css".to_string()],
        }
    }

    #[test]
    fn default_config_listens_on_4200() {
        let config = DevServerConfig::default();
        assert_eq!(config.port, 4200);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn looks_up_index_and_files() {
        let out = output(&[
            ("index.html", "home"),
            ("main.js", "js"),
            ("blog/index.html", "blog"),
        ]);

        assert_eq!(lookup(&out, "/").unwrap().1, b"home");
        assert_eq!(lookup(&out, "/main.js").unwrap().1, b"js");
        assert_eq!(lookup(&out, "/blog/").unwrap().1, b"blog");
        assert!(lookup(&out, "/missing.html").is_none());
        assert_eq!(lookup(&out, "/../main.js").unwrap().0, "main.js");
    }

    #[test]
    fn decodes_request_paths() {
        let out = output(&[
            ("img/team photo.png", "png"),
            ("img/café.svg", "svg"),
            ("main.js", "js"),
        ]);

        assert_eq!(lookup(&out, "/img/team%20photo.png").unwrap().1, b"png");
        assert_eq!(lookup(&out, "/img/caf%C3%A9.svg").unwrap().0, "img/café.svg");
        assert_eq!(lookup(&out, "/%2E%2E/main.js").unwrap().0, "main.js");
        assert!(lookup(&out, "/img/%FF.png").is_none());
    }

    #[test]
    fn maps_content_types() {
        assert_eq!(content_type("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type("vendors~main.js"), "application/javascript; charset=utf-8");
        assert_eq!(content_type("img/logo.svg"), "image/svg+xml");
        assert_eq!(content_type("fonts/a.woff2"), "font/woff2");
        assert_eq!(content_type("LICENSE"), "application/octet-stream");
    }

    #[test]
    fn injects_client_script() {
        assert_eq!(
            inject_hmr_script("<body><p>x</p></body>"),
            "<body><p>x</p><script src=\"/__hmr.js\"></script></body>"
        );
        assert!(inject_hmr_script("<p>x</p>").ends_with("<script src=\"/__hmr.js\"></script>"));
    }

    #[test]
    fn style_only_changes_update_css() {
        let old = output(&[("index.html", "a"), ("main.css", "body{}"), ("main.js", "1")]);
        let css = output(&[("index.html", "a"), ("main.css", "p{}"), ("main.js", "1")]);
        let js = output(&[("index.html", "a"), ("main.css", "body{}"), ("main.js", "2")]);

        assert_eq!(update_message(&old, &manifest(), &old, &manifest()), None);
        assert_eq!(
            update_message(&old, &manifest(), &css, &manifest()),
            Some(HmrMessage::CssUpdate)
        );
        assert_eq!(
            update_message(&old, &manifest(), &js, &manifest()),
            Some(HmrMessage::Reload)
        );

        let mut split = manifest();
        split.scripts.insert(0, "vendors~main.js".to_string());
        assert_eq!(
            update_message(&old, &manifest(), &css, &split),
            Some(HmrMessage::Reload)
        );
    }

    fn site(root: &std::path::Path) {
        let src = root.join("src");
        fs::create_dir_all(src.join("styles")).unwrap();
        for page in pagepack_descriptor::default_pages() {
            fs::write(
                src.join(&page.filename),
                "<html><head></head><body>{{ page.filename }}</body></html>",
            )
            .unwrap();
        }
        fs::write(src.join("styles/main.scss"), "body { margin: 0; }").unwrap();
        fs::write(src.join("index.js"), "import './styles/main.scss';\n").unwrap();
    }

    async fn state_for(root: &std::path::Path, mode: Mode) -> SharedState {
        let builder = StaticBuilder::new(Descriptor::new(root, mode));
        let hot = builder.descriptor().optimization().hot;
        let build = builder.build_in_memory().unwrap();

        Arc::new(RwLock::new(ServerState {
            builder: Arc::new(builder),
            output: build.output,
            manifest: build.manifest,
            hmr: HmrHub::new(),
            hot,
        }))
    }

    #[tokio::test]
    async fn template_edit_reassembles_only_that_page() {
        let temp = tempdir().unwrap();
        site(temp.path());
        let state = state_for(temp.path(), Mode::Development).await;
        let mut rx = state.read().await.hmr.subscribe();

        let template = temp.path().join("src/contacts.html");
        fs::write(&template, "<body>edited</body>").unwrap();
        fs::write(temp.path().join("src/services.html"), "<body>not yet</body>").unwrap();

        handle_watch_event(&state, WatchEvent::TemplateModified(template)).await;

        let state = state.read().await;
        let contacts = String::from_utf8_lossy(state.output.get("contacts.html").unwrap()).into_owned();
        let services = String::from_utf8_lossy(state.output.get("services.html").unwrap()).into_owned();
        assert!(contacts.contains("edited"));
        assert!(services.contains("services.html"));
        assert_eq!(rx.try_recv().unwrap(), HmrMessage::Reload);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_last_output() {
        let temp = tempdir().unwrap();
        site(temp.path());
        let state = state_for(temp.path(), Mode::Development).await;
        let mut rx = state.read().await.hmr.subscribe();
        let before = state.read().await.output.clone();

        let style = temp.path().join("src/styles/main.scss");
        fs::write(&style, "body { margin: ").unwrap();
        handle_watch_event(&state, WatchEvent::StyleModified(style)).await;

        assert_eq!(state.read().await.output, before);
        match rx.try_recv().unwrap() {
            HmrMessage::Error { message } => assert!(message.contains("main.scss")),
            other => panic!("Expected Error message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn style_edit_sends_css_update() {
        let temp = tempdir().unwrap();
        site(temp.path());
        let state = state_for(temp.path(), Mode::Development).await;
        let mut rx = state.read().await.hmr.subscribe();

        let style = temp.path().join("src/styles/main.scss");
        fs::write(&style, "body { margin: 2px; }").unwrap();
        handle_watch_event(&state, WatchEvent::StyleModified(style)).await;

        assert_eq!(rx.try_recv().unwrap(), HmrMessage::CssUpdate);
        let css = String::from_utf8_lossy(state.read().await.output.get("main.css").unwrap()).into_owned();
        assert!(css.contains("2px"));
    }

    #[tokio::test]
    async fn production_serves_without_client_script() {
        let temp = tempdir().unwrap();
        site(temp.path());
        let state = state_for(temp.path(), Mode::Production).await;

        assert!(!state.read().await.hot);
        let response = file_handler(State(Arc::clone(&state)), Uri::from_static("/"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let dev = state_for(temp.path(), Mode::Development).await;
        assert!(dev.read().await.hot);
        let missing = file_handler(State(dev), Uri::from_static("/nope.html"))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
