//! WebSocket transport and HTTP routes.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use codeshare_core::{Route, SessionStore};
use codeshare_session::SessionSynchronizer;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{connection::Connection, pages, protocol::ServerMessage};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Synchronizer over the process-wide store.
    pub synchronizer: SessionSynchronizer<dyn SessionStore>,
}

impl AppState {
    /// Create new handler state.
    #[must_use]
    pub const fn new(synchronizer: SessionSynchronizer<dyn SessionStore>) -> Self {
        Self { synchronizer }
    }

    /// Build state from a concrete store.
    #[must_use]
    pub fn from_store(
        store: Arc<dyn SessionStore>,
        config: codeshare_core::SyncConfig,
    ) -> Self {
        Self::new(SessionSynchronizer::new(store, config))
    }
}

/// Create the application router.
///
/// # Example
/// ```ignore
/// let state = AppState::from_store(Arc::new(MemoryStore::new()), SyncConfig::default());
/// axum::serve(listener, create_router(state)).await?;
/// ```
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/new", get(new_session_handler))
        .route("/session", get(redirect_home))
        .route("/session/", get(redirect_home))
        .route("/session/{id}", get(editor_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn landing_handler() -> Html<String> {
    Html(pages::landing())
}

async fn new_session_handler() -> Redirect {
    let route = Route::new_session();
    tracing::info!("Minted {}", route.path());
    Redirect::to(&route.path())
}

async fn redirect_home() -> Redirect {
    Redirect::to("/")
}

async fn editor_handler(Path(id): Path<String>) -> Response {
    match Route::parse(&format!("/session/{id}")) {
        Route::Editor(id) => Html(pages::editor(&id)).into_response(),
        Route::Redirect(target) => Redirect::to(&target).into_response(),
        Route::Landing | Route::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Spawn task to forward messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(state.synchronizer.clone(), tx);

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        connection.handle_text(&text).await;
    }

    // Cleanup
    if let Some(id) = connection.session_id() {
        tracing::info!("WebSocket for session {id} disconnected");
    }
    connection.leave().await;
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use codeshare_core::SyncConfig;
    use codeshare_session::storage::MemoryStore;
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        create_router(AppState::from_store(
            Arc::new(MemoryStore::new()),
            SyncConfig::default(),
        ))
    }

    async fn get_path(path: &str) -> Response {
        let request = assert_ok!(Request::builder().uri(path).body(Body::empty()));
        assert_ok!(app().oneshot(request).await)
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_landing_page() {
        let response = get_path("/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_new_mints_session() {
        let response = get_path("/new").await;
        assert!(response.status().is_redirection());
        let target = location(&response);
        assert!(matches!(Route::parse(target), Route::Editor(_)));
    }

    #[tokio::test]
    async fn test_session_without_id_redirects_home() {
        for path in ["/session", "/session/"] {
            let response = get_path(path).await;
            assert!(response.status().is_redirection(), "{path}");
            assert_eq!(location(&response), "/");
        }
    }

    #[tokio::test]
    async fn test_editor_page() {
        let response = get_path("/session/A1").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_path("/session/bad%20id").await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/");
    }
}
