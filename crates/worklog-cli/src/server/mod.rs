//! Board HTTP server
//!
//! Serves the board to browsers and to remote `worklog` clients.
//!
//! ## Routes
//!
//! - `GET    /health`
//! - `GET    /api/board`: snapshot, private items only for privileged callers;
//!   `read_only` tells unprivileged callers not to offer changes
//! - `PATCH  /api/board/order`: atomic batch reorder
//! - `POST   /api/items`, `GET|PUT|DELETE /api/items/:id`; a delete may carry
//!   `?revision=N` and is refused with 409 if the column moved on
//! - `POST   /api/items/:id/notes`, `DELETE /api/items/:id/notes/:note_id`
//! - `POST   /api/items/:id/documents`, `DELETE /api/items/:id/documents/:doc_id`
//!
//! All requests share one store behind an async mutex, so batches from
//! different sessions are applied one at a time, each in its own
//! transaction.

mod error;
mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderMap};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use worklog_core::{Config, Store, Visibility};

pub use error::{ApiError, ErrorBody};

/// Cookie carrying the admin token for browser sessions
pub const SESSION_COOKIE: &str = "worklog_session";

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
    admin_token: Option<Arc<str>>,
    private_marker: Arc<str>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        let config = store.config().clone();
        Self {
            store: Arc::new(Mutex::new(store)),
            admin_token: config.admin_token.map(Arc::from),
            private_marker: Arc::from(config.private_marker),
        }
    }

    /// Replace the configured token (`None` makes every caller privileged)
    pub fn with_admin_token(mut self, token: Option<&str>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }

    /// Whether a request may mutate and see private items
    pub fn is_privileged(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.admin_token.as_deref() else {
            return true;
        };
        request_token(headers).is_some_and(|token| token == expected)
    }

    fn visibility(&self, headers: &HeaderMap) -> Visibility {
        Visibility::from_privileged(self.is_privileged(headers))
    }

    fn require_privileged(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if self.is_privileged(headers) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Bearer token, or the session cookie
fn request_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/board", get(handlers::get_board))
        .route("/api/board/order", patch(handlers::reorder))
        .route("/api/items", post(handlers::create_item))
        .route(
            "/api/items/:id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/api/items/:id/notes", post(handlers::add_note))
        .route(
            "/api/items/:id/notes/:note_id",
            delete(handlers::delete_note),
        )
        .route("/api/items/:id/documents", post(handlers::add_document))
        .route(
            "/api/items/:id/documents/:doc_id",
            delete(handlers::delete_document),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the board until Ctrl-C
pub async fn serve(store: Store, config: &Config, bind_addr: &str) -> Result<()> {
    let state = AppState::new(store);
    if config.admin_token.is_none() {
        tracing::warn!("no admin_token configured: every caller may modify the board");
    }

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "worklog server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("worklog server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use worklog_core::{check_ordering, BoardItem, BoardSnapshot, Column, NewItem};

    const TOKEN: &str = "s3cret";

    fn app_with(items: &[(&str, Column, Option<&str>)]) -> (AppState, Vec<BoardItem>) {
        let mut store = Store::open_in_memory().unwrap();
        let added = items
            .iter()
            .map(|(title, column, issue)| {
                let mut new = NewItem::new(*title, *column);
                new.issue_key = issue.map(str::to_string);
                store.add_item(&new).unwrap()
            })
            .collect();
        (AppState::new(store).with_admin_token(Some(TOKEN)), added)
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
        auth: bool,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn board(state: &AppState) -> BoardSnapshot {
        state.store.lock().await.snapshot().unwrap()
    }

    #[test]
    fn test_request_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_token(&headers), None);

        headers.insert(header::COOKIE, "theme=dark; worklog_session=abc".parse().unwrap());
        assert_eq!(request_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Bearer xyz".parse().unwrap());
        assert_eq!(request_token(&headers), Some("xyz"));
    }

    #[test]
    fn test_no_token_means_everyone_is_privileged() {
        let state = AppState::new(Store::open_in_memory().unwrap()).with_admin_token(None);
        assert!(state.is_privileged(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = app_with(&[]);
        let (status, body) = send(&state, Method::GET, "/health", None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_public_board_hides_private_items() {
        let (state, _) = app_with(&[
            ("Open work", Column::Ideas, Some("acme/research#1")),
            ("Roadmap", Column::Ideas, Some("acme/roadmap-private#2")),
            ("Later", Column::Ideas, None),
        ]);

        let (status, public) = send(&state, Method::GET, "/api/board", None, false).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<_> = public["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Open work", "Later"]);
        // Stored positions are not renumbered for the public view
        assert_eq!(public["items"][1]["position"], 2);

        assert_eq!(public["read_only"], true);

        let (_, full) = send(&state, Method::GET, "/api/board", None, true).await;
        assert_eq!(full["items"].as_array().unwrap().len(), 3);
        assert_eq!(full["read_only"], false);
    }

    #[tokio::test]
    async fn test_private_item_is_not_found_for_public() {
        let (state, items) = app_with(&[("Roadmap", Column::Ideas, Some("acme/plans-private#2"))]);
        let uri = format!("/api/items/{}", items[0].id);

        let (status, body) = send(&state, Method::GET, &uri, None, false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = send(&state, Method::GET, &uri, None, true).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mutations_require_token() {
        let (state, _) = app_with(&[]);
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/items",
            Some(json!({"title": "Sneaky"})),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
        assert!(board(&state).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_create_item_appends() {
        let (state, _) = app_with(&[("First", Column::Exploring, None)]);
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/items",
            Some(json!({"title": "Second", "column": "exploring"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["position"], 1);
        assert_eq!(body["column"], "exploring");
    }

    #[tokio::test]
    async fn test_unknown_column_is_validation_error() {
        let (state, _) = app_with(&[]);
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/items",
            Some(json!({"title": "Bad", "column": "backlog"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn test_reorder_cross_column() {
        let (state, items) = app_with(&[
            ("X", Column::Ideas, None),
            ("Y", Column::Ideas, None),
            ("Z", Column::Exploring, None),
        ]);
        let (x, y, z) = (items[0].id, items[1].id, items[2].id);

        let (status, body) = send(
            &state,
            Method::PATCH,
            "/api/board/order",
            Some(json!({
                "placements": [
                    {"id": z, "column": "exploring", "position": 0},
                    {"id": x, "column": "exploring", "position": 1},
                    {"id": y, "column": "ideas", "position": 0}
                ]
            })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["revisions"]["ideas"].as_u64().unwrap() > 0);

        let snapshot = board(&state).await;
        check_ordering(&snapshot.items).unwrap();
        let placed: Vec<_> = snapshot
            .items
            .iter()
            .map(|item| (item.id, item.column, item.position))
            .collect();
        assert_eq!(
            placed,
            vec![
                (y, Column::Ideas, 0),
                (z, Column::Exploring, 0),
                (x, Column::Exploring, 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_reorder_unknown_id_rejected_without_writes() {
        let (state, items) = app_with(&[("A", Column::Ideas, None), ("B", Column::Ideas, None)]);
        let before = board(&state).await;

        let (status, body) = send(
            &state,
            Method::PATCH,
            "/api/board/order",
            Some(json!({
                "placements": [
                    {"id": items[1].id, "column": "ideas", "position": 0},
                    {"id": uuid::Uuid::new_v4(), "column": "ideas", "position": 1}
                ]
            })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        assert_eq!(board(&state).await, before);
    }

    #[tokio::test]
    async fn test_reorder_stale_revision_conflicts() {
        let (state, items) = app_with(&[("A", Column::Ideas, None), ("B", Column::Ideas, None)]);
        let (a, b) = (items[0].id, items[1].id);
        let swap = |first: uuid::Uuid, second: uuid::Uuid| {
            json!({
                "placements": [
                    {"id": first, "column": "ideas", "position": 0},
                    {"id": second, "column": "ideas", "position": 1}
                ],
                "expected_revisions": {"ideas": 0}
            })
        };

        let uri = "/api/board/order";

        let (status, _) = send(&state, Method::PATCH, uri, Some(swap(b, a)), true).await;
        assert_eq!(status, StatusCode::OK);

        // Planned against revision 0, which is gone now
        let (status, body) = send(&state, Method::PATCH, uri, Some(swap(a, b)), true).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_delete_closes_gap() {
        let (state, items) = app_with(&[
            ("A", Column::Discussing, None),
            ("B", Column::Discussing, None),
            ("C", Column::Discussing, None),
        ]);
        let uri = format!("/api/items/{}", items[1].id);

        let (status, _) = send(&state, Method::DELETE, &uri, None, true).await;
        assert_eq!(status, StatusCode::OK);

        let positions: Vec<_> = board(&state)
            .await
            .items
            .iter()
            .map(|item| (item.title.clone(), item.position))
            .collect();
        assert_eq!(positions, vec![("A".to_string(), 0), ("C".to_string(), 1)]);

        let (status, _) = send(&state, Method::DELETE, &uri, None, true).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_with_stale_revision_conflicts() {
        let (state, items) = app_with(&[("A", Column::Ideas, None), ("B", Column::Ideas, None)]);
        let (a, b) = (items[0].id, items[1].id);

        let (status, _) = send(
            &state,
            Method::PATCH,
            "/api/board/order",
            Some(json!({
                "placements": [
                    {"id": b, "column": "ideas", "position": 0},
                    {"id": a, "column": "ideas", "position": 1}
                ]
            })),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stale = format!("/api/items/{}?revision=0", a);
        let (status, body) = send(&state, Method::DELETE, &stale, None, true).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
        assert_eq!(board(&state).await.items.len(), 2);

        let current = format!("/api/items/{}?revision=1", a);
        let (status, body) = send(&state, Method::DELETE, &current, None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revisions"]["ideas"], 2);
    }

    #[tokio::test]
    async fn test_update_moves_column() {
        let (state, items) = app_with(&[("A", Column::Ideas, None), ("B", Column::Closed, None)]);
        let uri = format!("/api/items/{}", items[0].id);

        let (status, body) = send(
            &state,
            Method::PUT,
            &uri,
            Some(json!({"column": "closed", "description": "done"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["column"], "closed");
        assert_eq!(body["position"], 1);
        assert_eq!(body["description"], "done");
    }

    #[tokio::test]
    async fn test_notes_and_documents() {
        let (state, items) = app_with(&[("A", Column::Ideas, None)]);
        let item_uri = format!("/api/items/{}", items[0].id);

        let (status, note) = send(
            &state,
            Method::POST,
            &format!("{}/notes", item_uri),
            Some(json!({"body": "Talked to the team"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, doc) = send(
            &state,
            Method::POST,
            &format!("{}/documents", item_uri),
            Some(json!({"title": "Design notes", "location": "https://docs.example.com/a"})),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, item) = send(&state, Method::GET, &item_uri, None, true).await;
        assert_eq!(item["notes"].as_array().unwrap().len(), 1);
        assert_eq!(item["documents"].as_array().unwrap().len(), 1);

        let note_uri = format!("{}/notes/{}", item_uri, note["id"].as_str().unwrap());
        let (status, _) = send(&state, Method::DELETE, &note_uri, None, true).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let doc_uri = format!("{}/documents/{}", item_uri, doc["id"].as_str().unwrap());
        let (status, _) = send(&state, Method::DELETE, &doc_uri, None, true).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&state, Method::DELETE, &doc_uri, None, true).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
