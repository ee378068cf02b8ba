//! Board backend over HTTP
//!
//! Talks to a `worklog serve` instance so the terminal board and the
//! move/delete commands can work against a shared server.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use worklog_core::{
    BackendError, BatchReorder, BoardBackend, BoardItem, BoardSnapshot, ItemId, MutationReceipt,
    NewItem,
};

use crate::server::ErrorBody;

/// Connect timeout; the overall persist bound is enforced by the controller
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("worklog/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = builder.send().await.map_err(unavailable)?;
        decode(response).await
    }
}

fn unavailable(err: reqwest::Error) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(unavailable);
    }

    let body = response.json::<ErrorBody>().await.ok();
    Err(status_error(status, body))
}

/// Map an error response onto the backend taxonomy
fn status_error(status: StatusCode, body: Option<ErrorBody>) -> BackendError {
    let message = body
        .map(|body| body.message)
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BackendError::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Forbidden,
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        _ => BackendError::Unavailable(message),
    }
}

#[async_trait]
impl BoardBackend for RemoteBackend {
    async fn load_snapshot(&self) -> Result<BoardSnapshot, BackendError> {
        self.send(self.request(Method::GET, "/api/board")).await
    }

    async fn add_item(&self, new: NewItem) -> Result<BoardItem, BackendError> {
        self.send(self.request(Method::POST, "/api/items").json(&new))
            .await
    }

    async fn delete_item(
        &self,
        id: ItemId,
        expected_revision: Option<u64>,
    ) -> Result<MutationReceipt, BackendError> {
        let path = match expected_revision {
            Some(revision) => format!("/api/items/{}?revision={}", id, revision),
            None => format!("/api/items/{}", id),
        };
        self.send(self.request(Method::DELETE, &path)).await
    }

    async fn apply_batch(&self, batch: BatchReorder) -> Result<MutationReceipt, BackendError> {
        tracing::debug!(placements = batch.placements.len(), "sending reorder batch");
        self.send(self.request(Method::PATCH, "/api/board/order").json(&batch))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::server::{router, AppState};
    use worklog_core::{
        check_ordering, AllowAll, BoardController, BoardError, Column, DropTarget, Store,
    };

    async fn spawn_server(store: Store, token: Option<&str>) -> String {
        let state = AppState::new(store).with_admin_token(token);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_status_mapping() {
        let body = ErrorBody {
            error: "conflict".to_string(),
            message: "column ideas changed".to_string(),
        };
        assert_eq!(
            status_error(StatusCode::CONFLICT, Some(body)),
            BackendError::Conflict("column ideas changed".to_string())
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, None),
            BackendError::Forbidden
        );
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, None),
            BackendError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None),
            BackendError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_controller_over_http() {
        let mut store = Store::open_in_memory().unwrap();
        let x = store.add_item(&NewItem::new("X", Column::Ideas)).unwrap();
        let y = store.add_item(&NewItem::new("Y", Column::Ideas)).unwrap();
        let z = store.add_item(&NewItem::new("Z", Column::Exploring)).unwrap();
        let url = spawn_server(store, Some("token")).await;

        let backend = RemoteBackend::new(&url, Some("token".to_string())).unwrap();
        let controller = BoardController::new(Arc::new(backend), Arc::new(AllowAll));
        controller.load().await.unwrap();

        controller
            .apply_reorder(x.id, DropTarget::new(Column::Exploring, 1))
            .await
            .unwrap();

        // A fresh load sees what the server stored
        controller.load().await.unwrap();
        let placed: Vec<_> = controller
            .items()
            .iter()
            .map(|item| (item.id, item.column, item.position))
            .collect();
        assert_eq!(
            placed,
            vec![
                (y.id, Column::Ideas, 0),
                (z.id, Column::Exploring, 0),
                (x.id, Column::Exploring, 1)
            ]
        );

        controller.delete_item(z.id).await.unwrap();
        controller.load().await.unwrap();
        check_ordering(&controller.items()).unwrap();
        assert_eq!(controller.column(Column::Exploring)[0].id, x.id);
    }

    #[tokio::test]
    async fn test_missing_token_loads_read_only() {
        let mut store = Store::open_in_memory().unwrap();
        let a = store.add_item(&NewItem::new("A", Column::Ideas)).unwrap();
        let b = store.add_item(&NewItem::new("B", Column::Ideas)).unwrap();
        let url = spawn_server(store, Some("token")).await;

        let backend = RemoteBackend::new(&url, None).unwrap();
        let controller = BoardController::new(Arc::new(backend), Arc::new(AllowAll));
        controller.load().await.unwrap();
        assert!(!controller.may_mutate());
        let before = controller.items();

        let err = controller
            .apply_reorder(b.id, DropTarget::new(Column::Ideas, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Forbidden));
        assert_eq!(controller.items(), before);
        assert_eq!(controller.column(Column::Ideas)[0].id, a.id);
    }

    #[tokio::test]
    async fn test_wrong_token_is_refused_by_server() {
        let mut store = Store::open_in_memory().unwrap();
        store.add_item(&NewItem::new("A", Column::Ideas)).unwrap();
        let url = spawn_server(store, Some("token")).await;

        let backend = RemoteBackend::new(&url, Some("guess".to_string())).unwrap();
        let err = backend
            .apply_batch(BatchReorder::default())
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Forbidden);

        let err = BoardError::NotSaved(err);
        assert_eq!(err.user_message(), "You are not allowed to change this board");
    }
}
