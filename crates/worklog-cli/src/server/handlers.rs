//! Route handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use worklog_core::{
    filter_visible, BatchReorder, BoardItem, BoardSnapshot, ItemDocument, ItemId, ItemNote,
    ItemUpdate, MutationReceipt, NewDocument, NewItem, NewNote, Visibility,
};

use super::{ApiError, AppState};

type ApiResult<T> = Result<T, ApiError>;

/// Unwrap a JSON body, turning axum's rejection into a validation error
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_board(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<BoardSnapshot>> {
    let snapshot = state.store.lock().await.snapshot()?;
    let visibility = state.visibility(&headers);
    let items = filter_visible(&snapshot.items, visibility, &state.private_marker);
    Ok(Json(BoardSnapshot {
        items,
        revisions: snapshot.revisions,
        read_only: visibility == Visibility::Public,
    }))
}

pub async fn reorder(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BatchReorder>, JsonRejection>,
) -> ApiResult<Json<MutationReceipt>> {
    state.require_privileged(&headers)?;
    let batch = body(payload)?;

    let result = state.store.lock().await.apply_batch(&batch);
    match result {
        Ok(receipt) => Ok(Json(receipt)),
        Err(err) => {
            tracing::warn!(
                placements = batch.placements.len(),
                error = %err,
                "rejected reorder batch"
            );
            Err(ApiError::from_batch(err))
        }
    }
}

pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BoardItem>)> {
    state.require_privileged(&headers)?;
    let new = body(payload)?;

    let item = state.store.lock().await.add_item(&new)?;
    tracing::info!(item = %item.id, column = %item.column, "added item");
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ItemId>,
) -> ApiResult<Json<BoardItem>> {
    let item = state.store.lock().await.get_item(id)?;
    let hidden = |item: &BoardItem| {
        state.visibility(&headers) == Visibility::Public && item.is_private(&state.private_marker)
    };

    match item {
        Some(item) if !hidden(&item) => Ok(Json(item)),
        _ => Err(ApiError::NotFound(format!("item not found: {}", id))),
    }
}

pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ItemId>,
    payload: Result<Json<ItemUpdate>, JsonRejection>,
) -> ApiResult<Json<BoardItem>> {
    state.require_privileged(&headers)?;
    let update = body(payload)?;

    let item = state.store.lock().await.update_item(id, &update)?;
    Ok(Json(item))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Column revision the caller last saw
    revision: Option<u64>,
}

pub async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ItemId>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<MutationReceipt>> {
    state.require_privileged(&headers)?;

    let receipt = state.store.lock().await.delete_item(id, params.revision)?;
    tracing::info!(item = %id, "deleted item");
    Ok(Json(receipt))
}

pub async fn add_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ItemId>,
    payload: Result<Json<NewNote>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ItemNote>)> {
    state.require_privileged(&headers)?;
    let new = body(payload)?;

    let note = state.store.lock().await.add_note(id, &new)?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn delete_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, note_id)): Path<(ItemId, Uuid)>,
) -> ApiResult<StatusCode> {
    state.require_privileged(&headers)?;

    state.store.lock().await.delete_note(id, note_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ItemId>,
    payload: Result<Json<NewDocument>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ItemDocument>)> {
    state.require_privileged(&headers)?;
    let new = body(payload)?;

    let document = state.store.lock().await.add_document(id, &new)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, doc_id)): Path<(ItemId, Uuid)>,
) -> ApiResult<StatusCode> {
    state.require_privileged(&headers)?;

    state.store.lock().await.delete_document(id, doc_id)?;
    Ok(StatusCode::NO_CONTENT)
}
