use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use homescreen_store::StoreError;
use homescreen_types::api::{
    AddCommentRequest, Claims, ToggleResponse, UploadScreenRequest, VisibilityRequest,
};
use homescreen_types::models::{ActionType, Visibility};

use crate::actions::client_from;
use crate::auth::AppState;
use crate::error::ApiResult;

/// Current public screens of every user. Never fails: a store outage shows as an empty feed.
pub async fn feed(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.records.feed().await)
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<UploadScreenRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state.records.upload_screen(&claims.sub, req.images).await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::PostCreate,
            serde_json::json!({ "screenId": view.screen.id, "imageCount": view.screen.images.len() }),
            client_from(&headers, None, None),
        )
        .await;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn current(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .records
        .current_screen(&owner)
        .await?
        .filter(|v| claims.sub == owner || v.screen.visibility == Visibility::Public)
        .ok_or_else(|| StoreError::NotFound(format!("screen:{}:current", owner)))?;
    Ok(Json(view))
}

pub async fn get_screen(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .records
        .get_screen(&owner, &screen_id)
        .await?
        .filter(|v| claims.sub == owner || v.screen.visibility == Visibility::Public)
        .ok_or_else(|| StoreError::NotFound(format!("screen:{}:{}", owner, screen_id)))?;

    state
        .actions
        .log(
            &claims.sub,
            ActionType::PostView,
            serde_json::json!({ "screenId": screen_id, "ownerId": owner }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(view))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let (screen, added) = state
        .records
        .toggle_like(&claims.sub, &owner, &screen_id)
        .await?;

    let action = if added {
        ActionType::LikeAdd
    } else {
        ActionType::LikeRemove
    };
    state
        .actions
        .log(
            &claims.sub,
            action,
            serde_json::json!({ "screenId": screen_id, "ownerId": owner }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(ToggleResponse { added, screen }))
}

pub async fn toggle_save(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let (screen, added) = state
        .records
        .toggle_save(&claims.sub, &owner, &screen_id)
        .await?;

    let action = if added {
        ActionType::SaveAdd
    } else {
        ActionType::SaveRemove
    };
    state
        .actions
        .log(
            &claims.sub,
            action,
            serde_json::json!({ "screenId": screen_id, "ownerId": owner }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(ToggleResponse { added, screen }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<AddCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .records
        .add_comment(&claims.sub, &owner, &screen_id, &req.text)
        .await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::CommentAdd,
            serde_json::json!({ "screenId": screen_id, "ownerId": owner }),
            client_from(&headers, None, None),
        )
        .await;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn set_visibility(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VisibilityRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .records
        .set_visibility(&claims.sub, &owner, &screen_id, req.visibility)
        .await?;
    Ok(Json(view))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((owner, screen_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state
        .records
        .delete_screen(&claims.sub, &owner, &screen_id)
        .await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::PostDelete,
            serde_json::json!({ "screenId": screen_id }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.records.saved_screens(&claims.sub).await?))
}
