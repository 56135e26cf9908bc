use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};

use homescreen_types::api::{Claims, MarkAllReadResponse, NotificationView, UnreadCountResponse};
use homescreen_types::models::ActionType;

use crate::actions::client_from;
use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let views: Vec<NotificationView> = state
        .records
        .notifications(&claims.sub)
        .await?
        .into_iter()
        .map(|(notification, from_display_name)| NotificationView {
            notification,
            from_display_name,
        })
        .collect();

    state
        .actions
        .log(
            &claims.sub,
            ActionType::NotificationView,
            serde_json::json!({ "count": views.len() }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(views))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let unread = state.records.unread_count(&claims.sub).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let notification = state
        .records
        .mark_read(&claims.sub, &notification_id)
        .await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::NotificationClick,
            serde_json::json!({ "notificationId": notification.id, "screenId": notification.screen_id }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.records.mark_all_read(&claims.sub).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
