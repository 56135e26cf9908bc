use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use homescreen_types::api::{ActionQuery, Claims, LogActionRequest};
use homescreen_types::models::ClientInfo;

use crate::auth::AppState;
use crate::error::ApiResult;

/// Client environment for an action entry: the request's User-Agent plus
/// whatever screen size the client reported.
pub(crate) fn client_from(headers: &HeaderMap, width: Option<u32>, height: Option<u32>) -> ClientInfo {
    ClientInfo {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        screen_width: width,
        screen_height: height,
    }
}

/// Client-reported action (navigation, views). Logging is best effort.
pub async fn log_action(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<LogActionRequest>,
) -> impl IntoResponse {
    let client = client_from(&headers, req.screen_width, req.screen_height);
    let entry = state
        .actions
        .log(&claims.sub, req.action_type, req.metadata, client)
        .await;
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "logged": entry.is_some() })),
    )
}

pub async fn list_actions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.actions.user_actions(&claims.sub, &query).await?))
}

pub async fn action_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.actions.stats(&claims.sub).await?))
}

pub async fn export_actions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let csv = state.actions.export_csv(&claims.sub).await?;
    let filename = format!(
        "attachment; filename=\"actions_{}_{}.csv\"",
        claims.sub,
        chrono::Utc::now().timestamp_millis()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}

/// Per-user action stats for every profile.
pub async fn all_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.actions.all_users_stats().await?))
}
