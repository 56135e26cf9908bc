use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;

use homescreen_store::StoreError;
use homescreen_types::api::{Claims, MeResponse, ProfileSetup, ProfileUpdate, PublicProfile};
use homescreen_types::models::ActionType;

use crate::actions::client_from;
use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.records.get_user(&claims.sub).await?;
    Ok(Json(MeResponse {
        user_id: claims.sub,
        email: claims.email,
        profile,
    }))
}

pub async fn complete_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<ProfileSetup>,
) -> ApiResult<impl IntoResponse> {
    let user = state.records.complete_profile(&claims.sub, req).await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::Signup,
            serde_json::json!({ "displayName": user.display_name }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<ProfileUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut changed = Vec::new();
    if req.display_name.is_some() {
        changed.push("displayName");
    }
    if req.bio.is_some() {
        changed.push("bio");
    }
    if req.age_public_setting.is_some() {
        changed.push("agePublicSetting");
    }
    if req.profile_image.is_some() {
        changed.push("profileImage");
    }

    let user = state.records.update_profile(&claims.sub, req).await?;
    state
        .actions
        .log(
            &claims.sub,
            ActionType::ProfileEdit,
            serde_json::json!({ "fields": changed }),
            client_from(&headers, None, None),
        )
        .await;
    Ok(Json(user))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .records
        .get_user(&user_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user:{}", user_id)))?;

    if claims.sub != user_id {
        state
            .actions
            .log(
                &claims.sub,
                ActionType::ProfileView,
                serde_json::json!({ "viewedUserId": user_id }),
                client_from(&headers, None, None),
            )
            .await;
    }
    Ok(Json(PublicProfile::of(user, Utc::now().date_naive())))
}

/// Screens on a profile page. Non-owners only see public screens.
pub async fn profile_screens(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.records.profile_screens(&user_id, &claims.sub).await?))
}
