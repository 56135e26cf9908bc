use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use homescreen_store::{ActionLog, Records, Session};
use homescreen_types::api::{Claims, SignInRequest, SignInResponse};
use homescreen_types::models::ActionType;

use crate::actions::client_from;
use crate::error::{ApiError, ApiResult};
use crate::validate::Validator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub records: Records,
    pub actions: ActionLog,
    pub session: Session,
    pub validator: Validator,
    pub jwt_secret: String,
    /// Tag of the active shared backend, reported by the health check.
    pub backend: &'static str,
}

/// Mock sign-in: any email/provider pair gets a fresh user id and a 30-day token.
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim();
    if email.is_empty() || req.provider.trim().is_empty() {
        return Err(ApiError::BadRequest("email and provider are required".into()));
    }

    let user = state.session.sign_in(email, req.provider.trim()).await?;
    let token = create_token(&state.jwt_secret, &user.id, &user.email)?;

    state
        .actions
        .log(
            &user.id,
            ActionType::Login,
            serde_json::json!({ "provider": user.provider }),
            client_from(&headers, None, None),
        )
        .await;

    Ok(Json(SignInResponse {
        user_id: user.id,
        token,
    }))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    // Only drop the saved session if it belongs to the caller.
    if let Some(saved) = state.session.restore().await? {
        if saved.id == claims.sub {
            state.session.sign_out().await?;
        }
    }
    state
        .actions
        .log(
            &claims.sub,
            ActionType::Logout,
            serde_json::Value::Null,
            client_from(&headers, None, None),
        )
        .await;

    info!("{} signed out", claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_token(secret: &str, user_id: &str, email: &str) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))
}
