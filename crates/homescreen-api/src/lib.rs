pub mod actions;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod profiles;
pub mod screens;
pub mod validate;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Every API route. Transport layers (CORS, tracing, body limit) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(validate::health))
        .route("/api/validate-homescreen", post(validate::validate_homescreen))
        .route("/auth/sign-in", post(auth::sign_in))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/me", get(profiles::me))
        .route(
            "/me/profile",
            put(profiles::complete_profile).patch(profiles::update_profile),
        )
        .route("/me/saved", get(screens::saved))
        .route("/me/notifications", get(notifications::list))
        .route("/me/notifications/unread-count", get(notifications::unread_count))
        .route("/me/notifications/read-all", post(notifications::mark_all_read))
        .route("/me/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/me/actions", post(actions::log_action).get(actions::list_actions))
        .route("/me/actions/stats", get(actions::action_stats))
        .route("/me/actions/export", get(actions::export_actions))
        .route("/admin/stats", get(actions::all_stats))
        .route("/feed", get(screens::feed))
        .route("/screens", post(screens::upload))
        .route("/users/{user_id}", get(profiles::get_profile))
        .route("/users/{user_id}/screens", get(profiles::profile_screens))
        .route("/users/{user_id}/screens/current", get(screens::current))
        .route(
            "/users/{user_id}/screens/{screen_id}",
            get(screens::get_screen).delete(screens::delete),
        )
        .route("/users/{user_id}/screens/{screen_id}/like", post(screens::toggle_like))
        .route("/users/{user_id}/screens/{screen_id}/save", post(screens::toggle_save))
        .route("/users/{user_id}/screens/{screen_id}/comments", post(screens::add_comment))
        .route(
            "/users/{user_id}/screens/{screen_id}/visibility",
            put(screens::set_visibility),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
