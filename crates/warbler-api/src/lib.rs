pub mod auth;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod users;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use state::{AppState, AppStateInner};

/// All Warbler routes. Static assets are mounted by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(users::homepage))
        .route("/signup", get(auth::signup_form).post(auth::signup_submit))
        .route("/login", get(auth::login_form).post(auth::login_submit))
        .route("/logout", get(auth::logout))
        .route("/users", get(users::list_users))
        .route("/users/{user_id}", get(users::show_user))
        .route("/messages/{message_id}", get(messages::show_message));

    let protected_routes = Router::new()
        .route("/users/{user_id}/following", get(users::show_following))
        .route("/users/{user_id}/followers", get(users::show_followers))
        .route("/users/{user_id}/likes", get(users::show_likes))
        .route("/users/follow/{user_id}", post(users::add_follow))
        .route("/users/stop-following/{user_id}", post(users::stop_following))
        .route("/users/profile", get(users::edit_profile_form).post(users::edit_profile_submit))
        .route("/users/delete", post(users::delete_user))
        .route("/users/add_like/{message_id}", post(users::toggle_like))
        .route("/messages/new", get(messages::new_message_form).post(messages::create_message))
        .route("/messages/{message_id}/delete", post(messages::delete_message))
        .layer(axum_middleware::from_fn(middleware::require_login));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(views::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_session,
        ))
        .with_state(state)
}
