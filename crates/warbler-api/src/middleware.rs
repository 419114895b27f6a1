use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use warbler_types::api::Claims;
use warbler_types::models::User;

use crate::state::{AppState, query};
use crate::views;

/// Cookie holding the signed session token.
pub const SESSION_COOKIE: &str = "curr_user";

const SESSION_DAYS: i64 = 30;

/// The logged-in user for this request, if any. Always present in request
/// extensions once `load_session` has run.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<User>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned().unwrap_or_default())
    }
}

/// Resolve the session cookie to a user. A missing, invalid or expired token,
/// or one naming a deleted user, leaves the request anonymous.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => resolve_user(&state, cookie.value()).await,
        None => None,
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

async fn resolve_user(state: &AppState, token: &str) -> Option<User> {
    let claims = match decode_token(&state.secret_key, token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Rejected session token: {}", e);
            return None;
        }
    };

    let row = query(state, move |db| db.get_user_by_id(claims.sub))
        .await
        .ok()
        .flatten()?;
    Some(row.into_model())
}

/// Gate for login-required routes: anonymous requests are redirected home,
/// logged-in ones get the `User` as an extension.
pub async fn require_login(mut req: Request, next: Next) -> Response {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .and_then(|current| current.0.clone());

    match user {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => {
            debug!("Access unauthorized: {} {}", req.method(), req.uri());
            views::redirect("/")
        }
    }
}

pub fn create_token(secret: &str, user_id: i64, username: &str) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn decode_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let token = create_token("secret", 10, "testuser").unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 10);
        assert_eq!(claims.username, "testuser");
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = create_token("secret", 10, "testuser").unwrap();
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: 10,
            username: "testuser".into(),
            exp: (chrono::Utc::now() - chrono::Duration::days(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(decode_token("secret", &token).is_err());
    }
}
