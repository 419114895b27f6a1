use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use minijinja::context;
use thiserror::Error;
use tracing::{error, info, warn};
use warbler_db::models::{NewUser, UserRow};
use warbler_db::{Database, DbError};
use warbler_types::api::{LoginForm, SignupForm, non_blank};

use crate::middleware::{CurrentUser, clear_session, create_token, session_cookie};
use crate::state::{AppState, blocking, query};
use crate::views::redirect;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Create an account. A taken username or email comes back as
/// `AuthError::Db(DbError::Integrity(_))`.
pub fn signup(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<UserRow, AuthError> {
    let password_hash = hash_password(password)?;
    let user = db.create_user(&NewUser {
        id: None,
        username,
        email,
        password_hash: &password_hash,
        image_url,
    })?;
    Ok(user)
}

/// Look the user up and check the password. Unknown user and wrong password
/// both yield `Ok(None)`; only storage failures are errors.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<Option<UserRow>, DbError> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    let parsed_hash = match PasswordHash::new(&user.password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Unreadable password hash for user {}: {}", user.id, e);
            return Ok(None);
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(Some(user)),
        Err(_) => Ok(None),
    }
}

// -- Handlers --

pub async fn signup_form(State(state): State<AppState>, current: CurrentUser) -> Response {
    if current.0.is_some() {
        return redirect("/");
    }
    state.views.page(
        StatusCode::OK,
        "users/signup.html",
        context! { current_user => &current.0, error => (), form => () },
    )
}

pub async fn signup_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, StatusCode> {
    let rerender = |status: StatusCode, error: &str, form: &SignupForm| {
        state.views.page(
            status,
            "users/signup.html",
            context! {
                current_user => &current.0,
                error => error,
                form => context! { username => &form.username, email => &form.email, image_url => &form.image_url },
            },
        )
    };

    if let Some(problem) = validate_signup(&form) {
        return Ok(rerender(StatusCode::BAD_REQUEST, problem, &form));
    }

    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    let password = form.password.clone();
    let image_url = non_blank(form.image_url.clone());

    let created = blocking(&state, move |db| {
        signup(db, &username, &email, &password, image_url.as_deref())
    })
    .await?;

    let user = match created {
        Ok(user) => user,
        Err(AuthError::Db(e)) if e.is_integrity() => {
            info!("Signup rejected for {}: {}", form.username, e);
            return Ok(rerender(StatusCode::CONFLICT, "Username already taken", &form));
        }
        Err(e) => {
            error!("Signup failed: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    info!("New user {} ({})", user.username, user.id);
    start_session(&state, jar, &user)
}

pub async fn login_form(State(state): State<AppState>, current: CurrentUser) -> Response {
    if current.0.is_some() {
        return redirect("/");
    }
    state.views.page(
        StatusCode::OK,
        "users/login.html",
        context! { current_user => &current.0, error => (), username => "" },
    )
}

pub async fn login_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, StatusCode> {
    let username = form.username.clone();
    let password = form.password;
    let user = query(&state, move |db| authenticate(db, &username, &password)).await?;

    match user {
        Some(user) => {
            info!("User {} logged in", user.username);
            start_session(&state, jar, &user)
        }
        None => Ok(state.views.page(
            StatusCode::UNAUTHORIZED,
            "users/login.html",
            context! {
                current_user => &current.0,
                error => "Invalid credentials.",
                username => &form.username,
            },
        )),
    }
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (clear_session(jar), redirect("/login"))
}

fn start_session(state: &AppState, jar: CookieJar, user: &UserRow) -> Result<Response, StatusCode> {
    let token = create_token(&state.secret_key, user.id, &user.username).map_err(|e| {
        error!("Failed to sign session token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok((jar.add(session_cookie(token)), redirect("/")).into_response())
}

fn validate_signup(form: &SignupForm) -> Option<&'static str> {
    if form.username.trim().is_empty() {
        return Some("Username is required.");
    }
    let email = form.email.trim();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Some("Invalid email address.");
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 6 characters.");
    }
    None
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};

    use super::*;
    use crate::test_support::{TestApp, form_body};

    #[test]
    fn signup_hashes_password() {
        let db = Database::open_in_memory().unwrap();
        let user = signup(&db, "testuser", "test@test.com", "password", None).unwrap();

        assert_eq!(user.username, "testuser");
        assert_ne!(user.password, "password");
        assert!(user.password.starts_with("$argon2"));
        assert_eq!(user.image_url, warbler_types::models::DEFAULT_IMAGE_URL);
    }

    #[test]
    fn duplicate_signup_is_integrity_error() {
        let db = Database::open_in_memory().unwrap();
        signup(&db, "test", "test@test.com", "testing", None).unwrap();

        match signup(&db, "test", "test@test.com", "testing", None) {
            Err(AuthError::Db(e)) => assert!(e.is_integrity()),
            other => panic!("expected integrity error, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn authenticate_accepts_right_password_only() {
        let db = Database::open_in_memory().unwrap();
        let user = signup(&db, "testuser", "test@test.com", "password", None).unwrap();

        let found = authenticate(&db, "testuser", "password").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(authenticate(&db, "testuser", "wrong").unwrap().is_none());
        assert!(authenticate(&db, "nobody", "password").unwrap().is_none());
    }

    #[test]
    fn authenticate_with_unhashed_password_is_none() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&NewUser {
            id: None,
            username: "testuser",
            email: "test@test.com",
            password_hash: "HASHED_PASSWORD",
            image_url: None,
        })
        .unwrap();

        assert!(authenticate(&db, "testuser", "HASHED_PASSWORD").unwrap().is_none());
    }

    #[tokio::test]
    async fn signup_sets_session_and_redirects() {
        let app = TestApp::new();
        let res = app
            .post(
                "/signup",
                &form_body(&[
                    ("username", "newbie"),
                    ("email", "newbie@test.com"),
                    ("password", "secret123"),
                    ("image_url", ""),
                ]),
                None,
            )
            .await;

        assert_eq!(res.status, StatusCode::FOUND);
        assert_eq!(res.location(), Some("/"));
        let cookie = res.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("curr_user="));

        let user = app.state.db.get_user_by_username("newbie").unwrap().unwrap();
        assert_eq!(user.image_url, warbler_types::models::DEFAULT_IMAGE_URL);
    }

    #[tokio::test]
    async fn signup_with_taken_username_rerenders_form() {
        let app = TestApp::new();
        app.signup("testuser", "test@test.com", "testuser");

        let res = app
            .post(
                "/signup",
                &form_body(&[
                    ("username", "testuser"),
                    ("email", "other@test.com"),
                    ("password", "testuser"),
                ]),
                None,
            )
            .await;

        assert_eq!(res.status, StatusCode::CONFLICT);
        assert!(res.body.contains("Username already taken"));
    }

    #[tokio::test]
    async fn signup_rejects_short_password() {
        let app = TestApp::new();
        let res = app
            .post(
                "/signup",
                &form_body(&[("username", "u"), ("email", "u@test.com"), ("password", "123")]),
                None,
            )
            .await;

        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(app.state.db.get_user_by_username("u").unwrap().is_none());
    }

    #[tokio::test]
    async fn login_and_logout() {
        let app = TestApp::new();
        let user = app.signup("testuser", "test@test.com", "password");

        let bad = app
            .post(
                "/login",
                &form_body(&[("username", "testuser"), ("password", "nope")]),
                None,
            )
            .await;
        assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
        assert!(bad.body.contains("Invalid credentials."));

        let good = app
            .post(
                "/login",
                &form_body(&[("username", "testuser"), ("password", "password")]),
                None,
            )
            .await;
        assert_eq!(good.status, StatusCode::FOUND);
        assert!(good.headers.get(header::SET_COOKIE).is_some());

        let out = app.get("/logout", Some(&app.session_for(&user))).await;
        assert_eq!(out.status, StatusCode::FOUND);
        assert_eq!(out.location(), Some("/login"));
        let cleared = out.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.starts_with("curr_user=;"), "{cleared}");

        let anon = app.get("/logout", None).await;
        assert_eq!(anon.status, StatusCode::FOUND);
        assert_eq!(anon.location(), Some("/login"));
    }
}
