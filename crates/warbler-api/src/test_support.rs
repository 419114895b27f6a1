//! Router-level test harness: an app on in-memory SQLite plus helpers to
//! fire requests at it with or without a session.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use tower::ServiceExt;
use warbler_db::Database;
use warbler_db::models::{NewMessage, UserRow};

use crate::auth::signup;
use crate::middleware::{SESSION_COOKIE, create_token};
use crate::state::{AppState, AppStateInner};

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let state = AppStateInner::new(db, "test-secret".into()).unwrap();
        Self {
            router: crate::router(state.clone()),
            state,
        }
    }

    pub fn signup(&self, username: &str, email: &str, password: &str) -> UserRow {
        signup(&self.state.db, username, email, password, None).unwrap()
    }

    /// Insert a user with a fixed id, the way fixtures pin `/users/10`.
    pub fn user_with_id(&self, id: i64, username: &str, email: &str) -> UserRow {
        self.state
            .db
            .create_user(&warbler_db::models::NewUser {
                id: Some(id),
                username,
                email,
                password_hash: "HASHED_PASSWORD",
                image_url: None,
            })
            .unwrap()
    }

    pub fn message(&self, id: Option<i64>, user_id: i64, text: &str) -> i64 {
        self.state
            .db
            .create_message(&NewMessage {
                id,
                text: Some(text),
                user_id,
            })
            .unwrap()
            .id
    }

    /// Cookie header value logging the request in as `user`.
    pub fn session_for(&self, user: &UserRow) -> String {
        let token = create_token(&self.state.secret_key, user.id, &user.username).unwrap();
        format!("{SESSION_COOKIE}={token}")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, None, cookie).await
    }

    pub async fn post(&self, uri: &str, form: &str, cookie: Option<&str>) -> TestResponse {
        self.send(Method::POST, uri, Some(form), cookie).await
    }

    /// GET the `Location` of a redirect, like a browser following it.
    pub async fn follow(&self, res: &TestResponse, cookie: Option<&str>) -> TestResponse {
        let to = res.location().expect("response is not a redirect").to_string();
        self.get(&to, cookie).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        form: Option<&str>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

/// `application/x-www-form-urlencoded` body; values here are plain ASCII
/// apart from spaces.
pub fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.replace(' ', "+")))
        .collect::<Vec<_>>()
        .join("&")
}
