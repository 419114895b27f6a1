use std::collections::HashSet;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use minijinja::{Environment, Value, context};
use tracing::error;
use warbler_db::models::{MessageRow, UserRow};
use warbler_types::api::{MessageCard, UserCard};

use crate::middleware::CurrentUser;
use crate::state::AppState;

/// Templates are compiled into the binary; names follow their path under
/// `templates/`.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("404.html", include_str!("../templates/404.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("home-anon.html", include_str!("../templates/home-anon.html")),
    ("messages/list.html", include_str!("../templates/messages/list.html")),
    ("messages/new.html", include_str!("../templates/messages/new.html")),
    ("messages/show.html", include_str!("../templates/messages/show.html")),
    ("users/signup.html", include_str!("../templates/users/signup.html")),
    ("users/login.html", include_str!("../templates/users/login.html")),
    ("users/index.html", include_str!("../templates/users/index.html")),
    ("users/cards.html", include_str!("../templates/users/cards.html")),
    ("users/detail.html", include_str!("../templates/users/detail.html")),
    ("users/show.html", include_str!("../templates/users/show.html")),
    ("users/following.html", include_str!("../templates/users/following.html")),
    ("users/followers.html", include_str!("../templates/users/followers.html")),
    ("users/likes.html", include_str!("../templates/users/likes.html")),
    ("users/edit.html", include_str!("../templates/users/edit.html")),
];

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> anyhow::Result<Self> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<Html<String>, StatusCode> {
        let template = self.env.get_template(name).map_err(|e| {
            error!("Unknown template {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let html = template.render(ctx).map_err(|e| {
            error!("Failed to render {}: {:#}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        Ok(Html(html))
    }

    /// Render with an explicit status, for re-displayed forms and error pages.
    pub fn page(&self, status: StatusCode, name: &str, ctx: Value) -> Response {
        match self.render(name, ctx) {
            Ok(html) => (status, html).into_response(),
            Err(code) => code.into_response(),
        }
    }
}

/// 302 redirect, matching what browsers and form posts expect after a write.
pub fn redirect(to: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, to.to_string())]).into_response()
}

pub fn not_found_page(state: &AppState, current: &CurrentUser) -> Response {
    state.views.page(
        StatusCode::NOT_FOUND,
        "404.html",
        context! { current_user => &current.0 },
    )
}

pub async fn not_found(State(state): State<AppState>, current: CurrentUser) -> Response {
    not_found_page(&state, &current)
}

pub fn message_cards(rows: Vec<MessageRow>, liked: &HashSet<i64>) -> Vec<MessageCard> {
    rows.into_iter()
        .map(|row| {
            let message = row.to_model();
            MessageCard {
                posted_at: message.timestamp.format("%d %B %Y").to_string(),
                liked: liked.contains(&row.id),
                author_username: row.author_username,
                author_image_url: row.author_image_url,
                message,
            }
        })
        .collect()
}

pub fn user_cards(rows: Vec<UserRow>, followed: &HashSet<i64>) -> Vec<UserCard> {
    rows.into_iter()
        .map(|row| UserCard {
            followed: followed.contains(&row.id),
            user: row.into_model(),
        })
        .collect()
}
