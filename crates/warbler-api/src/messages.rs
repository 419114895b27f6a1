use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use minijinja::context;
use tracing::{error, info, warn};
use warbler_db::models::NewMessage;
use warbler_types::api::{MessageForm, non_blank};
use warbler_types::models::{MAX_MESSAGE_LEN, User};

use crate::middleware::CurrentUser;
use crate::state::{AppState, blocking, query};
use crate::views::{message_cards, not_found_page, redirect};

pub async fn new_message_form(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
) -> Response {
    state.views.page(
        StatusCode::OK,
        "messages/new.html",
        context! { current_user => &me, error => (), text => "", max_len => MAX_MESSAGE_LEN },
    )
}

/// A missing, blank or over-long text is rejected by the schema and the
/// form is shown again.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    Form(form): Form<MessageForm>,
) -> Result<Response, StatusCode> {
    let user_id = me.id;
    let text = non_blank(form.text.clone());
    let created = blocking(&state, move |db| {
        db.create_message(&NewMessage {
            id: None,
            text: text.as_deref(),
            user_id,
        })
    })
    .await?;

    match created {
        Ok(message) => {
            info!("User {} posted message {}", me.id, message.id);
            Ok(redirect(&format!("/users/{}", me.id)))
        }
        Err(e) if e.is_integrity() => {
            warn!("Message from user {} rejected: {}", me.id, e);
            Ok(state.views.page(
                StatusCode::BAD_REQUEST,
                "messages/new.html",
                context! {
                    current_user => &me,
                    error => format!("A message needs text of at most {MAX_MESSAGE_LEN} characters."),
                    text => form.text.unwrap_or_default(),
                    max_len => MAX_MESSAGE_LEN,
                },
            ))
        }
        Err(e) => {
            error!("Failed to create message: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn show_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let viewer = current.0.as_ref().map(|u| u.id);
    let found = query(&state, move |db| {
        let Some(row) = db.get_message(message_id)? else {
            return Ok(None);
        };
        let Some(author) = db.get_user_by_id(row.user_id)? else {
            return Ok(None);
        };
        let liked = match viewer {
            Some(uid) if db.has_liked(uid, message_id)? => HashSet::from([message_id]),
            _ => HashSet::new(),
        };
        Ok::<_, warbler_db::DbError>(Some((row, author, liked)))
    })
    .await?;

    let Some((row, author, liked)) = found else {
        return Ok(not_found_page(&state, &current));
    };

    let is_owner = viewer == Some(row.user_id);
    let message = message_cards(vec![row], &liked).remove(0);

    Ok(state.views.page(
        StatusCode::OK,
        "messages/show.html",
        context! {
            current_user => &current.0,
            message => message,
            author => author.into_model(),
            is_owner => is_owner,
        },
    ))
}

/// Only the author may delete; others get 403.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let owner = query(&state, move |db| {
        Ok::<_, warbler_db::DbError>(db.get_message(message_id)?.map(|m| m.user_id))
    })
    .await?;

    match owner {
        None => Ok(not_found_page(&state, &current)),
        Some(owner) if owner != me.id => {
            warn!("User {} tried to delete message {} owned by {}", me.id, message_id, owner);
            Err(StatusCode::FORBIDDEN)
        }
        Some(_) => {
            query(&state, move |db| db.delete_message(message_id)).await?;
            info!("User {} deleted message {}", me.id, message_id);
            Ok(redirect(&format!("/users/{}", me.id)))
        }
    }
}
