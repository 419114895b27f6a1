use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use minijinja::{Value, context};
use tracing::{error, info, warn};
use warbler_db::models::{MessageRow, ProfileUpdate, UserRow};
use warbler_db::queries::TIMELINE_LIMIT;
use warbler_db::{Database, DbError};
use warbler_types::api::{ProfileForm, SearchQuery, non_blank};
use warbler_types::models::{User, UserCounts};

use crate::auth::authenticate;
use crate::middleware::{CurrentUser, clear_session};
use crate::state::{AppState, blocking, query};
use crate::views::{message_cards, not_found_page, redirect, user_cards};

/// Everything the profile header needs, plus the viewer's relation to it.
struct Profile {
    user: User,
    counts: UserCounts,
    viewer_follows: bool,
}

fn load_profile(db: &Database, user_id: i64, viewer: Option<i64>) -> warbler_db::Result<Option<Profile>> {
    let Some(row) = db.get_user_by_id(user_id)? else {
        return Ok(None);
    };
    let counts = db.user_counts(user_id)?;
    let viewer_follows = match viewer {
        Some(viewer) => db.is_following(viewer, user_id)?,
        None => false,
    };
    Ok(Some(Profile {
        user: row.into_model(),
        counts,
        viewer_follows,
    }))
}

fn profile_context(current: &CurrentUser, profile: &Profile, extra: Value) -> Value {
    context! {
        current_user => &current.0,
        user => &profile.user,
        counts => &profile.counts,
        viewer_follows => profile.viewer_follows,
        ..extra
    }
}

fn viewer_sets(db: &Database, viewer: Option<i64>) -> warbler_db::Result<(HashSet<i64>, HashSet<i64>)> {
    match viewer {
        Some(id) => Ok((db.liked_message_ids(id)?, db.following_ids(id)?)),
        None => Ok((HashSet::new(), HashSet::new())),
    }
}

pub async fn homepage(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let Some(me) = current.0.clone() else {
        return Ok(state.views.page(
            StatusCode::OK,
            "home-anon.html",
            context! { current_user => () },
        ));
    };

    let user_id = me.id;
    let (rows, liked, counts) = query(&state, move |db| {
        let rows = db.timeline(user_id, TIMELINE_LIMIT)?;
        let liked = db.liked_message_ids(user_id)?;
        let counts = db.user_counts(user_id)?;
        Ok::<_, DbError>((rows, liked, counts))
    })
    .await?;

    Ok(state.views.page(
        StatusCode::OK,
        "home.html",
        context! {
            current_user => &me,
            user => &me,
            counts => counts,
            messages => message_cards(rows, &liked),
        },
    ))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let q = search.q.unwrap_or_default();
    let needle = q.trim().to_string();
    let viewer = current.0.as_ref().map(|u| u.id);

    let (rows, following) = query(&state, move |db| {
        let rows = db.search_users(&needle)?;
        let (_, following) = viewer_sets(db, viewer)?;
        Ok::<_, DbError>((rows, following))
    })
    .await?;

    Ok(state.views.page(
        StatusCode::OK,
        "users/index.html",
        context! {
            current_user => &current.0,
            q => q,
            users => user_cards(rows, &following),
        },
    ))
}

pub async fn show_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let viewer = current.0.as_ref().map(|u| u.id);
    let found = query(&state, move |db| {
        let Some(profile) = load_profile(db, user_id, viewer)? else {
            return Ok(None);
        };
        let rows = db.messages_for_user(user_id, TIMELINE_LIMIT)?;
        let (liked, _) = viewer_sets(db, viewer)?;
        Ok::<_, DbError>(Some((profile, rows, liked)))
    })
    .await?;

    let Some((profile, rows, liked)) = found else {
        return Ok(not_found_page(&state, &current));
    };

    let extra = context! { messages => message_cards(rows, &liked) };
    Ok(state
        .views
        .page(StatusCode::OK, "users/show.html", profile_context(&current, &profile, extra)))
}

#[derive(Clone, Copy)]
enum Edge {
    Following,
    Followers,
}

async fn show_edge(
    state: AppState,
    user_id: i64,
    me: User,
    current: CurrentUser,
    edge: Edge,
) -> Result<Response, StatusCode> {
    let viewer = Some(me.id);
    let found = query(&state, move |db| {
        let Some(profile) = load_profile(db, user_id, viewer)? else {
            return Ok(None);
        };
        let rows: Vec<UserRow> = match edge {
            Edge::Following => db.following(user_id)?,
            Edge::Followers => db.followers(user_id)?,
        };
        let (_, following) = viewer_sets(db, viewer)?;
        Ok::<_, DbError>(Some((profile, rows, following)))
    })
    .await?;

    let Some((profile, rows, following)) = found else {
        return Ok(not_found_page(&state, &current));
    };

    let template = match edge {
        Edge::Following => "users/following.html",
        Edge::Followers => "users/followers.html",
    };
    let extra = context! { users => user_cards(rows, &following) };
    Ok(state
        .views
        .page(StatusCode::OK, template, profile_context(&current, &profile, extra)))
}

pub async fn show_following(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    show_edge(state, user_id, me, current, Edge::Following).await
}

pub async fn show_followers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    show_edge(state, user_id, me, current, Edge::Followers).await
}

pub async fn show_likes(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let viewer = Some(me.id);
    let found = query(&state, move |db| {
        let Some(profile) = load_profile(db, user_id, viewer)? else {
            return Ok(None);
        };
        let rows: Vec<MessageRow> = db.liked_messages(user_id)?;
        let (liked, _) = viewer_sets(db, viewer)?;
        Ok::<_, DbError>(Some((profile, rows, liked)))
    })
    .await?;

    let Some((profile, rows, liked)) = found else {
        return Ok(not_found_page(&state, &current));
    };

    let extra = context! { messages => message_cards(rows, &liked) };
    Ok(state
        .views
        .page(StatusCode::OK, "users/likes.html", profile_context(&current, &profile, extra)))
}

pub async fn add_follow(
    State(state): State<AppState>,
    Path(followed_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let follower_id = me.id;
    let outcome = blocking(&state, move |db| {
        if db.get_user_by_id(followed_id)?.is_none() {
            return Ok(false);
        }
        db.follow(follower_id, followed_id)?;
        Ok::<_, DbError>(true)
    })
    .await?;

    match outcome {
        Ok(true) => info!("User {} now follows {}", follower_id, followed_id),
        Ok(false) => return Ok(not_found_page(&state, &current)),
        Err(e) if e.is_integrity() => {
            info!("User {} already follows {}", follower_id, followed_id);
        }
        Err(e) => {
            error!("Failed to follow: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(redirect(&format!("/users/{}/following", me.id)))
}

pub async fn stop_following(
    State(state): State<AppState>,
    Path(followed_id): Path<i64>,
    Extension(me): Extension<User>,
) -> Result<Response, StatusCode> {
    let follower_id = me.id;
    let removed = query(&state, move |db| db.stop_following(follower_id, followed_id)).await?;
    if removed {
        info!("User {} stopped following {}", follower_id, followed_id);
    }
    Ok(redirect(&format!("/users/{}/following", me.id)))
}

/// Like or unlike a message, then go home.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(me): Extension<User>,
    current: CurrentUser,
) -> Result<Response, StatusCode> {
    let user_id = me.id;
    let liked = query(&state, move |db| {
        if db.get_message(message_id)?.is_none() {
            return Ok(None);
        }
        Ok::<_, DbError>(Some(db.toggle_like(user_id, message_id)?))
    })
    .await?;

    match liked {
        None => Ok(not_found_page(&state, &current)),
        Some(liked) => {
            info!(
                "User {} {} message {}",
                user_id,
                if liked { "liked" } else { "unliked" },
                message_id
            );
            Ok(redirect("/"))
        }
    }
}

fn edit_page(status: StatusCode, state: &AppState, me: &User, error: Option<&str>) -> Response {
    state.views.page(
        status,
        "users/edit.html",
        context! { current_user => me, user => me, error => error },
    )
}

pub async fn edit_profile_form(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
) -> Response {
    edit_page(StatusCode::OK, &state, &me, None)
}

/// The current password must check out before anything changes.
pub async fn edit_profile_submit(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    Form(form): Form<ProfileForm>,
) -> Result<Response, StatusCode> {
    let user_id = me.id;
    let current_username = me.username.clone();
    let outcome = blocking(&state, move |db| {
        if authenticate(db, &current_username, &form.password)?.is_none() {
            return Ok(None);
        }
        let image_url = non_blank(form.image_url);
        let header_image_url = non_blank(form.header_image_url);
        let bio = non_blank(form.bio);
        let location = non_blank(form.location);
        let updated = db.update_user(
            user_id,
            &ProfileUpdate {
                username: form.username.trim(),
                email: form.email.trim(),
                image_url: image_url.as_deref(),
                header_image_url: header_image_url.as_deref(),
                bio: bio.as_deref(),
                location: location.as_deref(),
            },
        )?;
        Ok::<_, DbError>(Some(updated))
    })
    .await?;

    match outcome {
        Ok(Some(Some(user))) => {
            info!("User {} updated their profile", user.id);
            Ok(redirect(&format!("/users/{}", user.id)))
        }
        Ok(Some(None)) => Err(StatusCode::NOT_FOUND),
        Ok(None) => Ok(edit_page(
            StatusCode::UNAUTHORIZED,
            &state,
            &me,
            Some("Wrong password, please try again."),
        )),
        Err(e) if e.is_integrity() => {
            warn!("Profile update for {} rejected: {}", user_id, e);
            Ok(edit_page(
                StatusCode::CONFLICT,
                &state,
                &me,
                Some("Username or email already taken."),
            ))
        }
        Err(e) => {
            error!("Profile update failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(me): Extension<User>,
    jar: CookieJar,
) -> Result<Response, StatusCode> {
    let user_id = me.id;
    query(&state, move |db| db.delete_user(user_id)).await?;
    info!("User {} deleted their account", user_id);
    Ok((clear_session(jar), redirect("/signup")).into_response())
}
