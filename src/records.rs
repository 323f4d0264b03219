use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};

use crate::auth::Session;
use crate::error::AppError;
use crate::render::{self, EnvEntry, ListPage};
use crate::store::{NewUser, UserRecord};
use crate::AppState;

pub const STATUS_CONNECTED: &str = "Database connection OK";
pub const STATUS_UNAVAILABLE: &str = "DB unavailable";

pub async fn index(
    session: Session,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let users = list_users(&state).await?;
    let html = render::index(&list_page(&state, &session, &users))?;
    Ok(Html(html))
}

pub async fn add(
    _session: Session,
    State(state): State<AppState>,
    user: Option<Form<NewUser>>,
) -> Redirect {
    insert(&state, &user.map(|Form(user)| user).unwrap_or_default()).await;
    Redirect::to("/")
}

pub async fn delete_all(_session: Session, State(state): State<AppState>) -> Redirect {
    match state.store.as_ref() {
        None => tracing::warn!("no database, nothing deleted"),
        Some(store) => match store.delete_all().await {
            Ok(count) => tracing::info!(count, "all users deleted"),
            Err(e) => tracing::error!(error = %e, "failed to delete users"),
        },
    }
    Redirect::to("/")
}

/// The `/users` view. A `delete` parameter removes one record and redirects
/// back here; a value that is not an integer is ignored, and only the first
/// `delete` counts when it is repeated.
pub async fn users(
    session: Session,
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let delete = params.into_iter().find(|(key, _)| key == "delete");
    if let Some((_, raw)) = delete {
        match (raw.trim().parse::<i64>(), state.store.as_ref()) {
            (Ok(id), Some(store)) => match store.delete(id).await {
                Ok(count) => tracing::info!(id, count, "user deleted"),
                Err(e) => tracing::error!(error = %e, id, "failed to delete user"),
            },
            (Ok(_), None) => tracing::warn!("no database, nothing deleted"),
            (Err(_), _) => tracing::debug!(value = %raw, "ignoring non-numeric delete id"),
        }
        return Ok(Redirect::to("/users").into_response());
    }

    let users = list_users(&state).await?;
    let html = render::users(&list_page(&state, &session, &users))?;
    Ok(Html(html).into_response())
}

pub async fn users_add(
    _session: Session,
    State(state): State<AppState>,
    user: Option<Form<NewUser>>,
) -> Redirect {
    insert(&state, &user.map(|Form(user)| user).unwrap_or_default()).await;
    Redirect::to("/users")
}

pub async fn env(session: Session, State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let entries: Vec<EnvEntry> = state
        .database
        .as_ref()
        .map(|db| db.display_entries())
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| EnvEntry { name, value })
        .collect();
    let html = render::env(&entries, session.display_name())?;
    Ok(Html(html))
}

pub async fn health() -> &'static str {
    "OK"
}

async fn list_users(state: &AppState) -> Result<Vec<UserRecord>, AppError> {
    match state.store.as_ref() {
        None => Ok(Vec::new()),
        Some(store) => Ok(store.list().await?),
    }
}

// Failures are logged only; the caller is redirected either way. A body that
// is not a form counts as an empty submission.
async fn insert(state: &AppState, user: &NewUser) {
    if !user.is_complete() {
        tracing::warn!("ignoring user submission with a blank name or email");
        return;
    }
    let Some(store) = state.store.as_ref() else {
        tracing::warn!("no database, user not added");
        return;
    };
    match store.create(user).await {
        Ok(()) => tracing::info!(name = %user.name, "user added"),
        Err(e) => tracing::error!(error = %e, "failed to add user"),
    }
}

fn list_page<'a>(state: &AppState, session: &'a Session, users: &'a [UserRecord]) -> ListPage<'a> {
    ListPage {
        status: if state.store.is_some() {
            STATUS_CONNECTED
        } else {
            STATUS_UNAVAILABLE
        },
        db_available: state.store.is_some(),
        users,
        signed_in_as: session.display_name(),
    }
}
