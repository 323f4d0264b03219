use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State, TypedHeader},
    headers::Cookie,
    http::{header::SET_COOKIE, request::Parts, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use cookie::{time::Duration, SameSite};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::openid::{Claims, OidcClient, VerifyError};
use crate::AppState;

pub const ID_TOKEN_COOKIE: &str = "id_token";
pub const STATE_COOKIE: &str = "oauth_state";
pub const LOGIN_PATH: &str = "/login";

const SESSION_MAX_AGE: Duration = Duration::hours(1);
const STATE_MAX_AGE: Duration = Duration::minutes(10);
const STATE_LEN: usize = 32;

pub fn auth_routes(oidc: Arc<OidcClient>) -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, get(login))
        .route("/auth/callback", get(callback))
        .route("/logout", get(logout))
        .with_state(oidc)
}

/// Request guard for gated pages. Anonymous when login is not configured,
/// otherwise carries the verified identity token claims.
#[derive(Debug)]
pub struct Session {
    claims: Option<Claims>,
}

impl Session {
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.claims.as_ref().map(Claims::display_name)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(oidc) = state.oidc.as_ref() else {
            return Ok(Session { claims: None });
        };
        let TypedHeader(cookies) = TypedHeader::<Cookie>::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::MissingToken)?;
        let token = cookies.get(ID_TOKEN_COOKIE).ok_or(AuthError::MissingToken)?;
        match oidc.verify(token) {
            Ok(claims) => Ok(Session {
                claims: Some(claims),
            }),
            Err(VerifyError::Internal) => Err(AuthError::InternalServer),
            Err(e) => {
                tracing::debug!(error = %e, "identity token rejected");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    InternalServer,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::MissingToken => Redirect::to(LOGIN_PATH).into_response(),
            AuthError::InvalidToken => (
                AppendHeaders([(SET_COOKIE, removal_cookie(ID_TOKEN_COOKIE))]),
                Redirect::to(LOGIN_PATH),
            )
                .into_response(),
            AuthError::InternalServer => {
                tracing::error!("session verification failed internally");
                let body = Json(json!({
                    "error": "Internal server error",
                }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

async fn login(State(oidc): State<Arc<OidcClient>>) -> Result<Response, AppError> {
    let state = random_state();
    let location = oidc.authorize_url(&state)?;
    let cookie = cookie::Cookie::build((STATE_COOKIE, state))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(oidc.settings().secure_cookies())
        .max_age(STATE_MAX_AGE)
        .build();
    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Redirect::to(&location),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(oidc): State<Arc<OidcClient>>,
    cookies: Option<TypedHeader<Cookie>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "identity provider returned an error"
        );
        return Err(AppError::Unauthorized("login was not completed"));
    }

    let expected = cookies
        .as_ref()
        .and_then(|TypedHeader(c)| c.get(STATE_COOKIE));
    match (params.state.as_deref(), expected) {
        (Some(got), Some(expected)) if got == expected => {}
        _ => {
            tracing::warn!("login state missing or mismatched");
            return Err(AppError::BadRequest("invalid login state"));
        }
    }
    let code = params
        .code
        .ok_or(AppError::BadRequest("missing authorization code"))?;

    let id_token = oidc.exchange_code(&code).await?;
    let claims = match oidc.verify(&id_token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "id token from token endpoint failed verification");
            return Ok((
                AppendHeaders([(SET_COOKIE, removal_cookie(STATE_COOKIE))]),
                AuthError::InvalidToken,
            )
                .into_response());
        }
    };
    tracing::info!(sub = %claims.sub, "user logged in");

    let session = cookie::Cookie::build((ID_TOKEN_COOKIE, id_token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(oidc.settings().secure_cookies())
        .max_age(SESSION_MAX_AGE)
        .build();
    Ok((
        AppendHeaders([
            (SET_COOKIE, session.to_string()),
            (SET_COOKIE, removal_cookie(STATE_COOKIE)),
        ]),
        Redirect::to("/"),
    )
        .into_response())
}

async fn logout(State(oidc): State<Arc<OidcClient>>) -> Response {
    let location = oidc.logout_url().unwrap_or_else(|| "/".to_string());
    (
        AppendHeaders([(SET_COOKIE, removal_cookie(ID_TOKEN_COOKIE))]),
        Redirect::to(&location),
    )
        .into_response()
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

fn removal_cookie(name: &'static str) -> String {
    let mut cookie = cookie::Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie.to_string()
}
