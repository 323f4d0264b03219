use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error;
pub mod openid;
pub mod records;
mod render;
pub mod store;

use config::{Config, DatabaseSettings};
use error::StartupError;
use openid::OidcClient;
use store::UserStore;

/// Everything the handlers share. `store` is `None` when no database is
/// configured or the connection failed at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Option<Arc<dyn UserStore>>,
    pub database: Option<DatabaseSettings>,
    pub oidc: Option<Arc<OidcClient>>,
}

/// Connects the database and discovers the identity provider.
pub async fn init(config: &Config) -> Result<AppState, StartupError> {
    let store = match config.database.as_ref() {
        None => {
            tracing::warn!("no database configured");
            None
        }
        Some(settings) => match store::connect(settings).await {
            Ok(store) => {
                tracing::info!("database connected");
                Some(store)
            }
            Err(e) if config.db_required => return Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "database connection failed, serving without it");
                None
            }
        },
    };

    let oidc = match config.oauth.clone() {
        None => {
            tracing::warn!("OAUTH_CLIENT_ID not set, login disabled");
            None
        }
        Some(settings) => {
            let client = Arc::new(OidcClient::discover(settings).await?);
            client.spawn_key_refresh(config.jwks_refresh_secs);
            Some(client)
        }
    };

    Ok(AppState {
        store,
        database: config.database.clone(),
        oidc,
    })
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(records::index))
        .route("/env", get(records::env))
        .route("/add", post(records::add))
        .route("/delete", post(records::delete_all))
        .route("/users", get(records::users).post(records::users_add))
        .route("/health", get(records::health));
    if let Some(oidc) = state.oidc.clone() {
        router = router.merge(auth::auth_routes(oidc));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
