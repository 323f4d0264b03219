use std::env;

use thiserror::Error;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_JWKS_REFRESH_SECS: u64 = 3600;

pub const MASKED_PASSWORD: &str = "********";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required when OAUTH_CLIENT_ID is set")]
    MissingOAuth(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database: Option<DatabaseSettings>,
    pub db_required: bool,
    pub oauth: Option<OAuthSettings>,
    pub jwks_refresh_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseSettings {
    Url(String),
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: String,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub issuer_url: String,
    pub post_logout_redirect_url: Option<String>,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;
        let db_required = parse_bool("DB_REQUIRED", var("DB_REQUIRED"))?;
        let jwks_refresh_secs = parse_or(
            "JWKS_REFRESH_SECS",
            var("JWKS_REFRESH_SECS"),
            DEFAULT_JWKS_REFRESH_SECS,
        )?;

        let database = match (var("DATABASE_URL"), var("DB_HOST")) {
            (Some(url), _) => Some(DatabaseSettings::Url(url)),
            (None, Some(host)) => Some(DatabaseSettings::Postgres {
                host,
                port: parse_or("DB_PORT", var("DB_PORT"), DEFAULT_DB_PORT)?,
                user: var("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                password: lookup("DB_PASSWORD").unwrap_or_default(),
                name: var("DB_NAME").unwrap_or_else(|| "postgres".to_string()),
            }),
            (None, None) => None,
        };

        let oauth = match var("OAUTH_CLIENT_ID") {
            None => None,
            Some(client_id) => {
                let client_secret = var("OAUTH_CLIENT_SECRET")
                    .ok_or(ConfigError::MissingOAuth("OAUTH_CLIENT_SECRET"))?;
                let redirect_url = var("OAUTH_REDIRECT_URL")
                    .ok_or(ConfigError::MissingOAuth("OAUTH_REDIRECT_URL"))?;
                let issuer_url = match (var("OAUTH_ISSUER_URL"), var("OAUTH_TENANT_ID")) {
                    (Some(issuer), _) => issuer.trim_end_matches('/').to_string(),
                    (None, Some(tenant)) => {
                        format!("https://login.microsoftonline.com/{tenant}/v2.0")
                    }
                    (None, None) => return Err(ConfigError::MissingOAuth("OAUTH_TENANT_ID")),
                };
                Some(OAuthSettings {
                    client_id,
                    client_secret,
                    redirect_url,
                    issuer_url,
                    post_logout_redirect_url: var("OAUTH_POST_LOGOUT_REDIRECT_URL"),
                })
            }
        };

        Ok(Config {
            port,
            database,
            db_required,
            oauth,
            jwks_refresh_secs,
        })
    }
}

impl DatabaseSettings {
    /// Connection parameters as shown on the `/env` page, password masked.
    pub fn display_entries(&self) -> Vec<(&'static str, String)> {
        match self {
            DatabaseSettings::Url(url) => vec![("DATABASE_URL", mask_url_password(url))],
            DatabaseSettings::Postgres {
                host,
                port,
                user,
                password,
                name,
            } => vec![
                ("DB_HOST", host.clone()),
                ("DB_PORT", port.to_string()),
                ("DB_USER", user.clone()),
                (
                    "DB_PASSWORD",
                    if password.is_empty() {
                        String::new()
                    } else {
                        MASKED_PASSWORD.to_string()
                    },
                ),
                ("DB_NAME", name.clone()),
            ],
        }
    }
}

impl OAuthSettings {
    pub fn secure_cookies(&self) -> bool {
        self.redirect_url.starts_with("https://")
    }
}

fn mask_url_password(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some(MASKED_PASSWORD)).is_err() {
                return MASKED_PASSWORD.to_string();
            }
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => MASKED_PASSWORD.to_string(),
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

fn parse_bool(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid { name, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_has_no_database_and_no_login() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 80);
        assert!(config.database.is_none());
        assert!(config.oauth.is_none());
        assert!(!config.db_required);
        assert_eq!(config.jwks_refresh_secs, 3600);
    }

    #[test]
    fn postgres_parts_with_defaults() {
        let config = config(&[("DB_HOST", "db.internal"), ("DB_PASSWORD", "s3cret")]).unwrap();
        assert_eq!(
            config.database,
            Some(DatabaseSettings::Postgres {
                host: "db.internal".into(),
                port: 5432,
                user: "postgres".into(),
                password: "s3cret".into(),
                name: "postgres".into(),
            })
        );
    }

    #[test]
    fn database_url_wins_over_parts() {
        let config = config(&[("DATABASE_URL", "sqlite::memory:"), ("DB_HOST", "db")]).unwrap();
        assert_eq!(
            config.database,
            Some(DatabaseSettings::Url("sqlite::memory:".into()))
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn tenant_builds_default_issuer() {
        let config = config(&[
            ("OAUTH_CLIENT_ID", "client"),
            ("OAUTH_CLIENT_SECRET", "secret"),
            ("OAUTH_REDIRECT_URL", "https://app.example.com/auth/callback"),
            ("OAUTH_TENANT_ID", "contoso"),
        ])
        .unwrap();
        let oauth = config.oauth.unwrap();
        assert_eq!(
            oauth.issuer_url,
            "https://login.microsoftonline.com/contoso/v2.0"
        );
        assert!(oauth.secure_cookies());
    }

    #[test]
    fn incomplete_oauth_block_is_an_error() {
        let err = config(&[("OAUTH_CLIENT_ID", "client")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingOAuth("OAUTH_CLIENT_SECRET"));
    }

    #[test]
    fn passwords_are_masked_for_display() {
        let parts = DatabaseSettings::Postgres {
            host: "db".into(),
            port: 5432,
            user: "app".into(),
            password: "hunter2".into(),
            name: "app".into(),
        };
        let shown = parts.display_entries();
        assert!(shown.iter().all(|(_, v)| !v.contains("hunter2")));
        assert!(shown.contains(&("DB_PASSWORD", MASKED_PASSWORD.to_string())));

        let url = DatabaseSettings::Url("postgres://app:hunter2@db:5432/app".into());
        let shown = url.display_entries();
        assert!(!shown[0].1.contains("hunter2"));
        assert!(shown[0].1.contains("db:5432/app"));
    }
}
