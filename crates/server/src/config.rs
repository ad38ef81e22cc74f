use anyhow::{Context, Result};
use api::auth::AuthConfig;

const DEFAULT_TTL_MINUTES: i64 = 60 * 24;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
}

pub fn database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/campus_board".into())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let database_url = database_url();

        let jwt_secret = std::env::var("AUTH_SECRET").context("AUTH_SECRET missing")?;
        let session_ttl_minutes = match std::env::var("SESSION_TTL_MINUTES") {
            Ok(raw) => raw
                .parse::<i64>()
                .context("SESSION_TTL_MINUTES must be an integer")?,
            Err(_) => DEFAULT_TTL_MINUTES,
        };

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            database_url,
            auth: AuthConfig {
                jwt_secret,
                session_ttl_minutes,
            },
            cors_allowed_origins,
        })
    }
}
