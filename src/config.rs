use anyhow::Context;
use serde::Deserialize;

/// Fallback signing key. Deployments must set `JWT_SECRET`.
pub const DEFAULT_JWT_SECRET: &str = "your-secret-key";
pub const DEFAULT_JWT_EXPIRATION_SECS: u64 = 3600;
/// Ten years.
pub const MAX_JWT_EXPIRATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_secs: u64,
}

impl JwtConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_JWT_SECRET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => database_url_from_parts(&var)?,
        };

        let port = match var("APP_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("APP_PORT is not a valid port: {v}"))?,
            None => 8080,
        };

        let expires_in_secs = match var("JWT_EXPIRATION") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("JWT_EXPIRATION is not a number of seconds: {v}"))?,
            None => DEFAULT_JWT_EXPIRATION_SECS,
        };
        anyhow::ensure!(
            (1..=MAX_JWT_EXPIRATION_SECS).contains(&expires_in_secs),
            "JWT_EXPIRATION must be between 1 and {MAX_JWT_EXPIRATION_SECS} seconds, got {expires_in_secs}"
        );

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            expires_in_secs,
        };

        Ok(Self {
            database_url,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn database_url_from_parts<F>(var: &F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let host = var("DATABASE_HOST").unwrap_or_else(|| "localhost".into());
    let port = var("DATABASE_PORT").unwrap_or_else(|| "5432".into());
    let user = var("DATABASE_USER").context("DATABASE_URL or DATABASE_USER must be set")?;
    let name = var("DATABASE_NAME").context("DATABASE_URL or DATABASE_NAME must be set")?;
    let url = match var("DATABASE_PASSWORD") {
        Some(password) => format!("postgres://{user}:{password}@{host}:{port}/{name}"),
        None => format!("postgres://{user}@{host}:{port}/{name}"),
    };
    Ok(url)
}
