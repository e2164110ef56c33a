use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Which account store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        }
    }
}

/// Credentials of the superuser seeded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct FirstSuperuser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub project_name: String,
    pub emails_enabled: bool,
    pub first_superuser: Option<FirstSuperuser>,
    pub sweep_on_write: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(raw) => StoreBackend::parse(&raw)?,
            Err(_) => StoreBackend::Postgres,
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres store");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accountd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accountd-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };

        let first_superuser = match (
            std::env::var("FIRST_SUPERUSER"),
            std::env::var("FIRST_SUPERUSER_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(FirstSuperuser { email, password }),
            _ => None,
        };

        Ok(Self {
            store_backend,
            database_url,
            jwt,
            project_name: std::env::var("PROJECT_NAME").unwrap_or_else(|_| "accountd".into()),
            emails_enabled: env_flag("EMAILS_ENABLED", false),
            first_superuser,
            sweep_on_write: env_flag("SWEEP_ON_WRITE", true),
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn parses_store_backend_names() {
        assert_eq!(StoreBackend::parse("postgres").unwrap(), StoreBackend::Postgres);
        assert_eq!(StoreBackend::parse(" Memory ").unwrap(), StoreBackend::Memory);
        assert!(StoreBackend::parse("sqlite").is_err());
    }

    #[test]
    fn parses_boolean_flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
