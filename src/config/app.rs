use anyhow::{bail, Result};
use std::env;

/// Default number of coach uses (chat replies or program generations)
/// granted before a subscription is required
const DEFAULT_FREE_COACH_USES: i32 = 1;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub app_url: String,
    pub auth_jwt_secret: String,
    pub free_coach_uses: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let app_url = env::var("APP_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let auth_jwt_secret = env::var("AUTH_JWT_SECRET").unwrap_or_default();
        let free_coach_uses = env::var("FREE_COACH_USES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_FREE_COACH_USES);

        let config = AppConfig {
            host,
            port,
            environment,
            log_level,
            app_url: app_url.trim_end_matches('/').to_string(),
            auth_jwt_secret,
            free_coach_uses,
        };

        // Outside development an unset secret is fatal; in development the
        // server starts but refuses every bearer token
        if config.auth_jwt_secret.is_empty() && !config.is_development() {
            bail!("AUTH_JWT_SECRET must be set when ENVIRONMENT={}", config.environment);
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_when_env_is_empty() {
        for key in ["HOST", "PORT", "ENVIRONMENT", "APP_URL", "FREE_COACH_USES", "AUTH_JWT_SECRET"] {
            env::remove_var(key);
        }

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert!(config.is_development());
        assert_eq!(config.free_coach_uses, 1);
        assert!(config.auth_jwt_secret.is_empty());
    }

    #[test]
    #[serial]
    fn test_missing_jwt_secret_is_fatal_outside_development() {
        env::remove_var("AUTH_JWT_SECRET");
        env::set_var("ENVIRONMENT", "production");

        let result = AppConfig::from_env();
        env::remove_var("ENVIRONMENT");

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_app_url_trailing_slash_is_trimmed() {
        env::set_var("APP_URL", "https://coach.example.fr/");
        env::set_var("FREE_COACH_USES", "3");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.app_url, "https://coach.example.fr");
        assert_eq!(config.free_coach_uses, 3);

        env::remove_var("APP_URL");
        env::remove_var("FREE_COACH_USES");
    }
}
