use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::email_client::DEFAULT_API_URL;

const FALLBACK_ADMIN_USERNAME: &str = "admin";
const FALLBACK_ADMIN_PASSWORD: &str = "password123";

#[derive(Debug, Clone, PartialEq)]
pub struct MailConfig {
    pub api_url: String,
    pub api_token: String,
    pub sender: String,
    /// Receives contact-form messages.
    pub admin_email: String,
    pub timeout: Duration,
}

// Service configuration sourced from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub production: bool,
    /// `None` disables admin login.
    pub admin: Option<(String, String)>,
    pub session_secret: Option<String>,
    /// In-memory store when unset.
    pub database_path: Option<PathBuf>,
    /// No mail is sent when unset.
    pub mail: Option<MailConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .with_context(|| "parse BIND_ADDR")?;
        let production = var("APP_ENV").map_or(false, |env| env.eq_ignore_ascii_case("production"));

        let username = var("ADMIN_USERNAME");
        let admin = match var("ADMIN_PASSWORD") {
            Some(password) => {
                Some((username.unwrap_or_else(|| FALLBACK_ADMIN_USERNAME.to_string()), password))
            }
            None if production => {
                tracing::error!("ADMIN_PASSWORD missing in production, admin login disabled");
                None
            }
            None => {
                tracing::warn!("ADMIN_PASSWORD not set, using the development fallback password");
                Some((
                    username.unwrap_or_else(|| FALLBACK_ADMIN_USERNAME.to_string()),
                    FALLBACK_ADMIN_PASSWORD.to_string(),
                ))
            }
        };

        let mail = match (var("EMAIL_API_TOKEN"), var("EMAIL_SENDER")) {
            (Some(api_token), Some(sender)) => Some(MailConfig {
                api_url: var("EMAIL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                api_token,
                admin_email: var("ADMIN_EMAIL").unwrap_or_else(|| sender.clone()),
                sender,
                timeout: Duration::from_secs(10),
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            production,
            admin,
            session_secret: var("SESSION_SECRET"),
            database_path: var("DATABASE_PATH").map(PathBuf::from),
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_fall_back_outside_production() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!config.production);
        assert_eq!(
            config.admin,
            Some(("admin".to_string(), "password123".to_string()))
        );
        assert_eq!(config.mail, None);
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn production_without_credentials_disables_login() {
        let config = config(&[("APP_ENV", "production")]).unwrap();
        assert!(config.production);
        assert_eq!(config.admin, None);
    }

    #[test]
    fn configured_credentials_win() {
        let config = config(&[
            ("APP_ENV", "production"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "hunter2"),
        ])
        .unwrap();
        assert_eq!(config.admin, Some(("root".to_string(), "hunter2".to_string())));
    }

    #[test]
    fn username_alone_keeps_fallback_password() {
        let config = config(&[("ADMIN_USERNAME", "root")]).unwrap();
        assert_eq!(
            config.admin,
            Some(("root".to_string(), "password123".to_string()))
        );
    }

    #[test]
    fn password_alone_enables_login_in_production() {
        let config = config(&[("APP_ENV", "production"), ("ADMIN_PASSWORD", "hunter2")]).unwrap();
        assert_eq!(config.admin, Some(("admin".to_string(), "hunter2".to_string())));

        let config = self::config(&[("APP_ENV", "production"), ("ADMIN_USERNAME", "root")]).unwrap();
        assert_eq!(config.admin, None);
    }

    #[test]
    fn mail_needs_token_and_sender() {
        assert_eq!(config(&[("EMAIL_API_TOKEN", "t")]).unwrap().mail, None);
        let mail = config(&[("EMAIL_API_TOKEN", "t"), ("EMAIL_SENDER", "noreply@maia.ma")])
            .unwrap()
            .mail
            .unwrap();
        assert_eq!(mail.api_url, DEFAULT_API_URL);
        assert_eq!(mail.admin_email, "noreply@maia.ma");
    }

    #[test]
    fn bad_bind_addr_is_an_error() {
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
    }
}
