use std::{env, path::PathBuf};

use thiserror::Error;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

/// Credentials of the admin created at startup when no account with that
/// email exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_connections: u32,
    pub admin: Option<AdminAccount>,
}

impl Config {
    /// Reads settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Only the connection string, for tools that never issue tokens.
    pub fn database_url_from_env() -> Result<String, ConfigError> {
        env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let port = match lookup("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_MAX_CONNECTIONS",
                        value,
                    })
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminAccount { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            port,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_connections,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/reimburse"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.max_connections, 5);
        assert!(config.admin.is_none());
    }

    #[test]
    fn admin_bootstrap_needs_both_vars() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "secret"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "bootstrap-pass"),
        ]))
        .unwrap();
        assert_eq!(
            config.admin,
            Some(AdminAccount {
                email: "root@example.com".to_string(),
                password: "bootstrap-pass".to_string(),
            })
        );

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "secret"),
            ("ADMIN_EMAIL", "root@example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADMIN_PASSWORD")));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "secret"),
            ("ADMIN_PASSWORD", "bootstrap-pass"),
            ("ADMIN_EMAIL", " "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADMIN_EMAIL")));
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "secret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn zero_connections_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "secret"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
