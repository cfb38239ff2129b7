use std::fmt;
use std::path::PathBuf;

use log::{info, warn};

use crate::{Error, Result, EMAIL_ENV_VAR, PASSWORD_ENV_VAR};

/// Account credentials for the portal. Immutable once resolved.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Uses the explicit values where given, otherwise falls back to
    /// `ASKTHEEU_EMAIL` / `ASKTHEEU_PASSWORD` from the process environment.
    pub fn resolve(email: Option<&str>, password: Option<&str>) -> Result<Self> {
        Self::resolve_with(email, password, |key| std::env::var(key).ok())
    }

    /// Same as [`Credentials::resolve`] with an injectable environment lookup.
    pub fn resolve_with<F>(email: Option<&str>, password: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<&str>, key: &str| {
            explicit
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .or_else(|| lookup(key).filter(|v| !v.is_empty()))
        };

        match (pick(email, EMAIL_ENV_VAR), pick(password, PASSWORD_ENV_VAR)) {
            (Some(email), Some(password)) => Ok(Self { email, password }),
            _ => Err(Error::Configuration),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"******")
            .finish()
    }
}

/// Loads `.env` from the working directory into the process environment, if present.
/// Returns the path that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            info!("Loaded .env from: {:?}", path);
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            warn!("Failed to parse .env: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(key: &str) -> Option<String> {
        match key {
            EMAIL_ENV_VAR => Some("env@example.org".to_string()),
            PASSWORD_ENV_VAR => Some("env-secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn explicit_values_win_over_environment() {
        let creds = Credentials::resolve_with(Some("me@example.org"), Some("pw"), env).unwrap();
        assert_eq!(creds.email(), "me@example.org");
        assert_eq!(creds.password(), "pw");
    }

    #[test]
    fn environment_fills_missing_values() {
        let creds = Credentials::resolve_with(Some("me@example.org"), None, env).unwrap();
        assert_eq!(creds.email(), "me@example.org");
        assert_eq!(creds.password(), "env-secret");
    }

    #[test]
    fn missing_password_is_a_configuration_error() {
        let res = Credentials::resolve_with(Some("me@example.org"), None, |_| None);
        assert!(matches!(res, Err(Error::Configuration)));

        let res = Credentials::resolve_with(Some(""), Some("pw"), |_| None);
        assert!(matches!(res, Err(Error::Configuration)));
    }

    #[test]
    fn debug_output_hides_password() {
        let creds = Credentials::new("me@example.org", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("me@example.org"));
        assert!(!printed.contains("hunter2"));
    }
}
