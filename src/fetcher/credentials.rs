//! Credential values and providers
//!
//! The downloader never stores credentials; callers resolve a [`Credentials`]
//! value once and pass it into the run.

use std::fmt;

/// Environment variable holding the username for [`EnvCredentials`]
pub const USERNAME_ENV: &str = "REPORT_USERNAME";
/// Environment variable holding the secret for [`EnvCredentials`]
pub const SECRET_ENV: &str = "REPORT_PASSWORD";

/// Resolved identity and secret
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    /// Build credentials, rejecting an empty username
    pub fn new(
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(CredentialError::NoCredentials(
                "username is empty".to_string(),
            ));
        }
        Ok(Self {
            username,
            secret: secret.into(),
        })
    }

    /// Username, possibly in `DOMAIN\user` form
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of credentials
pub trait CredentialProvider: Send + Sync {
    /// Resolve credentials or fail with [`CredentialError::NoCredentials`]
    fn credentials(&self) -> Result<Credentials, CredentialError>;
}

impl CredentialProvider for Credentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.clone())
    }
}

/// Reads credentials from environment variables
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    username_var: String,
    secret_var: String,
}

impl EnvCredentials {
    /// Provider reading custom variable names
    pub fn new(username_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            username_var: username_var.into(),
            secret_var: secret_var.into(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(USERNAME_ENV, SECRET_ENV)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let username = std::env::var(&self.username_var).map_err(|_| {
            CredentialError::NoCredentials(format!("{} is not set", self.username_var))
        })?;
        let secret = std::env::var(&self.secret_var).map_err(|_| {
            CredentialError::NoCredentials(format!("{} is not set", self.secret_var))
        })?;
        Credentials::new(username, secret)
    }
}

/// Credential errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No usable credentials
    #[error("no credentials available: {0}")]
    NoCredentials(String),
}
