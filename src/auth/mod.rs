use async_trait::async_trait;
use thiserror::Error;

mod validator;

pub use validator::{HttpTokenValidator, StaticTokenValidator};

#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("Error while sending HTTP request to authentication server")]
    Http(#[from] reqwest::Error),
    #[error("Invalid authentication credentials")]
    InvalidCredentials,
}

/// Resolves a bearer credential to the user id it belongs to.
///
/// The registry calls this during admission, under its own timeout. The
/// production implementation talks to the authentication server; tests and
/// local development use a deterministic in-memory variant.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<String, AuthenticationError>;
}
