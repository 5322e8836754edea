use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use super::{AuthenticationError, TokenValidator};

/// Introspects bearer credentials against the authentication server.
pub struct HttpTokenValidator {
    client: reqwest::Client,
    introspection_url: String,
}

#[derive(Deserialize)]
struct IntrospectionResponse {
    user_id: String,
    active: bool,
}

impl HttpTokenValidator {
    pub fn new(introspection_url: String) -> Self {
        HttpTokenValidator {
            client: reqwest::Client::new(),
            introspection_url,
        }
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(&self, credential: &str) -> Result<String, AuthenticationError> {
        let response = self
            .client
            .get(&self.introspection_url)
            .bearer_auth(credential)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthenticationError::InvalidCredentials);
        }

        let session: IntrospectionResponse = response.json().await?;
        if !session.active {
            return Err(AuthenticationError::InvalidCredentials);
        }
        Ok(session.user_id)
    }
}

/// In-memory token map for tests and the `AUTH_BACKEND=static` dev mode.
#[derive(Default)]
pub struct StaticTokenValidator {
    tokens: DashMap<String, String>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        StaticTokenValidator {
            tokens: DashMap::new(),
        }
    }

    pub fn insert(&self, credential: &str, user_id: &str) {
        self.tokens
            .insert(credential.to_string(), user_id.to_string());
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, credential: &str) -> Result<String, AuthenticationError> {
        self.tokens
            .get(credential)
            .map(|user_id| user_id.clone())
            .ok_or(AuthenticationError::InvalidCredentials)
    }
}
