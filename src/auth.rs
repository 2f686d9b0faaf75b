use async_trait::async_trait;

use crate::cache::key;
use crate::error::ApiError;

/// A bearer token as handed over by the authorization collaborator.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Stable identity for cache keys; never exposes the token itself.
    pub fn fingerprint(&self) -> String {
        key::principal_fingerprint(&self.token)
    }
}

/// The validated identity behind a bearer token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub email: Option<String>,
}

/// Black-box seam over the authorization service. The OAuth exchange itself
/// lives elsewhere; the core only validates tokens, asks about the caption
/// scope, and reports tokens it has seen rejected so fresh credentials can
/// be requested.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Validate a bearer token, returning the principal behind it.
    async fn validate(&self, token: &str) -> Result<Principal, ApiError>;

    /// Whether the token's granted scopes include caption-read access.
    async fn has_caption_scope(&self, token: &str) -> Result<bool, ApiError>;

    /// Called when the platform rejected the token as invalid or expired.
    async fn invalidate(&self, token: &str);
}
