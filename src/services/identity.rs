//! Identity verifier — the boundary to the external auth provider.
//!
//! ARCHITECTURE
//! ============
//! Token verification itself belongs to the identity provider; this module
//! only owns the seam. `IdentityVerifier` is the trait the ticket-issuing
//! route talks to, `HttpIdentityVerifier` posts the client's ID token to the
//! configured verification endpoint, and tests substitute a mock. The
//! verifier is optional at startup: without `IDENTITY_VERIFY_URL` the server
//! runs with guest-only websocket access.

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("IDENTITY_VERIFY_URL not configured")]
    NotConfigured,
    #[error("verification request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("verifier returned status {0}")]
    Status(u16),
}

/// Canonical identity returned by the provider for a valid token.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedIdentity {
    /// Provider-scoped stable id (subject claim).
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify an ID token. `Ok(None)` means the token is well-formed but
    /// invalid or expired; transport problems are errors.
    async fn verify(&self, id_token: &str) -> Result<Option<VerifiedIdentity>, IdentityError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIdentityVerifier {
    /// Build from `IDENTITY_VERIFY_URL`.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` when the variable is unset; callers treat this
    /// as "run without authenticated connections", not a startup failure.
    pub fn from_env() -> Result<Self, IdentityError> {
        let endpoint = std::env::var("IDENTITY_VERIFY_URL").map_err(|_| IdentityError::NotConfigured)?;
        Ok(Self { client: reqwest::Client::new(), endpoint })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<Option<VerifiedIdentity>, IdentityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "idToken": id_token }))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(Some(response.json::<VerifiedIdentity>().await?)),
            401 | 403 => Ok(None),
            status => Err(IdentityError::Status(status)),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
