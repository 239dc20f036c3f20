//! Per-call credentials for Central
//!
//! Both providers yield `authorization: Bearer <token>` metadata and
//! refuse to run over an insecure transport. The provider is picked once
//! when the connection is dialed.

use super::context::CallContext;
use crate::config::{AuthType, CentralConfig};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Metadata attached to every outbound call
pub type CallMetadata = HashMap<String, String>;

const AUTHORIZATION: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Credential production failures; never retriable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Static provider was built without a token
    #[error("API token is empty")]
    EmptyToken,

    /// Call context carries no inbound MCP request
    #[error("MCP request is not found in context")]
    MissingRequest,

    /// Inbound request exists but no bearer token could be taken from it
    #[error("failed to extract bearer token from MCP request: {0}")]
    Extraction(#[from] TokenExtractionError),
}

/// Why a bearer token could not be taken from the inbound request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenExtractionError {
    /// Transport supplied no headers
    #[error("headers are missing")]
    MissingHeaders,

    /// No Authorization header
    #[error("authorization header is missing")]
    MissingAuthorization,

    /// Authorization header without the Bearer scheme
    #[error("authorization header must contain a bearer token")]
    NotBearer,

    /// Bearer scheme with a blank token
    #[error("authorization token is empty")]
    EmptyToken,
}

/// Produces per-call authentication metadata
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Metadata for one outbound call
    fn call_metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError>;

    /// Whether the provider may only be used over TLS
    fn requires_secure_transport(&self) -> bool;
}

/// Fixed API token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &crate::config::REDACTED)
            .finish()
    }
}

impl StaticTokenProvider {
    /// Provider that always sends `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn call_metadata(&self, _ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(bearer_metadata(&self.token))
    }

    fn requires_secure_transport(&self) -> bool {
        true
    }
}

/// Forwards the bearer token of the inbound MCP request
///
/// Holds no state: every call reads the token from its own context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProvider;

impl PassthroughProvider {
    /// Create a passthrough provider
    pub fn new() -> Self {
        Self
    }
}

impl CredentialProvider for PassthroughProvider {
    fn call_metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        let request = ctx.request().ok_or(AuthError::MissingRequest)?;
        let token = extract_bearer_token(request)?;
        Ok(bearer_metadata(&token))
    }

    fn requires_secure_transport(&self) -> bool {
        true
    }
}

/// Take the bearer token out of an inbound request's headers
pub fn extract_bearer_token(
    request: &super::context::RequestMeta,
) -> Result<String, TokenExtractionError> {
    if !request.has_headers() {
        return Err(TokenExtractionError::MissingHeaders);
    }

    let header = request
        .header(AUTHORIZATION)
        .ok_or(TokenExtractionError::MissingAuthorization)?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(TokenExtractionError::NotBearer)?
        .trim();

    if token.is_empty() {
        return Err(TokenExtractionError::EmptyToken);
    }

    Ok(token.to_string())
}

fn bearer_metadata(token: &str) -> CallMetadata {
    let mut metadata = CallMetadata::with_capacity(1);
    metadata.insert(AUTHORIZATION.to_string(), format!("{}{}", BEARER_PREFIX, token));
    metadata
}

/// Select the credential provider for the configured auth type
///
/// # Errors
///
/// Returns [`McpError::Auth`](crate::error::McpError::Auth) when the auth
/// type is unknown
pub fn provider_for(config: &CentralConfig) -> crate::error::Result<Arc<dyn CredentialProvider>> {
    match AuthType::parse(&config.auth_type) {
        Some(AuthType::Static) => Ok(Arc::new(StaticTokenProvider::new(
            config.api_token.clone(),
        ))),
        Some(AuthType::Passthrough) => Ok(Arc::new(PassthroughProvider::new())),
        None => Err(crate::error::McpError::Auth(format!(
            "unsupported auth type: {}",
            config.auth_type
        ))
        .into()),
    }
}
