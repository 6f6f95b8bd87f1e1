//! Channel credentials for the FeatureLoom server
//!
//! Two security modes:
//!
//! - `insecure`: credentials are optional. A recognised bearer token still
//!   resolves to its subject; anything else runs as `anonymous`.
//! - `secure`: every non-public call needs `Authorization: Bearer <token>`
//!   matching a configured token, otherwise `401 UNAUTHENTICATED`.
//!
//! The resolved [`Caller`] is inserted into the request extensions and
//! recorded on the current request span.
//!
//! ## Example
//!
//! ```bash
//! export FEATURELOOM_SECURITY_MODE=secure
//! export FEATURELOOM_TOKENS="materializer:s3cr3t"
//!
//! curl -H "Authorization: Bearer s3cr3t" http://localhost:6566/api/v1/projects
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use featureloom_core::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::TokenConfig;
use crate::error::AppError;

/// Identity attached to requests that carry no recognised credentials
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Insecure,
    Secure,
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insecure" => Ok(Self::Insecure),
            "secure" => Ok(Self::Secure),
            other => Err(format!(
                "unknown security mode '{}', expected 'insecure' or 'secure'",
                other
            )),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insecure => write!(f, "insecure"),
            Self::Secure => write!(f, "secure"),
        }
    }
}

/// Authenticated identity of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    pub fn subject(&self) -> &str {
        &self.0
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    mode: SecurityMode,
    tokens: Vec<TokenConfig>,
    /// Endpoints that bypass authentication
    public_endpoints: HashSet<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(SecurityMode::Insecure, Vec::new())
    }
}

impl AuthConfig {
    pub fn new(mode: SecurityMode, tokens: Vec<TokenConfig>) -> Self {
        Self {
            mode,
            tokens,
            public_endpoints: HashSet::from([
                "/health".to_string(),
                "/health/ready".to_string(),
                "/metrics".to_string(),
            ]),
        }
    }

    /// Secure mode with the given tokens
    pub fn secure(tokens: Vec<TokenConfig>) -> Self {
        Self::new(SecurityMode::Secure, tokens)
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Check if a path is a public endpoint (no auth required)
    pub fn is_public(&self, path: &str) -> bool {
        self.public_endpoints.contains(path)
    }

    /// Subject of the configured token equal to `token`
    ///
    /// Every configured token is compared so timing does not reveal which one
    /// matched.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let mut subject = None;
        for configured in &self.tokens {
            if constant_time_compare(&configured.token, token) && subject.is_none() {
                subject = Some(configured.subject.as_str());
            }
        }
        subject
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive
fn extract_bearer(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/v1/projects", get(handler))
///     .layer(middleware::from_fn_with_state(Arc::new(config), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(config): State<Arc<AuthConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();

    if config.is_public(&path) {
        return Ok(next.run(request).await);
    }

    let resolved = extract_bearer(&request).map(|token| config.resolve(token));
    let caller = match (config.mode(), resolved) {
        (_, Some(Some(subject))) => Caller(subject.to_string()),
        (SecurityMode::Secure, None) => {
            tracing::warn!(path = %path, "Missing bearer token");
            return Err(Error::Unauthenticated("bearer token required".to_string()).into());
        }
        (SecurityMode::Secure, Some(None)) => {
            tracing::warn!(path = %path, "Invalid bearer token");
            return Err(Error::Unauthenticated("invalid bearer token".to_string()).into());
        }
        (SecurityMode::Insecure, _) => Caller::anonymous(),
    };

    tracing::Span::current().record("caller", caller.subject());
    tracing::debug!(path = %path, caller = %caller.subject(), "Request authenticated");
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
