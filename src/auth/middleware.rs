//! # Authentication Middleware
//!
//! Bearer token authentication and route authorization for the `/v1` API.
//!
//! Tokens are HS256 JWTs carrying a `role` claim. A request passes when
//! the token verifies and the [`AccessPolicy`] grants the role the request's
//! method and path.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::policy::AccessPolicy;
use crate::core::config::AuthConfig;
use crate::core::error::{GatewayError, GatewayResult};

const TOKEN_PREFIX: &str = "Bearer ";

/// JWT claims the gateway reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
    pub role: String,
}

/// Token verification plus route policy
pub struct AuthState {
    decoding_key: DecodingKey,
    validation: Validation,
    policy: AccessPolicy,
    excluded_paths: Vec<String>,
}

impl AuthState {
    pub fn new(config: &AuthConfig, policy: AccessPolicy) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            policy,
            excluded_paths: vec!["/health".to_string()],
        }
    }

    /// Extract token from the authorization header
    fn extract_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(TOKEN_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    fn is_excluded_path(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| path == excluded)
    }

    pub fn verify(&self, token: &str) -> GatewayResult<Caller> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(Caller {
            subject: data.claims.sub,
            role: data.claims.role,
        })
    }
}

/// Axum middleware: authenticate, then authorize against the policy
pub async fn auth_middleware(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();

    if auth.is_excluded_path(&path) {
        return Ok(next.run(request).await);
    }

    let token = auth.extract_token(request.headers()).ok_or_else(|| {
        warn!(path = %path, "Missing bearer token");
        GatewayError::auth("missing bearer token")
    })?;

    let caller = auth.verify(token).map_err(|e| {
        warn!(path = %path, error = %e, "Token rejected");
        GatewayError::auth("invalid or expired token")
    })?;

    if !auth.policy.allows(&caller.role, request.method(), &path) {
        warn!(role = %caller.role, method = %request.method(), path = %path, "Access denied");
        return Err(GatewayError::authz("access denied"));
    }

    debug!(subject = %caller.subject, role = %caller.role, "Request authorized");
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
