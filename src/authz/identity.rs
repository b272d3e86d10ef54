use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::authz::types::UserId;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthnError {
    #[error("No credentials presented")]
    #[diagnostic(code(rolegate::identity::missing_credentials))]
    MissingCredentials,

    #[error("Invalid token: {0}")]
    #[diagnostic(code(rolegate::identity::invalid_token))]
    InvalidToken(String),

    #[error("Token has expired")]
    #[diagnostic(code(rolegate::identity::expired))]
    Expired,

    #[error("Token carries no usable subject")]
    #[diagnostic(
        code(rolegate::identity::missing_subject),
        help("Tokens must carry a `user_id` or `sub` claim without ':'")
    )]
    MissingSubject,

    #[error("Token signing failed: {0}")]
    #[diagnostic(code(rolegate::identity::signing))]
    Signing(String),
}

/// Resolves the authenticated subject of a request. Credential checking
/// itself lives outside this crate; implementations only read what an
/// upstream login flow issued.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, AuthnError>;
}

/// HS256 bearer tokens, read from `Authorization: Bearer` or a cookie.
pub struct TokenIdentity {
    secret: Vec<u8>,
    cookie_name: String,
}

impl TokenIdentity {
    pub fn new(secret: impl Into<Vec<u8>>, cookie_name: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: cookie_name.into(),
        }
    }

    /// Mint a token whose `user_id` claim is `user`.
    pub fn issue(&self, user: &UserId, ttl: Duration) -> Result<String, AuthnError> {
        let now = SystemTime::now();
        let mut payload = JwtPayload::new();
        payload.set_subject(user.as_str());
        payload
            .set_claim("user_id", Some(Value::String(user.as_str().to_string())))
            .map_err(|e| AuthnError::Signing(e.to_string()))?;
        payload.set_issued_at(&now);
        payload.set_expires_at(&(now + ttl));

        let signer = HS256
            .signer_from_bytes(&self.secret)
            .map_err(|e| AuthnError::Signing(e.to_string()))?;
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        jwt::encode_with_signer(&payload, &header, &signer)
            .map_err(|e| AuthnError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<UserId, AuthnError> {
        let verifier = HS256
            .verifier_from_bytes(&self.secret)
            .map_err(|e| AuthnError::InvalidToken(e.to_string()))?;
        let (payload, _header) = jwt::decode_with_verifier(token, &verifier)
            .map_err(|e| AuthnError::InvalidToken(e.to_string()))?;

        if let Some(exp) = payload.expires_at() {
            if exp <= SystemTime::now() {
                return Err(AuthnError::Expired);
            }
        }

        let raw = match payload.claim("user_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => payload
                .subject()
                .map(str::to_string)
                .ok_or(AuthnError::MissingSubject)?,
        };
        UserId::parse(raw).map_err(|_| AuthnError::MissingSubject)
    }

    fn token_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        if let Some(bearer) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            return Some(bearer.trim());
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
    }
}

#[async_trait]
impl Identity for TokenIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, AuthnError> {
        let token = self
            .token_from_headers(headers)
            .filter(|t| !t.is_empty())
            .ok_or(AuthnError::MissingCredentials)?;
        self.verify(token)
    }
}
