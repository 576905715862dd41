use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::AuthError;

/// Token service for minting and verifying signed session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_hours: i64,
    expiry_leeway_seconds: u64,
}

/// Which half of a session pair a token is. The discriminator is embedded in
/// the signed claims, so one kind can never be replayed as the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Token ID (for revocation)
    pub jti: Uuid,
    /// Token kind discriminator
    pub typ: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Token pair returned to the caller on authentication and refresh
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let key_bytes = config.signing_key.expose_secret().as_bytes();

        Self {
            encoding_key: EncodingKey::from_secret(key_bytes),
            decoding_key: DecodingKey::from_secret(key_bytes),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_hours: config.refresh_token_expiry_hours,
            expiry_leeway_seconds: config.expiry_leeway_seconds,
        }
    }

    /// Mint a fresh access/refresh pair for a user. Each token carries its
    /// own ID so either can be revoked independently.
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.issue(user_id, TokenKind::Access)?;
        let refresh_token = self.issue(user_id, TokenKind::Refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    /// Mint a single token of the given kind
    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = match kind {
            TokenKind::Access => now + Duration::minutes(self.access_token_expiry_minutes),
            TokenKind::Refresh => now + Duration::hours(self.refresh_token_expiry_hours),
        };

        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            typ: kind,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to encode token: {}", e))?;

        Ok(token)
    }

    /// Verify signature and expiry, and require the token to be of the
    /// expected kind. A syntactically valid token of the wrong kind is
    /// treated the same as garbage.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.expiry_leeway_seconds;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    _ => AuthError::MalformedToken,
                }
            })?;

        if token_data.claims.typ != expected {
            return Err(AuthError::MalformedToken);
        }

        Ok(token_data.claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

/// Pull the raw token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: &str) -> Result<&str, AuthError> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(token)
}
