use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    env_config::JwtConfig,
    error::{AppError, Res},
};

/// Subject stored in operator session tokens.
pub const ADMIN_SUBJECT: &str = "admin";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub exp: usize,
}

/// Generates an operator session token valid for the configured number of hours.
pub fn generate_admin_jwt(config: &JwtConfig) -> Res<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.expiration_hours))
        .ok_or_else(|| AppError::Internal("Token expiration overflow".to_string()))?
        .timestamp();

    let claims = AdminClaims {
        sub: ADMIN_SUBJECT.to_string(),
        exp: expiration as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Extracts claims object from JWT token.
/// Requires JWT secret. Tokens for any other subject are refused.
pub fn validate_jwt(token: &str, secret: &str) -> Res<AdminClaims> {
    let token_data = jsonwebtoken::decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    if token_data.claims.sub != ADMIN_SUBJECT {
        return Err(AppError::Unauthorized("Token subject is not an operator".to_string()));
    }
    Ok(token_data.claims)
}
