use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use common::{
    env_config::Config,
    error::{AppError, Res},
    jwt,
};

use crate::dtos::auth::{AuthResponse, LoginRequest};

/// Checks the operator password against the configured argon2 hash.
/// A hash that cannot be parsed is a deployment problem, not a wrong password.
pub fn verify_password(password_hash: &str, password: &str) -> Res<()> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|e| {
        AppError::Configuration(format!("ADMIN_PASSWORD_HASH is not a PHC string: {}", e))
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))
}

/// Authenticates the operator and issues a session token.
pub fn login(config: &Config, login_data: &LoginRequest) -> Res<AuthResponse> {
    verify_password(&config.admin_password_hash, &login_data.password)?;
    let token = jwt::generate_admin_jwt(&config.jwt_config)?;
    log::info!("Operator logged in");
    Ok(AuthResponse { token })
}
