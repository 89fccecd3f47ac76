use std::{env, sync::Arc};

use crate::misc::ServerKind;

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// This struct holds all the necessary configuration parameters
/// required to initialize and run the service: database connection,
/// HTTP binding, operator authentication, payment gateway secrets,
/// provisioning retry budget, quota monitor period and optional
/// seed servers.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Configuration for operator session tokens.
    pub jwt_config: JwtConfig,
    /// Argon2 PHC string of the operator password.
    pub admin_password_hash: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (the admin dashboard).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File the logger appends to in addition to stdout.
    pub log_file: String,
    /// Payment gateway settings.
    pub gateway: GatewayConfig,
    /// Endpoint receiving notification events. Events are only logged when unset.
    pub notifier_url: Option<String>,
    /// Seconds between two quota monitor runs.
    pub quota_check_interval_secs: u64,
    /// Attempts the orchestrator makes against a backend before giving up.
    pub provision_max_attempts: u32,
    /// Fixed pause between two provisioning attempts.
    pub provision_retry_delay_secs: u64,
    /// Requests per second allowed per client IP on the public scope.
    pub public_rate_limit_per_second: u32,
    /// Servers inserted on start-up when the servers table is empty.
    pub seed_servers: Vec<ServerSeed>,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// This struct contains the secret key used to sign JWTs and
/// the expiration time in hours for issued tokens.
pub struct JwtConfig {
    /// The secret key used to sign and verify JWTs.
    pub secret: String,
    /// The expiration time for JWTs in hours.
    pub expiration_hours: i64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Secret the gateway embeds in every webhook.
    pub merchant_key: String,
    /// Invoice creation endpoint.
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerSeed {
    pub name: String,
    pub kind: ServerKind,
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl JwtConfig {
    /// Creates a new `JwtConfig` instance from environment variables.
    ///
    /// - `JWT_SECRET`: Required. The secret key for JWT signing.
    /// - `JWT_EXPIRATION_HOURS`: Optional. Defaults to 24 hours if not provided.
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or `JWT_EXPIRATION_HOURS` is not a number.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a valid number"),
        }
    }
}

impl ServerSeed {
    /// Reads `{PREFIX}_URL`, `{PREFIX}_USERNAME` and `{PREFIX}_PASSWORD`.
    /// Returns `None` unless all three are set and non-empty.
    fn from_env(prefix: &str, name: &str, kind: ServerKind) -> Option<Self> {
        let read = |suffix: &str| {
            env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .filter(|value| !value.is_empty())
        };

        Some(ServerSeed {
            name: name.to_string(),
            kind,
            base_url: read("URL")?,
            username: read("USERNAME")?,
            password: read("PASSWORD")?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`, `DATABASE_URL`, `JWT_SECRET`, `ADMIN_PASSWORD_HASH`, `GATEWAY_MERCHANT_KEY`
    ///
    /// Optional (with defaults):
    /// - `IP` ("127.0.0.1"), `PORT` (8080), `WORKERS` (4)
    /// - `CORS_ALLOWED_ORIGIN` ("http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING` (true), `LOG_FILE` ("vpn-seller.log")
    /// - `GATEWAY_API_URL`, `NOTIFIER_URL`
    /// - `QUOTA_CHECK_INTERVAL_SECS` (3600), `PROVISION_MAX_ATTEMPTS` (3),
    ///   `PROVISION_RETRY_DELAY_SECS` (2), `PUBLIC_RATE_LIMIT_PER_SECOND` (20)
    /// - `TOKEN_PANEL_*` / `PEER_PANEL_*` seed server triples
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let seed_servers = [
            ServerSeed::from_env("TOKEN_PANEL", "Default token panel", ServerKind::TokenPanel),
            ServerSeed::from_env("PEER_PANEL", "Default peer panel", ServerKind::PeerPanel),
        ]
        .into_iter()
        .flatten()
        .collect();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_config: JwtConfig::from_env(),
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH")
                .expect("ADMIN_PASSWORD_HASH must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_or("PORT", 8080),
            num_workers: parse_or("WORKERS", 4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "vpn-seller.log".to_string()),
            gateway: GatewayConfig {
                merchant_key: env::var("GATEWAY_MERCHANT_KEY")
                    .expect("GATEWAY_MERCHANT_KEY must be set"),
                api_url: env::var("GATEWAY_API_URL")
                    .unwrap_or_else(|_| "https://api.oxapay.com/merchants/request".to_string()),
            },
            notifier_url: env::var("NOTIFIER_URL").ok().filter(|url| !url.is_empty()),
            quota_check_interval_secs: parse_or("QUOTA_CHECK_INTERVAL_SECS", 3600),
            provision_max_attempts: parse_or("PROVISION_MAX_ATTEMPTS", 3),
            provision_retry_delay_secs: parse_or("PROVISION_RETRY_DELAY_SECS", 2),
            public_rate_limit_per_second: parse_or("PUBLIC_RATE_LIMIT_PER_SECOND", 20),
            seed_servers,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
