use std::env;

use chrono::TimeDelta;

use crate::views::DEFAULT_QUEUE_DEPTH;

const LOCAL_JWT_SECRET: &str = "press-portal-local-signing-secret";
const LOCAL_ADMIN_PASSWORD: &str = "admin123";

/// AppConfig
///
/// The application's entire configuration, loaded once at startup and immutable
/// afterwards. Pulled into handlers through `FromRef` on `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string, or `memory` for the in-process store.
    pub db_url: String,
    pub port: u16,
    // Runtime environment marker. Controls log format and secret fallbacks.
    pub env: Env,
    // HS256 signing secret for session tokens.
    pub jwt_secret: String,
    pub jwt_lifetime: TimeDelta,
    // Seeded as the first administrator when no admin account exists.
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
    // Capacity of the best-effort view counting queue.
    pub view_queue_depth: usize,
}

/// Env
///
/// The runtime context. Local runs get pretty logs and development fallbacks;
/// production gets JSON logs and refuses to start without its secrets.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe values for tests. Never reads the environment.
    fn default() -> Self {
        Self {
            db_url: "memory".to_string(),
            port: 8080,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_lifetime: TimeDelta::hours(24),
            admin_username: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: LOCAL_ADMIN_PASSWORD.to_string(),
            view_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// parse_lifetime
///
/// Accepts `24h`, `30m`, `45s` or a bare number of seconds. Anything that is not a
/// positive duration is `None`.
pub fn parse_lifetime(raw: &str) -> Option<TimeDelta> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&raw[..i], c),
        _ => (raw, 's'),
    };
    let amount: i64 = digits.parse().ok().filter(|n| *n > 0)?;
    match unit {
        'h' => TimeDelta::try_hours(amount),
        'm' => TimeDelta::try_minutes(amount),
        's' => TimeDelta::try_seconds(amount),
        _ => None,
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every setting from the environment, failing fast.
    ///
    /// # Panics
    /// Panics when a value required for the current environment is missing or
    /// unparseable, so the server never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => {
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production.")
            }
            // Local runs fall back to a fixed development secret.
            Env::Local => env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
        };

        let admin_password = match env {
            Env::Production => env::var("ADMIN_PASSWORD")
                .expect("FATAL: ADMIN_PASSWORD must be set in production."),
            Env::Local => {
                env::var("ADMIN_PASSWORD").unwrap_or_else(|_| LOCAL_ADMIN_PASSWORD.to_string())
            }
        };

        let jwt_lifetime = env::var("JWT_EXPIRES_IN")
            .map(|raw| {
                parse_lifetime(&raw)
                    .unwrap_or_else(|| panic!("FATAL: JWT_EXPIRES_IN '{raw}' is not a duration."))
            })
            .unwrap_or_else(|_| TimeDelta::hours(24));

        let port = env::var("PORT")
            .map(|raw| raw.parse().expect("FATAL: PORT must be a valid port number."))
            .unwrap_or(8080);

        let view_queue_depth = env::var("VIEW_QUEUE_DEPTH")
            .map(|raw| {
                raw.parse()
                    .expect("FATAL: VIEW_QUEUE_DEPTH must be a positive integer.")
            })
            .unwrap_or(DEFAULT_QUEUE_DEPTH);

        Self {
            db_url: env::var("DATABASE_URL").expect("FATAL: DATABASE_URL is required."),
            port,
            jwt_secret,
            jwt_lifetime,
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@example.com".to_string()),
            admin_password,
            view_queue_depth,
            env,
        }
    }
}
