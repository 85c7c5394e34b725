//! Configuration module for environment variable parsing.
//!
//! Every setting comes from the environment. Unparseable values fall back to
//! their defaults with a warning instead of aborting startup.

use std::env;
use std::time::Duration;

use axum::http::HeaderName;
use tracing::warn;

/// Header carrying the hex HMAC signature when none is configured.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Signature";

/// How an `order.created` event treats a user that is not in the store yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPolicy {
    /// Create the user record when it does not exist.
    Upsert,
    /// Only update existing users; unknown emails are reported as not found.
    RequireExisting,
}

impl PlanPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upsert" => Some(Self::Upsert),
            "require_existing" | "require-existing" => Some(Self::RequireExisting),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::RequireExisting => "require_existing",
        }
    }
}

/// Which user store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local map, for local development only.
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store connection URI
    pub database_url: String,

    /// Database name, overriding the one in `database_url`
    pub database_name: Option<String>,

    /// Table holding one row per user email
    pub users_table: String,

    /// Shared secret for webhook HMAC verification
    pub webhook_secret: Option<String>,

    /// Name of the request header carrying the signature
    pub signature_header: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Upsert or require-existing handling of unknown users
    pub plan_policy: PlanPolicy,

    pub store_backend: StoreBackend,

    /// Maximum pooled store connections
    pub store_max_connections: u32,

    /// How long a request waits for a store connection in milliseconds
    pub store_acquire_timeout_ms: u64,

    /// Refuse to start when the store cannot be reached
    pub store_required_on_startup: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/planhook".to_string()),

            database_name: non_blank("DB_NAME"),

            users_table: non_blank("USERS_TABLE").unwrap_or_else(|| "users".to_string()),

            webhook_secret: secret("WEBHOOK_SECRET"),

            signature_header: parse_with(
                "WEBHOOK_SIGNATURE_HEADER",
                parse_header_name,
                DEFAULT_SIGNATURE_HEADER.to_string(),
            ),

            port: parse_or("PORT", 3000),

            plan_policy: parse_with("PLAN_POLICY", PlanPolicy::parse, PlanPolicy::Upsert),

            store_backend: parse_with(
                "STORE_BACKEND",
                StoreBackend::parse,
                StoreBackend::Postgres,
            ),

            store_max_connections: parse_or("STORE_MAX_CONNECTIONS", 10),

            store_acquire_timeout_ms: parse_or("STORE_ACQUIRE_TIMEOUT_MS", 5000),

            store_required_on_startup: parse_or("STORE_REQUIRED_ON_STARTUP", false),
        }
    }

    pub fn store_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.store_acquire_timeout_ms)
    }
}

/// Read a variable, treating empty or whitespace-only values as unset.
fn non_blank(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a secret verbatim; whitespace-only values count as unset.
fn secret(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Accept only names `HeaderMap` can look up; anything else would never match.
fn parse_header_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    HeaderName::from_bytes(name.as_bytes())
        .ok()
        .map(|_| name.to_string())
}

/// Parse a variable with `FromStr`, warning and defaulting on bad input.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    parse_with(name, |raw| raw.trim().parse().ok(), default)
}

fn parse_with<T>(name: &str, parse: impl Fn(&str) -> Option<T>, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match parse(&raw) {
        Some(value) => value,
        None => {
            warn!(env_var = name, value = %raw, "Invalid config value, using default");
            default
        }
    }
}
