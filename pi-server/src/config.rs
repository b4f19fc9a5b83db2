//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for the gateway.
///
/// Every field has a default so the server works with no environment set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind (default `"127.0.0.1"`; the gateway is local).
    pub host: String,

    /// Preferred TCP port (default `11434`, the conventional local-LLM port).
    /// When occupied, the controller walks the fallback list.
    pub port: u16,

    /// `tracing` filter string, e.g. `"info"` or `"debug"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Disable request/response body truncation in logs.
    pub debug_full_log: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_or("PI_BIND", "127.0.0.1"),
            port: parse_env("PI_PORT", 11434),
            log_level: env_or("PI_LOG", "info"),
            log_json: flag_env("PI_LOG_JSON"),
            debug_full_log: flag_env("PI_DEBUG_FULL_LOG"),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag_env(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
