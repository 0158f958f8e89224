//! Process-level configuration - bind address, telemetry, request limits.

use serde::{Deserialize, Serialize};

/// Network bind address for the HTTP bot server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Interface to listen on.
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// HTTP port for `/play`, `/health` and the bot endpoints.
    /// Default: 3001
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        3001
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export and
    /// falls back to plain console logging.
    /// Default: "" (disabled)
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log filter (trace, debug, info, warn, error, or a full EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Size limits applied at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum decoded audio size accepted by `/play`.
    /// Default: 8 MiB
    #[serde(default = "LimitsConfig::default_max_audio_bytes")]
    pub max_audio_bytes: usize,

    /// Maximum JSON request body (base64 inflates audio by a third).
    /// Default: 12 MiB
    #[serde(default = "LimitsConfig::default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl LimitsConfig {
    fn default_max_audio_bytes() -> usize {
        8 * 1024 * 1024
    }

    fn default_max_body_bytes() -> usize {
        12 * 1024 * 1024
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_audio_bytes: Self::default_max_audio_bytes(),
            max_body_bytes: Self::default_max_body_bytes(),
        }
    }
}
