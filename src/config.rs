//! Application configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server ===
    /// HTTP listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind the listener to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port for the Prometheus exporter. Disabled when unset.
    #[serde(default)]
    pub metrics_port: Option<u16>,

    // === Authentication ===
    /// Identity provider endpoint returning the user behind a bearer token.
    pub user_info_url: String,

    /// Cookie consulted when no `Authorization` header is present.
    #[serde(default = "default_auth_cookie")]
    pub auth_cookie: String,

    /// Where browsers are sent when they are not logged in.
    #[serde(default)]
    pub login_url: Option<String>,

    /// Timeout for a single user-info request.
    #[serde(default = "default_validator_timeout_ms")]
    pub validator_timeout_ms: u64,

    // === Streaming ===
    /// Period between forced flushes of streamed responses.
    #[serde(default = "default_flush_period_ms")]
    pub flush_period_ms: u64,

    /// How long a streamed response may go unread before the client is
    /// treated as gone.
    #[serde(default = "default_client_stall_timeout_ms")]
    pub client_stall_timeout_ms: u64,

    // === Commands ===
    /// Shell command printing project status.
    #[serde(default = "default_status_command")]
    pub status_command: String,

    /// Shell command listing containers.
    #[serde(default = "default_containers_command")]
    pub containers_command: String,

    /// Shell command deploying a project to an environment.
    #[serde(default = "default_deploy_command")]
    pub deploy_command: String,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_addr() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_auth_cookie() -> String {
    "access_token".to_string()
}

fn default_validator_timeout_ms() -> u64 {
    5_000
}

fn default_flush_period_ms() -> u64 {
    500
}

fn default_client_stall_timeout_ms() -> u64 {
    10_000
}

fn default_status_command() -> String {
    "docker compose -p \"$DEPLOYBOARD_PROJECT\" ps".to_string()
}

fn default_containers_command() -> String {
    "docker ps --filter \"label=com.docker.compose.project=$DEPLOYBOARD_PROJECT\"".to_string()
}

fn default_deploy_command() -> String {
    "./deploy.sh \"$DEPLOYBOARD_PROJECT\" \"$DEPLOYBOARD_ENVIRONMENT\"".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build a config for the given user-info endpoint with every other field
    /// at its default.
    pub fn with_user_info_url(user_info_url: impl Into<String>) -> Self {
        Self {
            port: default_port(),
            bind_addr: default_bind_addr(),
            metrics_port: None,
            user_info_url: user_info_url.into(),
            auth_cookie: default_auth_cookie(),
            login_url: None,
            validator_timeout_ms: default_validator_timeout_ms(),
            flush_period_ms: default_flush_period_ms(),
            client_stall_timeout_ms: default_client_stall_timeout_ms(),
            status_command: default_status_command(),
            containers_command: default_containers_command(),
            deploy_command: default_deploy_command(),
            rust_log: default_log_level(),
        }
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.user_info_url)
            .map_err(|e| format!("USER_INFO_URL is not a valid URL: {}", e))?;

        if let Some(login_url) = &self.login_url {
            url::Url::parse(login_url)
                .map_err(|e| format!("LOGIN_URL is not a valid URL: {}", e))?;
        }

        if self.auth_cookie.trim().is_empty() {
            return Err("AUTH_COOKIE must not be empty".to_string());
        }

        if self.flush_period_ms == 0 {
            return Err("FLUSH_PERIOD_MS must be greater than zero".to_string());
        }

        if self.client_stall_timeout_ms == 0 {
            return Err("CLIENT_STALL_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.validator_timeout_ms == 0 {
            return Err("VALIDATOR_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.metrics_port == Some(self.port) {
            return Err("METRICS_PORT must differ from PORT".to_string());
        }

        Ok(())
    }

    /// Socket address the HTTP server listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Flush period for streamed responses.
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }

    /// How long a flush may wait on a client that is not reading.
    pub fn client_stall_timeout(&self) -> Duration {
        Duration::from_millis(self.client_stall_timeout_ms)
    }

    /// Timeout applied to token validation requests.
    pub fn validator_timeout(&self) -> Duration {
        Duration::from_millis(self.validator_timeout_ms)
    }
}
