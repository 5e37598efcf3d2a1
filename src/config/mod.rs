//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `burrow` binary)
//!
//! Everything except traffic logging is fixed once a
//! [`Session`](crate::Session) is constructed.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::PORT;
use crate::error::{BurrowError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection parameters
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BurrowError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| BurrowError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/burrow/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("burrow").join("config.toml"))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `BURROW_*` environment variables.
    pub fn apply_env(&mut self) {
        let conn = &mut self.connection;

        if let Ok(host) = std::env::var("BURROW_HOST") {
            conn.host = host;
        }
        if let Ok(port) = std::env::var("BURROW_PORT") {
            if let Ok(port) = port.parse() {
                conn.port = port;
            }
        }
        if let Ok(vhost) = std::env::var("BURROW_VHOST") {
            conn.vhost = vhost;
        }
        if let Ok(user) = std::env::var("BURROW_USER") {
            conn.user = user;
        }
        if let Ok(pass) = std::env::var("BURROW_PASS") {
            conn.password = pass;
        }
        if let Ok(hb) = std::env::var("BURROW_HEARTBEAT") {
            if let Ok(hb) = hb.parse() {
                conn.heartbeat = hb;
            }
        }
        if let Ok(insist) = std::env::var("BURROW_INSIST") {
            conn.insist = parse_flag(&insist);
        }

        if let Ok(logging) = std::env::var("BURROW_LOGGING") {
            self.logging.enabled = parse_flag(&logging);
        }
        if let Ok(logfile) = std::env::var("BURROW_LOGFILE") {
            self.logging.logfile = Some(PathBuf::from(logfile));
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// SASL mechanism used in connection.start-ok.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mechanism {
    /// Credentials as a field table (LOGIN, PASSWORD)
    #[default]
    #[serde(rename = "AMQPLAIN")]
    AmqPlain,
    /// `\0user\0password`
    #[serde(rename = "PLAIN")]
    Plain,
}

impl Mechanism {
    /// Mechanism name as sent to the broker.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AmqPlain => "AMQPLAIN",
            Self::Plain => "PLAIN",
        }
    }
}

/// How tune-ok values are chosen from the broker's proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunePolicy {
    /// Echo the client's requested values
    #[default]
    Requested,
    /// Take the smaller non-zero value of proposal and request
    Negotiate,
}

/// Broker connection parameters
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Virtual host to open
    pub vhost: String,

    /// Login name
    pub user: String,

    /// Login password
    pub password: String,

    /// Requested maximum frame size in bytes (0 = no limit)
    pub frame_max: u32,

    /// Requested maximum channel number (0 = no limit)
    pub channel_max: u16,

    /// Requested heartbeat interval in seconds (0 = disabled)
    pub heartbeat: u16,

    /// Refuse broker redirects
    pub insist: bool,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Authentication mechanism
    pub mechanism: Mechanism,

    /// Locale sent in start-ok
    pub locale: String,

    /// Tune-ok value selection
    pub tune_policy: TunePolicy,

    /// Redirects followed before giving up (`None` = unbounded)
    pub max_redirects: Option<u32>,

    /// Access realm requested after the channel opens
    pub realm: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: PORT,
            vhost: "/".to_string(),
            user: "guest".to_string(),
            password: "guest".to_string(),
            frame_max: 131072,
            channel_max: 0,
            heartbeat: 0,
            insist: false,
            connect_timeout_secs: 5,
            mechanism: Mechanism::default(),
            locale: "en_US".to_string(),
            tune_policy: TunePolicy::default(),
            max_redirects: Some(10),
            realm: "/data".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Set broker address.
    pub fn with_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set virtual host.
    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    /// Set credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the insist flag.
    pub fn with_insist(mut self, insist: bool) -> Self {
        self.insist = insist;
        self
    }

    /// Set requested heartbeat interval.
    pub fn with_heartbeat(mut self, secs: u16) -> Self {
        self.heartbeat = secs;
        self
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("frame_max", &self.frame_max)
            .field("channel_max", &self.channel_max)
            .field("heartbeat", &self.heartbeat)
            .field("insist", &self.insist)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("mechanism", &self.mechanism)
            .field("locale", &self.locale)
            .field("tune_policy", &self.tune_policy)
            .field("max_redirects", &self.max_redirects)
            .field("realm", &self.realm)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log every sent and received frame
    pub enabled: bool,

    /// Write logs here instead of stdout
    pub logfile: Option<PathBuf>,

    /// Default filter when `RUST_LOG` is unset
    pub level: Option<String>,
}
