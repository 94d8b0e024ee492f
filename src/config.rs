use serde::{Deserialize, Serialize};
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Deployed frontend, always allowed by CORS
    pub frontend_url: Option<String>,

    /// Netlify preview deployment, always allowed by CORS
    pub netlify_url: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Room used when a connection names none
    #[serde(default = "default_room")]
    pub default_room: String,

    /// Frames queued per connection before it counts as a stalled reader
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Frames read from a connection that may wait for the hub before
    /// reading from that socket pauses
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,

    /// Largest inbound WebSocket message accepted
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Origins allowed to call the HTTP API. The local dev servers are
    /// always on the list.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        let configured = self
            .cors_origins
            .iter()
            .flat_map(|list| list.split(','))
            .chain(self.frontend_url.as_deref())
            .chain(self.netlify_url.as_deref())
            .chain(LOCAL_ORIGINS.iter().copied())
            .map(|origin| origin.trim().trim_end_matches('/'))
            .filter(|origin| !origin.is_empty());
        for origin in configured {
            if !origins.iter().any(|known| known == origin) {
                origins.push(origin.to_string());
            }
        }
        origins
    }
}

const LOCAL_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:3001"];

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            frontend_url: None,
            netlify_url: None,
            service_name: default_service_name(),
            default_room: default_room(),
            outbound_buffer: default_outbound_buffer(),
            inbound_buffer: default_inbound_buffer(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_service_name() -> String {
    "mdcollab-relay".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_room() -> String {
    "default".to_string()
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_inbound_buffer() -> usize {
    32
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}
