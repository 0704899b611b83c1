use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Upstream services called by the weather tools
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// National Weather Service API
    pub weather_api_url: String,
    /// OpenStreetMap Nominatim geocoder
    pub geocoder_url: String,
    /// User-Agent sent upstream; both services require one
    pub user_agent: String,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Seconds between heartbeats on the event stream
    pub heartbeat_secs: u64,
    /// Browser origins allowed by CORS
    pub allowed_origins: Vec<String>,
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load configuration from environment variables and config files
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            // Set default values
            .set_default("environment", "development")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8765)?
            .set_default("heartbeat_secs", 30)?
            .set_default(
                "allowed_origins",
                vec!["http://localhost:5174", "http://127.0.0.1:5174"],
            )?
            .set_default("upstream.weather_api_url", "https://api.weather.gov")?
            .set_default("upstream.geocoder_url", "https://nominatim.openstreetmap.org")?
            .set_default("upstream.user_agent", "MCP-Weather-Demo/1.0 (Educational Demo)")?;

        // Layer on the environment-specific values from config files if available
        if let Ok(env) = env::var("ENVIRONMENT") {
            builder = builder.add_source(File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add settings from MCP_DUET__* environment variables
        builder = builder.add_source(
            Environment::with_prefix("MCP_DUET")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_origins"),
        );

        // Build and deserialize the config
        let config = builder.build()?;

        config.try_deserialize()
    }

    /// Defaults without consulting the environment
    pub fn local(port: u16) -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            heartbeat_secs: 30,
            allowed_origins: Vec::new(),
            upstream: UpstreamConfig {
                weather_api_url: "https://api.weather.gov".to_string(),
                geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
                user_agent: "MCP-Weather-Demo/1.0 (Educational Demo)".to_string(),
            },
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let config = Config::from_env().unwrap();
        assert!(config.heartbeat_secs > 0);
        assert!(!config.upstream.user_agent.is_empty());
    }

    #[test]
    fn test_local_config_addresses() {
        let config = Config::local(0);
        assert_eq!(config.socket_addr().unwrap().port(), 0);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    }
}
