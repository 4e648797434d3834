use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StagehandConfig {
    pub coordinator: CoordinatorConfig,
    pub routes: RouteConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Control-plane endpoint answering coordinator status queries
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,

    /// Control-plane endpoint that starts a stopped coordinator
    #[serde(default = "default_wake_endpoint")]
    pub wake_endpoint: String,

    /// Seconds between status probes while a wake is in flight
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Hard ceiling on how long a wake is polled before giving up
    #[serde(default = "default_max_poll_seconds")]
    pub max_poll_seconds: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Readiness hint used when the wake endpoint does not provide one
    #[serde(default = "default_estimated_ready_seconds")]
    pub default_estimated_ready_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RouteConfig {
    /// Path prefixes that render without the coordinator
    #[serde(default = "default_optional_prefixes")]
    pub optional_prefixes: Vec<String>,

    /// Prefixes nested under an optional prefix that still need the coordinator
    #[serde(default)]
    pub required_prefixes: Vec<String>,

    /// Local development pages
    #[serde(default = "default_local_prefix")]
    pub local_prefix: String,

    /// Admin pages (host the wake controls themselves)
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl StagehandConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("stagehand.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("coordinator.status_endpoint", default_status_endpoint())?
            .set_default("coordinator.wake_endpoint", default_wake_endpoint())?
            .set_default(
                "coordinator.poll_interval_seconds",
                default_poll_interval_seconds(),
            )?
            .set_default("coordinator.max_poll_seconds", default_max_poll_seconds())?
            .set_default(
                "coordinator.request_timeout_seconds",
                default_request_timeout_seconds(),
            )?
            .set_default(
                "coordinator.default_estimated_ready_seconds",
                default_estimated_ready_seconds(),
            )?
            .set_default("routes.optional_prefixes", default_optional_prefixes())?
            .set_default("routes.required_prefixes", Vec::<String>::new())?
            .set_default("routes.local_prefix", default_local_prefix())?
            .set_default("routes.admin_prefix", default_admin_prefix())?
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // Keys contain underscores, so nesting uses a double underscore
            .add_source(
                Environment::with_prefix("STAGEHAND")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: StagehandConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let coordinator = &self.coordinator;

        for (name, endpoint) in [
            ("status_endpoint", &coordinator.status_endpoint),
            ("wake_endpoint", &coordinator.wake_endpoint),
        ] {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Message(format!(
                    "Coordinator {} must be an http(s) URL, got '{}'",
                    name, endpoint
                )));
            }
        }

        if coordinator.poll_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Coordinator poll_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if coordinator.max_poll_seconds < coordinator.poll_interval_seconds {
            return Err(ConfigError::Message(
                "Coordinator max_poll_seconds must be at least poll_interval_seconds".to_string(),
            ));
        }

        if coordinator.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Coordinator request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let routes = &self.routes;
        let all_prefixes = routes
            .optional_prefixes
            .iter()
            .chain(routes.required_prefixes.iter())
            .chain([&routes.local_prefix, &routes.admin_prefix]);

        for prefix in all_prefixes {
            if !prefix.starts_with('/') || prefix.len() < 2 {
                return Err(ConfigError::Message(format!(
                    "Route prefix '{}' must start with '/' and name a path segment",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for StagehandConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            routes: RouteConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            status_endpoint: default_status_endpoint(),
            wake_endpoint: default_wake_endpoint(),
            poll_interval_seconds: default_poll_interval_seconds(),
            max_poll_seconds: default_max_poll_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            default_estimated_ready_seconds: default_estimated_ready_seconds(),
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            optional_prefixes: default_optional_prefixes(),
            required_prefixes: Vec::new(),
            local_prefix: default_local_prefix(),
            admin_prefix: default_admin_prefix(),
        }
    }
}

// Default value functions
fn default_status_endpoint() -> String {
    "http://127.0.0.1:8787/coordinator/status".to_string()
}
fn default_wake_endpoint() -> String {
    "http://127.0.0.1:8787/coordinator/wake".to_string()
}
fn default_poll_interval_seconds() -> u64 {
    5
}
fn default_max_poll_seconds() -> u64 {
    120
}
fn default_request_timeout_seconds() -> u64 {
    10
}
fn default_estimated_ready_seconds() -> u64 {
    60
}

fn default_optional_prefixes() -> Vec<String> {
    ["/hub", "/login", "/help", "/import", "/media"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}
fn default_local_prefix() -> String {
    "/local".to_string()
}
fn default_admin_prefix() -> String {
    "/admin".to_string()
}

fn default_server_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    8790
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StagehandConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.coordinator.max_poll_duration(), Duration::from_secs(120));
        assert_eq!(config.coordinator.default_estimated_ready_seconds, 60);
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.server.ip, "127.0.0.1");
        assert_eq!(config.server.port, 8790);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[coordinator]
status_endpoint = "https://control.example.test/status"
wake_endpoint = "https://control.example.test/wake"
max_poll_seconds = 180

[routes]
optional_prefixes = ["/hub"]
required_prefixes = ["/hub/live"]
"#
        )
        .unwrap();

        let config = StagehandConfig::load_from_file(file.path()).unwrap();

        assert_eq!(
            config.coordinator.status_endpoint,
            "https://control.example.test/status"
        );
        assert_eq!(config.coordinator.max_poll_seconds, 180);
        assert_eq!(config.coordinator.poll_interval_seconds, 5);
        assert_eq!(config.routes.optional_prefixes, vec!["/hub".to_string()]);
        assert_eq!(config.routes.required_prefixes, vec!["/hub/live".to_string()]);
        assert_eq!(config.routes.local_prefix, "/local");
        assert_eq!(config.server.port, 8790);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StagehandConfig::load_from_file(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, StagehandConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StagehandConfig::default();

        config.coordinator.wake_endpoint = "control.example.test/wake".to_string();
        assert!(config.validate().is_err());
        config.coordinator.wake_endpoint = default_wake_endpoint();

        config.coordinator.poll_interval_seconds = 0;
        assert!(config.validate().is_err());

        config.coordinator.poll_interval_seconds = 30;
        config.coordinator.max_poll_seconds = 10;
        assert!(config.validate().is_err());

        config.coordinator.max_poll_seconds = 120;
        assert!(config.validate().is_ok());

        config.routes.optional_prefixes.push("hub".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = StagehandConfig::default().to_toml().unwrap();

        assert!(rendered.contains("[coordinator]"));
        assert!(rendered.contains("poll_interval_seconds = 5"));
        assert!(rendered.contains("local_prefix = \"/local\""));
    }
}
