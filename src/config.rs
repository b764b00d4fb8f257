use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SupervisorConfig {
    /// Directory for persisted settings, installed artifacts and service data
    #[serde(default = "default_storage_directory")]
    pub storage_directory: PathBuf,

    /// Number of log lines retained per component
    #[serde(default = "default_max_messages")]
    pub max_messages_per_component: usize,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub installers: InstallersConfig,

    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimingConfig {
    /// Recovery loop period in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Node-info polling period while the ledger node boots
    #[serde(default = "default_node_poll_interval")]
    pub node_poll_interval_secs: u64,

    /// Delay before restarting a failed ledger node
    #[serde(default = "default_iri_restart_delay")]
    pub iri_restart_delay_secs: u64,

    /// Delay before cycling a failed peer-discovery service
    #[serde(default = "default_nelson_restart_delay")]
    pub nelson_restart_delay_secs: u64,

    /// Wait before the transaction stream starts, letting the node sync
    #[serde(default = "default_stream_start_delay")]
    pub stream_start_delay_secs: u64,

    /// Grace period for a graceful stop before the process is killed
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProbeConfig {
    /// Free space required on a fresh install, in GB
    #[serde(default = "default_min_free_space_gb")]
    pub min_free_space_gb: u64,

    /// Free space required once the database is installed, in GB
    #[serde(default = "default_min_free_space_installed_gb")]
    pub min_free_space_installed_gb: u64,

    /// Total memory required, in MB
    #[serde(default = "default_min_memory_mb")]
    pub min_memory_mb: u64,

    /// Binary that must be on PATH for the ledger node to run
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortsConfig {
    #[serde(default = "default_tcp_ports")]
    pub tcp: Vec<u16>,

    #[serde(default = "default_udp_ports")]
    pub udp: Vec<u16>,

    /// Port the chatangle website listens on
    #[serde(default = "default_web_port")]
    pub web: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactConfig {
    /// Local artifact to install from
    pub source: PathBuf,

    /// Install location, relative to the storage directory
    pub target: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstallersConfig {
    #[serde(default = "default_iri_artifact")]
    pub iri: ArtifactConfig,

    #[serde(default = "default_database_artifact")]
    pub database: ArtifactConfig,
}

/// How a service answers health queries
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCheckConfig {
    /// Report process liveness only
    #[default]
    Process,
    /// Connect to a TCP address
    Tcp { address: String },
    /// POST a `getNodeInfo` command to the node API
    NodeInfo { url: String },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Executable to launch
    pub program: String,

    /// Arguments; `{port}`, `{public}`, `{name}`, `{protocol}` and `{storage}`
    /// are replaced from the current node settings
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub health: HealthCheckConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_iri_service")]
    pub iri: ServiceConfig,

    #[serde(default = "default_nelson_service")]
    pub nelson: ServiceConfig,

    #[serde(default = "default_stream_service")]
    pub transaction_stream: ServiceConfig,

    #[serde(default = "default_chatangle_backend_service")]
    pub chatangle_backend: ServiceConfig,

    #[serde(default = "default_chatangle_service")]
    pub chatangle: ServiceConfig,
}

impl SupervisorConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "storage_directory",
                default_storage_directory().to_string_lossy().to_string(),
            )?
            .set_default("max_messages_per_component", default_max_messages() as i64)?
            .set_default("timing.tick_interval_secs", default_tick_interval())?
            .set_default("timing.node_poll_interval_secs", default_node_poll_interval())?
            .set_default("timing.iri_restart_delay_secs", default_iri_restart_delay())?
            .set_default(
                "timing.nelson_restart_delay_secs",
                default_nelson_restart_delay(),
            )?
            .set_default("timing.stream_start_delay_secs", default_stream_start_delay())?
            .set_default("timing.stop_grace_secs", default_stop_grace())?
            .set_default("probe.min_free_space_gb", default_min_free_space_gb())?
            .set_default(
                "probe.min_free_space_installed_gb",
                default_min_free_space_installed_gb(),
            )?
            .set_default("probe.min_memory_mb", default_min_memory_mb())?
            .set_default("probe.runtime_binary", default_runtime_binary())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // NODEKEEPER_TIMING__TICK_INTERVAL_SECS=10 overrides timing.tick_interval_secs
            .add_source(Environment::with_prefix("NODEKEEPER").separator("__"))
            .build()?;

        let config: SupervisorConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages_per_component == 0 {
            return Err(ConfigError::Message(
                "max_messages_per_component must be greater than 0".to_string(),
            ));
        }

        if self.timing.tick_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Recovery tick interval must be greater than 0".to_string(),
            ));
        }

        if self.timing.node_poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Node poll interval must be greater than 0".to_string(),
            ));
        }

        if self.probe.runtime_binary.trim().is_empty() {
            return Err(ConfigError::Message(
                "Probe runtime_binary must not be empty".to_string(),
            ));
        }

        for (name, service) in self.services.iter() {
            if service.program.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Service {} has no program configured",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            storage_directory: default_storage_directory(),
            max_messages_per_component: default_max_messages(),
            timing: TimingConfig::default(),
            probe: ProbeConfig::default(),
            ports: PortsConfig::default(),
            installers: InstallersConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn node_poll_interval(&self) -> Duration {
        Duration::from_secs(self.node_poll_interval_secs)
    }

    pub fn iri_restart_delay(&self) -> Duration {
        Duration::from_secs(self.iri_restart_delay_secs)
    }

    pub fn nelson_restart_delay(&self) -> Duration {
        Duration::from_secs(self.nelson_restart_delay_secs)
    }

    pub fn stream_start_delay(&self) -> Duration {
        Duration::from_secs(self.stream_start_delay_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            node_poll_interval_secs: default_node_poll_interval(),
            iri_restart_delay_secs: default_iri_restart_delay(),
            nelson_restart_delay_secs: default_nelson_restart_delay(),
            stream_start_delay_secs: default_stream_start_delay(),
            stop_grace_secs: default_stop_grace(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            min_free_space_gb: default_min_free_space_gb(),
            min_free_space_installed_gb: default_min_free_space_installed_gb(),
            min_memory_mb: default_min_memory_mb(),
            runtime_binary: default_runtime_binary(),
        }
    }
}

impl PortsConfig {
    /// Final startup message listing the ports that must be reachable
    pub fn open_ports_message(&self) -> String {
        let join = |ports: &[u16]| {
            ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "Installation succeeded!\nEnsure TCP ports {} and UDP ports {} are open.\nChatangle website is running on port {}.",
            join(&self.tcp),
            join(&self.udp),
            self.web
        )
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            tcp: default_tcp_ports(),
            udp: default_udp_ports(),
            web: default_web_port(),
        }
    }
}

impl Default for InstallersConfig {
    fn default() -> Self {
        Self {
            iri: default_iri_artifact(),
            database: default_database_artifact(),
        }
    }
}

impl ServicesConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ServiceConfig)> {
        [
            ("iri", &self.iri),
            ("nelson", &self.nelson),
            ("transaction_stream", &self.transaction_stream),
            ("chatangle_backend", &self.chatangle_backend),
            ("chatangle", &self.chatangle),
        ]
        .into_iter()
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            iri: default_iri_service(),
            nelson: default_nelson_service(),
            transaction_stream: default_stream_service(),
            chatangle_backend: default_chatangle_backend_service(),
            chatangle: default_chatangle_service(),
        }
    }
}

// Default value functions
fn default_storage_directory() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_messages() -> usize {
    crate::state::DEFAULT_MAX_MESSAGES
}

fn default_tick_interval() -> u64 {
    5
}
fn default_node_poll_interval() -> u64 {
    1
}
fn default_iri_restart_delay() -> u64 {
    2
}
fn default_nelson_restart_delay() -> u64 {
    5
}
fn default_stream_start_delay() -> u64 {
    10 * 60
}
fn default_stop_grace() -> u64 {
    10
}

fn default_min_free_space_gb() -> u64 {
    8
}
fn default_min_free_space_installed_gb() -> u64 {
    2
}
fn default_min_memory_mb() -> u64 {
    3600
}
fn default_runtime_binary() -> String {
    "java".to_string()
}

fn default_tcp_ports() -> Vec<u16> {
    vec![14265, 15600, 16600, 21310]
}
fn default_udp_ports() -> Vec<u16> {
    vec![14600]
}
fn default_web_port() -> u16 {
    8085
}

fn default_iri_artifact() -> ArtifactConfig {
    ArtifactConfig {
        source: PathBuf::from("./artifacts/iri.jar"),
        target: PathBuf::from("iri/iri.jar"),
    }
}
fn default_database_artifact() -> ArtifactConfig {
    ArtifactConfig {
        source: PathBuf::from("./artifacts/mainnetdb.tar"),
        target: PathBuf::from("database/mainnetdb.tar"),
    }
}

fn service(program: &str, args: &[&str], health: HealthCheckConfig) -> ServiceConfig {
    ServiceConfig {
        program: program.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        env: BTreeMap::new(),
        working_dir: None,
        health,
    }
}

fn default_iri_service() -> ServiceConfig {
    service(
        "java",
        &[
            "-jar",
            "{storage}/iri/iri.jar",
            "--port",
            "{port}",
            "--db-path",
            "{storage}/database",
            "--remote",
            "{public}",
        ],
        HealthCheckConfig::NodeInfo {
            url: "http://127.0.0.1:{port}".to_string(),
        },
    )
}
fn default_nelson_service() -> ServiceConfig {
    service(
        "nelson",
        &[
            "--name",
            "{name}",
            "--protocol",
            "{protocol}",
            "--data",
            "{storage}/nelson",
            "--apiPort",
            "18600",
        ],
        HealthCheckConfig::Process,
    )
}
fn default_stream_service() -> ServiceConfig {
    service(
        "iota-transaction-stream",
        &["--port", "8007", "--iota-ip", "localhost", "--zmq-port", "5556"],
        HealthCheckConfig::Process,
    )
}
fn default_chatangle_backend_service() -> ServiceConfig {
    service(
        "chatangle-backend",
        &["--stream-port", "8007", "--websocket-port", "8008"],
        HealthCheckConfig::Process,
    )
}
fn default_chatangle_service() -> ServiceConfig {
    service(
        "chatangle",
        &["--port", "8085"],
        HealthCheckConfig::Tcp {
            address: "127.0.0.1:8085".to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_messages_per_component, 1000);
        assert_eq!(config.timing.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.timing.stream_start_delay(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SupervisorConfig::default();
        config.max_messages_per_component = 0;
        assert!(config.validate().is_err());

        config.max_messages_per_component = 10;
        config.services.nelson.program = " ".to_string();
        assert!(config.validate().is_err());

        config.services.nelson.program = "nelson".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
storage_directory = "/var/lib/nodekeeper"
max_messages_per_component = 50

[timing]
tick_interval_secs = 30

[services.chatangle]
program = "/opt/chatangle/bin/serve"
args = ["--port", "9000"]

[services.chatangle.health]
kind = "tcp"
address = "127.0.0.1:9000"
"#
        )
        .unwrap();

        let config = SupervisorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.storage_directory, PathBuf::from("/var/lib/nodekeeper"));
        assert_eq!(config.max_messages_per_component, 50);
        assert_eq!(config.timing.tick_interval_secs, 30);
        assert_eq!(config.timing.node_poll_interval_secs, 1);
        assert_eq!(config.services.chatangle.program, "/opt/chatangle/bin/serve");
        assert_eq!(
            config.services.chatangle.health,
            HealthCheckConfig::Tcp {
                address: "127.0.0.1:9000".to_string()
            }
        );
        assert_eq!(config.services.nelson.program, "nelson");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SupervisorConfig::load_from_file("/nonexistent/nodekeeper.toml").unwrap();
        assert_eq!(config.probe.runtime_binary, "java");
        assert_eq!(config.ports.web, 8085);
    }

    #[test]
    fn test_open_ports_message() {
        let message = PortsConfig::default().open_ports_message();
        assert!(message.contains("TCP ports 14265, 15600, 16600, 21310"));
        assert!(message.contains("UDP ports 14600"));
        assert!(message.contains("port 8085"));
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&SupervisorConfig::default()).unwrap();
        assert!(rendered.contains("[timing]"));
        assert!(rendered.contains("node_info"));
    }
}
