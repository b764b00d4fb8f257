use crate::config::HealthCheckConfig;
use crate::error::{Result, SupervisorError};
use crate::state::{ComponentId, HealthInfo};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const API_VERSION_HEADER: &str = "X-IOTA-API-Version";

/// Resolved health check for one service
#[derive(Debug, Clone)]
pub enum HealthProbe {
    Process,
    Tcp { address: String },
    NodeInfo { url: String, client: reqwest::Client },
}

impl HealthProbe {
    /// Build a probe from config, expanding placeholders with `render`
    pub fn from_config(config: &HealthCheckConfig, render: impl Fn(&str) -> String) -> Result<Self> {
        Ok(match config {
            HealthCheckConfig::Process => HealthProbe::Process,
            HealthCheckConfig::Tcp { address } => HealthProbe::Tcp {
                address: render(address),
            },
            HealthCheckConfig::NodeInfo { url } => {
                let client = reqwest::Client::builder()
                    .timeout(HEALTH_TIMEOUT)
                    .build()
                    .map_err(|e| SupervisorError::system(format!("HTTP client: {}", e)))?;
                HealthProbe::NodeInfo {
                    url: render(url),
                    client,
                }
            }
        })
    }

    /// Run the check; `Ok(None)` for process-only probes
    pub async fn check(&self, component: ComponentId) -> Result<Option<HealthInfo>> {
        match self {
            HealthProbe::Process => Ok(None),
            HealthProbe::Tcp { address } => {
                let started = Instant::now();
                match timeout(HEALTH_TIMEOUT, TcpStream::connect(address.as_str())).await {
                    Ok(Ok(_stream)) => Ok(Some(json!({
                        "address": address,
                        "latency_ms": started.elapsed().as_millis() as u64,
                    }))),
                    Ok(Err(e)) => Err(SupervisorError::health(
                        component,
                        format!("connect {}: {}", address, e),
                    )),
                    Err(_) => Err(SupervisorError::health(
                        component,
                        format!("connect {} timed out", address),
                    )),
                }
            }
            HealthProbe::NodeInfo { url, client } => {
                trace!("Querying node info at {}", url);
                let response = client
                    .post(url.as_str())
                    .header(API_VERSION_HEADER, "1")
                    .json(&json!({ "command": "getNodeInfo" }))
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| SupervisorError::health(component, e.to_string()))?;

                let info: HealthInfo = response
                    .json()
                    .await
                    .map_err(|e| SupervisorError::health(component, e.to_string()))?;
                Ok(Some(info))
            }
        }
    }
}
