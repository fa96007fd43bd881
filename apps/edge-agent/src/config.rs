use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

const MIN_HEARTBEAT_MS: u64 = 100;
const MIN_SCAN_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub edge_id: String,
    pub version: String,
    pub edge_ip: String,
    pub network_interface: String,
    pub iptool_target: String,
    pub server_base_url: String,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_client_id: String,
    pub grpc_port: u16,
    pub heartbeat_interval: Duration,
    pub ipcscan_timeout: Duration,
}

impl EdgeConfig {
    pub fn from_env() -> Result<Self> {
        let edge_id = env_string("RED_SAFE_EDGE_ID", None)?;
        let version = env_string("RED_SAFE_EDGE_VERSION", Some("1.0.0".to_string()))?;
        let edge_ip = env_string("RED_SAFE_EDGE_IP", Some(String::new()))?;
        let network_interface = env_string("RED_SAFE_NETWORK_INTERFACE", Some(String::new()))?;
        let iptool_target =
            env_string("RED_SAFE_IPTOOL_TARGET", Some("localhost:20002".to_string()))?;
        let server_base_url = env_string(
            "RED_SAFE_SERVER_URL",
            Some("https://api.redsafe-tw.com".to_string()),
        )?;
        let mqtt_broker = env_string(
            "RED_SAFE_MQTT_BROKER",
            Some("mqtt.redsafe-tw.com/mqtt".to_string()),
        )?;
        let mqtt_port = env_u64("RED_SAFE_MQTT_PORT", 443) as u16;
        let mqtt_username = env_string("RED_SAFE_MQTT_USERNAME", Some("redsafemqtt".to_string()))?;
        let mqtt_password = env_string("RED_SAFE_MQTT_PASSWORD", Some("redsafemqtt".to_string()))?;
        let grpc_port = env_u64("RED_SAFE_GRPC_PORT", 20001) as u16;

        let heartbeat_ms = env_u64("RED_SAFE_HEARTBEAT_MS", 1000).max(MIN_HEARTBEAT_MS);
        let scan_timeout_ms = env_u64("RED_SAFE_IPCSCAN_TIMEOUT_MS", 3000).max(MIN_SCAN_TIMEOUT_MS);

        let mqtt_client_id = format!("Client-{edge_id}");

        Ok(Self {
            edge_id,
            version,
            edge_ip,
            network_interface,
            iptool_target,
            server_base_url,
            mqtt_broker,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            grpc_port,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            ipcscan_timeout: Duration::from_millis(scan_timeout_ms),
        })
    }

    pub fn status_topic(&self) -> String {
        format!("{}/status", self.edge_id)
    }

    pub fn cmd_topic(&self) -> String {
        format!("{}/cmd", self.edge_id)
    }

    pub fn data_topic(&self) -> String {
        format!("{}/data", self.edge_id)
    }

    /// The NetworkService listen port, taken from the target the command
    /// plane dials (host:port), default 20002.
    pub fn iptool_port(&self) -> u16 {
        self.iptool_target
            .rsplit(':')
            .next()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(20002)
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

/// Integer env vars never abort startup: a bad value logs a warning and the
/// default wins.
fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(key, value = %value, "invalid integer env var; using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment access is process-global, so all mutations live in this
    // one test.
    #[test]
    fn from_env_applies_defaults_clamps_and_fallbacks() {
        env::set_var("RED_SAFE_EDGE_ID", "RED-0A1B2C3D");
        env::remove_var("RED_SAFE_EDGE_VERSION");
        env::remove_var("RED_SAFE_MQTT_BROKER");
        env::remove_var("RED_SAFE_MQTT_PORT");
        env::remove_var("RED_SAFE_GRPC_PORT");
        env::remove_var("RED_SAFE_IPTOOL_TARGET");
        env::set_var("RED_SAFE_HEARTBEAT_MS", "10");
        env::set_var("RED_SAFE_IPCSCAN_TIMEOUT_MS", "not-a-number");

        let config = EdgeConfig::from_env().unwrap();
        assert_eq!(config.edge_id, "RED-0A1B2C3D");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.mqtt_client_id, "Client-RED-0A1B2C3D");
        assert_eq!(config.mqtt_port, 443);
        assert_eq!(config.grpc_port, 20001);
        assert_eq!(config.iptool_port(), 20002);
        // Below-minimum heartbeat clamps up; bad scan timeout falls back.
        assert_eq!(config.heartbeat_interval, Duration::from_millis(100));
        assert_eq!(config.ipcscan_timeout, Duration::from_millis(3000));

        assert_eq!(config.cmd_topic(), "RED-0A1B2C3D/cmd");
        assert_eq!(config.data_topic(), "RED-0A1B2C3D/data");
        assert_eq!(config.status_topic(), "RED-0A1B2C3D/status");

        env::set_var("RED_SAFE_HEARTBEAT_MS", "250");
        env::set_var("RED_SAFE_IPCSCAN_TIMEOUT_MS", "900");
        env::set_var("RED_SAFE_IPTOOL_TARGET", "127.0.0.1:30002");
        let config = EdgeConfig::from_env().unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.ipcscan_timeout, Duration::from_millis(900));
        assert_eq!(config.iptool_port(), 30002);

        env::remove_var("RED_SAFE_EDGE_ID");
        assert!(EdgeConfig::from_env().is_err());

        env::remove_var("RED_SAFE_HEARTBEAT_MS");
        env::remove_var("RED_SAFE_IPCSCAN_TIMEOUT_MS");
        env::remove_var("RED_SAFE_IPTOOL_TARGET");
    }
}
