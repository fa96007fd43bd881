use crate::grpc::iptool_proto::{NetworkConfig, NetworkMode};
use crate::grpc::IptoolClient;
use crate::mqtt::watchdog::WatchdogHandle;
use crate::scan::ScanEngine;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A well-formed command envelope: string `trace_id`, `code` normalised to a
/// string (integers are stringified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub trace_id: String,
    pub code: String,
}

/// Outcome of envelope parsing. `Malformed` carries whatever fields were
/// recoverable so the error reply can still echo them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Command(CommandMessage),
    Malformed { trace_id: String, code: String },
}

/// Parses a `/cmd` payload. Unparseable JSON yields `None` and is skipped
/// without a reply; structural problems yield `Malformed`.
pub fn parse_command(payload: &[u8]) -> Option<Parsed> {
    let body: Value = serde_json::from_slice(payload).ok()?;

    let trace_id = body
        .get("trace_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let code_value = body.get("code");
    let code_repr = match code_value {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Some(number.to_string())
        }
        Some(other) => {
            return Some(Parsed::Malformed {
                trace_id: trace_id.unwrap_or_default(),
                code: other.to_string(),
            });
        }
        None => None,
    };

    match (trace_id, code_repr) {
        (Some(trace_id), Some(code)) => Some(Parsed::Command(CommandMessage { trace_id, code })),
        (trace_id, code) => Some(Parsed::Malformed {
            trace_id: trace_id.unwrap_or_default(),
            code: code.unwrap_or_default(),
        }),
    }
}

pub fn ack_reply(trace_id: &str, code: &str) -> Value {
    json!({
        "trace_id": trace_id,
        "code": code,
        "status": "ok",
        "result": { "message": "heartbeat_ack" },
    })
}

/// Scan success: `result` is the parsed device array; an unparseable engine
/// result degrades to an empty array.
pub fn scan_success_reply(trace_id: &str, result_json: &str) -> Value {
    let result: Value = serde_json::from_str(result_json).unwrap_or_else(|_| json!([]));
    json!({
        "trace_id": trace_id,
        "code": 101,
        "status": "ok",
        "result": result,
    })
}

pub fn scan_error_reply(trace_id: &str, error_message: &str) -> Value {
    json!({
        "trace_id": trace_id,
        "code": 101,
        "status": "error",
        "result": { "error_message": error_message },
    })
}

pub fn error_reply(trace_id: &str, code: &str, error_message: &str) -> Value {
    json!({
        "trace_id": trace_id,
        "code": code,
        "status": "error",
        "result": { "error_message": error_message },
    })
}

pub fn unsupported_reply(trace_id: &str, code: &str) -> Value {
    error_reply(trace_id, code, "unsupported command")
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &CommandMessage) -> Value;
}

/// Dispatch table registered at startup; unknown codes fall through to the
/// unsupported-command reply. Handlers do not depend on each other.
#[derive(Default)]
pub struct CommandRouter {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, code: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(code.to_string(), handler);
    }

    pub async fn dispatch(&self, command: &CommandMessage) -> Value {
        match self.handlers.get(&command.code) {
            Some(handler) => handler.handle(command).await,
            None => {
                tracing::warn!(code = %command.code, trace_id = %command.trace_id, "unsupported command");
                unsupported_reply(&command.trace_id, &command.code)
            }
        }
    }
}

/// code 100: reset the command-silence watchdog and acknowledge.
pub struct HeartbeatAckHandler {
    watchdog: WatchdogHandle,
}

impl HeartbeatAckHandler {
    pub fn new(watchdog: WatchdogHandle) -> Self {
        Self { watchdog }
    }
}

#[async_trait]
impl CommandHandler for HeartbeatAckHandler {
    async fn handle(&self, command: &CommandMessage) -> Value {
        self.watchdog.reset();
        ack_reply(&command.trace_id, &command.code)
    }
}

/// code 101: run an IPC scan off the I/O task and reply with the device
/// array.
pub struct ScanHandler {
    engine: Arc<ScanEngine>,
}

impl ScanHandler {
    pub fn new(engine: Arc<ScanEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for ScanHandler {
    async fn handle(&self, command: &CommandMessage) -> Value {
        match self.engine.scan_json().await {
            Ok(result) => {
                tracing::info!(trace_id = %command.trace_id, bytes = result.len(), "IPC scan finished");
                scan_success_reply(&command.trace_id, &result)
            }
            Err(err) => {
                tracing::error!(error = %err, trace_id = %command.trace_id, "IPC scan failed");
                scan_error_reply(&command.trace_id, &err.to_string())
            }
        }
    }
}

/// code 102: fetch the effective network configuration from the IPtool
/// facade.
pub struct NetworkInfoHandler {
    iptool: IptoolClient,
    interface_name: String,
}

impl NetworkInfoHandler {
    pub fn new(iptool: IptoolClient, interface_name: &str) -> Self {
        let interface_name = if interface_name.is_empty() {
            "eth0".to_string()
        } else {
            interface_name.to_string()
        };
        Self {
            iptool,
            interface_name,
        }
    }
}

#[async_trait]
impl CommandHandler for NetworkInfoHandler {
    async fn handle(&self, command: &CommandMessage) -> Value {
        match self.iptool.get_network_config(&self.interface_name).await {
            Ok(config) => json!({
                "trace_id": command.trace_id,
                "code": command.code,
                "status": "ok",
                "result": network_info_result(&config),
            }),
            Err(err) => {
                tracing::error!(error = %err, interface = %self.interface_name, "network config query failed");
                error_reply(
                    &command.trace_id,
                    &command.code,
                    "failed to query network config",
                )
            }
        }
    }
}

fn mode_name(mode: i32) -> &'static str {
    match NetworkMode::try_from(mode) {
        Ok(NetworkMode::Dhcp) => "dhcp",
        Ok(NetworkMode::Manual) => "manual",
        _ => "unspecified",
    }
}

fn mode_raw(mode: i32) -> &'static str {
    match NetworkMode::try_from(mode) {
        Ok(NetworkMode::Dhcp) => "NETWORK_MODE_DHCP",
        Ok(NetworkMode::Manual) => "NETWORK_MODE_MANUAL",
        _ => "NETWORK_MODE_UNSPECIFIED",
    }
}

fn network_info_result(config: &NetworkConfig) -> Value {
    json!({
        "interface_name": config.interface_name,
        "ip_address": config.ip_address,
        "mac_address": config.mac_address,
        "subnet_mask": config.subnet_mask,
        "gateway": config.gateway,
        "dns": config.dns,
        "mode": {
            "name": mode_name(config.mode),
            "value": config.mode,
            "raw": mode_raw(config.mode),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_code_parses_as_command() {
        let parsed = parse_command(br#"{"trace_id":"T1","code":"101"}"#).unwrap();
        assert_eq!(
            parsed,
            Parsed::Command(CommandMessage {
                trace_id: "T1".to_string(),
                code: "101".to_string(),
            })
        );
    }

    #[test]
    fn integer_code_is_stringified() {
        let parsed = parse_command(br#"{"trace_id":"T2","code":999}"#).unwrap();
        assert_eq!(
            parsed,
            Parsed::Command(CommandMessage {
                trace_id: "T2".to_string(),
                code: "999".to_string(),
            })
        );
    }

    #[test]
    fn missing_or_nonstring_trace_id_is_malformed() {
        let parsed = parse_command(br#"{"code":"100"}"#).unwrap();
        assert_eq!(
            parsed,
            Parsed::Malformed {
                trace_id: String::new(),
                code: "100".to_string(),
            }
        );

        let parsed = parse_command(br#"{"trace_id":7,"code":"100"}"#).unwrap();
        assert!(matches!(parsed, Parsed::Malformed { .. }));
    }

    #[test]
    fn unsupported_code_type_is_malformed_with_rendered_code() {
        let parsed = parse_command(br#"{"trace_id":"T3","code":1.5}"#).unwrap();
        assert_eq!(
            parsed,
            Parsed::Malformed {
                trace_id: "T3".to_string(),
                code: "1.5".to_string(),
            }
        );
    }

    #[test]
    fn unparseable_json_is_skipped() {
        assert_eq!(parse_command(b"{nope"), None);
    }

    #[test]
    fn ack_reply_echoes_trace_and_code_as_string() {
        let reply = ack_reply("T1", "100");
        assert_eq!(reply["trace_id"], "T1");
        assert_eq!(reply["code"], "100");
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["result"]["message"], "heartbeat_ack");
    }

    #[test]
    fn scan_reply_embeds_parsed_array_and_falls_back_to_empty() {
        let reply =
            scan_success_reply("T1", r#"[{"ip":"192.168.1.42","mac":"AA:BB","name":"IPC"}]"#);
        assert_eq!(reply["code"], 101);
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["result"][0]["ip"], "192.168.1.42");

        let reply = scan_success_reply("T1", "");
        assert_eq!(reply["result"], json!([]));
    }

    #[test]
    fn unsupported_reply_preserves_the_incoming_code() {
        let reply = unsupported_reply("T2", "999");
        assert_eq!(reply["trace_id"], "T2");
        assert_eq!(reply["code"], "999");
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["result"]["error_message"], "unsupported command");
    }

    #[tokio::test]
    async fn dispatch_falls_through_to_unsupported() {
        let router = CommandRouter::new();
        let reply = router
            .dispatch(&CommandMessage {
                trace_id: "T9".to_string(),
                code: "424242".to_string(),
            })
            .await;
        assert_eq!(reply["trace_id"], "T9");
        assert_eq!(reply["code"], "424242");
        assert_eq!(reply["result"]["error_message"], "unsupported command");
    }

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        async fn handle(&self, command: &CommandMessage) -> Value {
            json!({ "trace_id": command.trace_id, "code": command.code, "status": "ok" })
        }
    }

    #[tokio::test]
    async fn dispatch_routes_registered_codes() {
        let mut router = CommandRouter::new();
        router.register("7", Arc::new(EchoHandler));
        let reply = router
            .dispatch(&CommandMessage {
                trace_id: "T1".to_string(),
                code: "7".to_string(),
            })
            .await;
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["code"], "7");
    }

    #[test]
    fn network_info_result_pins_the_iptool_shape() {
        let config = NetworkConfig {
            interface_name: "eth0".to_string(),
            ip_address: "192.168.1.10".to_string(),
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
            subnet_mask: "255.255.255.0".to_string(),
            gateway: "192.168.1.1".to_string(),
            dns: "1.1.1.1".to_string(),
            mode: NetworkMode::Dhcp as i32,
        };
        let result = network_info_result(&config);
        assert_eq!(result["interface_name"], "eth0");
        assert_eq!(result["mode"]["name"], "dhcp");
        assert_eq!(result["mode"]["value"], NetworkMode::Dhcp as i32);
        assert_eq!(result["mode"]["raw"], "NETWORK_MODE_DHCP");
    }
}
