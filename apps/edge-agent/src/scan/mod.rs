pub mod arp;
pub mod parser;
pub mod probe;
pub mod transport;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub ip: String,
    pub mac: String,
    pub name: String,
}

const DEFAULT_NAME: &str = "IPC";

/// One WS-Discovery sweep per call. Each call owns its own socket; the mutex
/// serialises concurrent callers sharing this engine.
pub struct ScanEngine {
    timeout: Duration,
    lock: Mutex<()>,
}

impl ScanEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            lock: Mutex::new(()),
        }
    }

    pub async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        let _guard = self.lock.lock().await;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || scan_blocking(timeout))
            .await
            .context("scan task join failed")?
    }

    /// Compact JSON rendering of a sweep: `[{ip,mac,name},...]`, empty string
    /// when nothing answered.
    pub async fn scan_json(&self) -> Result<String> {
        let devices = self.scan().await?;
        devices_to_json(&devices)
    }
}

pub fn devices_to_json(devices: &[DeviceInfo]) -> Result<String> {
    if devices.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(devices).context("serialise scan result")
}

fn scan_blocking(timeout: Duration) -> Result<Vec<DeviceInfo>> {
    let socket = transport::DiscoverySocket::open(timeout).context("open discovery socket")?;
    socket
        .send_probe(probe::build_probe().as_bytes())
        .context("send discovery probe")?;

    Ok(aggregate(socket.collect_replies()))
}

/// Deduplicates replies by source IP in insertion order, parses Scopes, then
/// backfills missing MACs from the ARP cache and missing names with the
/// default.
fn aggregate(replies: Vec<(String, Vec<u8>)>) -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = Vec::new();
    let mut index_by_ip: HashMap<String, usize> = HashMap::new();

    for (ip, payload) in replies {
        let index = *index_by_ip.entry(ip.clone()).or_insert_with(|| {
            devices.push(DeviceInfo {
                ip,
                ..Default::default()
            });
            devices.len() - 1
        });
        let xml = String::from_utf8_lossy(&payload);
        parser::apply_scopes(&xml, &mut devices[index]);
    }

    for device in &mut devices {
        if device.mac.is_empty() {
            if let Some(mac) = arp::lookup(&device.ip) {
                device.mac = mac;
            }
        }
        if device.name.is_empty() {
            device.name = DEFAULT_NAME.to_string();
        }
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(scopes: &str) -> Vec<u8> {
        format!("<d:Scopes>{scopes}</d:Scopes>").into_bytes()
    }

    #[test]
    fn aggregate_dedups_by_source_ip_in_insertion_order() {
        let devices = aggregate(vec![
            ("192.168.1.40".to_string(), reply("onvif://www.onvif.org/name/A")),
            ("192.168.1.41".to_string(), reply("onvif://www.onvif.org/name/B")),
            (
                "192.168.1.40".to_string(),
                reply("onvif://www.onvif.org/mac/aabbccddeeff"),
            ),
        ]);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].ip, "192.168.1.40");
        assert_eq!(devices[0].name, "A");
        assert_eq!(devices[0].mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[1].ip, "192.168.1.41");
        assert_eq!(devices[1].name, "B");
    }

    #[test]
    fn scopeless_reply_still_yields_a_device_with_default_name() {
        let devices = aggregate(vec![(
            "10.0.0.7".to_string(),
            b"<e:Envelope></e:Envelope>".to_vec(),
        )]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip, "10.0.0.7");
        assert_eq!(devices[0].name, "IPC");
    }

    #[test]
    fn malformed_payload_is_tolerated() {
        let devices = aggregate(vec![("10.0.0.8".to_string(), vec![0xFF, 0xFE, 0x00])]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip, "10.0.0.8");
    }

    #[test]
    fn json_rendering_is_compact_and_empty_for_no_devices() {
        assert_eq!(devices_to_json(&[]).unwrap(), "");

        let devices = vec![DeviceInfo {
            ip: "192.168.1.42".to_string(),
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "IPC".to_string(),
        }];
        assert_eq!(
            devices_to_json(&devices).unwrap(),
            r#"[{"ip":"192.168.1.42","mac":"AA:BB:CC:DD:EE:FF","name":"IPC"}]"#
        );
    }

    #[test]
    fn scan_result_invariants_hold() {
        let devices = aggregate(vec![
            (
                "192.168.1.50".to_string(),
                reply("onvif://www.onvif.org/mac/aa:bb:cc:dd:ee:ff"),
            ),
            ("192.168.1.51".to_string(), reply("onvif://www.onvif.org/type/ptz")),
        ]);
        for device in &devices {
            assert!(device.ip.parse::<std::net::Ipv4Addr>().is_ok());
            assert!(!device.name.is_empty());
            if !device.mac.is_empty() {
                assert_eq!(device.mac.len(), 17);
                assert!(device
                    .mac
                    .split(':')
                    .all(|pair| pair.len() == 2
                        && pair.chars().all(|c| c.is_ascii_hexdigit()
                            && !c.is_ascii_lowercase())));
            }
        }
    }
}
