use crate::config::EdgeConfig;
use crate::grpc::IptoolClient;
use chrono::{FixedOffset, Utc};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::AsyncClient;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The edge's own IP is re-resolved at most this often, or whenever it is
/// still unknown.
const IP_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

pub fn heartbeat_payload(
    edge_id: &str,
    version: &str,
    ip: &str,
    sequence: u64,
    heartbeat_at: &str,
) -> Value {
    json!({
        "edge_id": edge_id,
        "version": version,
        "heartbeat_at": heartbeat_at,
        "status": "online",
        "sequence": sequence,
        "ip": ip,
    })
}

/// ISO-8601 with millisecond precision at UTC+08:00.
pub fn current_timestamp() -> String {
    let taipei = FixedOffset::east_opt(8 * 3600).expect("fixed +08:00 offset");
    Utc::now()
        .with_timezone(&taipei)
        .format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        .to_string()
}

/// Publishes one heartbeat per interval for the lifetime of the session.
/// The sequence counter belongs to this task, so numbers are strictly
/// monotonic within a session and restart at zero with it.
pub async fn run(
    client: AsyncClient,
    config: EdgeConfig,
    iptool: IptoolClient,
    cancel: CancellationToken,
) {
    let topic = config.status_topic();
    let mut sequence: u64 = 0;
    let mut edge_ip = config.edge_ip.clone();
    let mut last_refresh: Option<Instant> = None;

    loop {
        let due = last_refresh.map_or(true, |at| at.elapsed() >= IP_REFRESH_INTERVAL);
        if edge_ip.is_empty() || due {
            match iptool.get_network_config(&config.network_interface).await {
                Ok(net) if !net.ip_address.is_empty() => {
                    edge_ip = net.ip_address;
                    last_refresh = Some(Instant::now());
                }
                Ok(_) => {
                    last_refresh = Some(Instant::now());
                }
                Err(err) => {
                    if edge_ip.is_empty() {
                        tracing::warn!(error = %err, "failed to resolve edge IP");
                    }
                    last_refresh = Some(Instant::now());
                }
            }
        }

        let payload = heartbeat_payload(
            &config.edge_id,
            &config.version,
            &edge_ip,
            sequence,
            &current_timestamp(),
        );
        sequence += 1;

        let encoded = serde_json::to_vec(&payload).unwrap_or_default();
        if let Err(err) = client
            .publish(topic.clone(), QoS::AtLeastOnce, false, encoded)
            .await
        {
            tracing::warn!(error = %err, "heartbeat publish failed");
        } else {
            tracing::debug!(sequence = sequence - 1, "heartbeat sent");
        }

        tokio::select! {
            _ = tokio::time::sleep(config.heartbeat_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_the_status_contract_shape() {
        let payload = heartbeat_payload(
            "RED-0A1B2C3D",
            "1.2.3",
            "192.168.1.20",
            7,
            "2026-08-01T12:00:00.123+08:00",
        );
        assert_eq!(payload["edge_id"], "RED-0A1B2C3D");
        assert_eq!(payload["version"], "1.2.3");
        assert_eq!(payload["status"], "online");
        assert_eq!(payload["sequence"], 7);
        assert_eq!(payload["ip"], "192.168.1.20");
        assert_eq!(payload["heartbeat_at"], "2026-08-01T12:00:00.123+08:00");
    }

    #[test]
    fn timestamp_is_iso8601_millis_at_plus_eight() {
        let stamp = current_timestamp();
        assert!(stamp.ends_with("+08:00"), "{stamp}");

        let parsed = chrono::DateTime::parse_from_rfc3339(&stamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 8 * 3600);

        // Millisecond precision: exactly three fractional digits.
        let fraction = stamp.split('.').nth(1).unwrap();
        assert_eq!(fraction.split('+').next().unwrap().len(), 3);
    }
}
