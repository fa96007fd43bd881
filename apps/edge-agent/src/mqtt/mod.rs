pub mod command;
pub mod heartbeat;
pub mod watchdog;

use crate::config::EdgeConfig;
use crate::grpc::IptoolClient;
use crate::scan::ScanEngine;
use anyhow::{anyhow, bail, Result};
use command::{CommandRouter, HeartbeatAckHandler, NetworkInfoHandler, ScanHandler};
use rumqttc::v5::mqttbytes::v5::{Filter, Packet, RetainForwardRule, SubAck, SubscribeReasonCode};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use rumqttc::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use watchdog::WatchdogHandle;

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Capped exponential backoff: 1 s doubling to 30 s, reset once a session
/// subscribes successfully.
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

enum SessionEnd {
    Shutdown,
    Transport(anyhow::Error),
}

/// Runs the command plane until shutdown: connect, subscribe, serve, and
/// reconnect with backoff on transport errors. A broker that rejects the
/// subscription is fatal.
pub async fn run(
    config: EdgeConfig,
    engine: Arc<ScanEngine>,
    iptool: IptoolClient,
    watchdog: WatchdogHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let router = build_router(&config, engine, iptool.clone(), watchdog);
    let mut backoff = Backoff::new(RECONNECT_MIN, RECONNECT_MAX);

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match run_session(&config, &router, &iptool, &cancel, &mut backoff).await? {
            SessionEnd::Shutdown => return Ok(()),
            SessionEnd::Transport(err) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "MQTT session ended; reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Ok(()),
                }
            }
        }
    }
}

fn build_router(
    config: &EdgeConfig,
    engine: Arc<ScanEngine>,
    iptool: IptoolClient,
    watchdog: WatchdogHandle,
) -> CommandRouter {
    let mut router = CommandRouter::new();
    router.register("100", Arc::new(HeartbeatAckHandler::new(watchdog)));
    router.register("101", Arc::new(ScanHandler::new(engine)));
    router.register(
        "102",
        Arc::new(NetworkInfoHandler::new(iptool, &config.network_interface)),
    );
    router
}

/// The broker address for the TLS WebSocket transport. Already-schemed
/// values pass through.
fn broker_url(broker: &str) -> String {
    if broker.starts_with("wss://") || broker.starts_with("ws://") {
        broker.to_string()
    } else {
        format!("wss://{broker}")
    }
}

fn suback_rejected(ack: &SubAck) -> Option<String> {
    ack.return_codes.iter().find_map(|code| match code {
        SubscribeReasonCode::Success(_) => None,
        other => Some(format!("{other:?}")),
    })
}

async fn run_session(
    config: &EdgeConfig,
    router: &CommandRouter,
    iptool: &IptoolClient,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
) -> Result<SessionEnd> {
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        broker_url(&config.mqtt_broker),
        config.mqtt_port,
    );
    options.set_transport(Transport::wss_with_default_config());
    options.set_keep_alive(KEEP_ALIVE);
    options.set_credentials(config.mqtt_username.clone(), config.mqtt_password.clone());

    let (client, mut eventloop) = AsyncClient::new(options, 64);
    let cmd_topic = config.cmd_topic();
    let data_topic = config.data_topic();

    let filter = Filter {
        path: cmd_topic.clone(),
        qos: QoS::AtLeastOnce,
        nolocal: false,
        preserve_retain: true,
        retain_forward_rule: RetainForwardRule::OnEverySubscribe,
    };
    if let Err(err) = client.subscribe_many([filter]).await {
        return Ok(SessionEnd::Transport(anyhow!(err)));
    }

    // Heartbeats live exactly as long as the session; a new session starts a
    // new sequence at zero.
    let session_cancel = cancel.child_token();
    let heartbeat_task = tokio::spawn(heartbeat::run(
        client.clone(),
        config.clone(),
        iptool.clone(),
        session_cancel.clone(),
    ));

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => break SessionEnd::Shutdown,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(broker = %config.mqtt_broker, "MQTT connected");
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if let Some(reason) = suback_rejected(&ack) {
                        session_cancel.cancel();
                        heartbeat_task.abort();
                        bail!("broker rejected subscription to {cmd_topic}: {reason}");
                    }
                    backoff.reset();
                    tracing::info!(topic = %cmd_topic, "subscribed to command topic");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let topic = String::from_utf8_lossy(&publish.topic).into_owned();
                    if topic != cmd_topic {
                        tracing::warn!(%topic, "message on unexpected topic; ignoring");
                        continue;
                    }
                    handle_command(router, &client, &data_topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(err) => break SessionEnd::Transport(anyhow!(err)),
            }
        }
    };

    session_cancel.cancel();
    heartbeat_task.abort();
    Ok(end)
}

/// Parses and dispatches one command, publishing the reply to `/data`.
/// Replies are published from the session task, so `/data` ordering follows
/// command order.
async fn handle_command(
    router: &CommandRouter,
    client: &AsyncClient,
    data_topic: &str,
    payload: &[u8],
) {
    let Some(parsed) = command::parse_command(payload) else {
        tracing::warn!("dropping unparseable command payload");
        return;
    };

    let reply = match parsed {
        command::Parsed::Command(cmd) => {
            tracing::info!(code = %cmd.code, trace_id = %cmd.trace_id, "command received");
            router.dispatch(&cmd).await
        }
        command::Parsed::Malformed { trace_id, code } => {
            tracing::warn!("incomplete command envelope");
            command::unsupported_reply(&trace_id, &code)
        }
    };

    let encoded = serde_json::to_vec(&reply).unwrap_or_default();
    if let Err(err) = client
        .publish(data_topic.to_string(), QoS::AtLeastOnce, false, encoded)
        .await
    {
        tracing::error!(error = %err, "failed to publish command reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn broker_url_defaults_to_wss() {
        assert_eq!(
            broker_url("mqtt.redsafe-tw.com/mqtt"),
            "wss://mqtt.redsafe-tw.com/mqtt"
        );
        assert_eq!(broker_url("wss://broker/path"), "wss://broker/path");
        assert_eq!(broker_url("ws://broker"), "ws://broker");
    }
}
