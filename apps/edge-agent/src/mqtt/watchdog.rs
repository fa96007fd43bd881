use crate::onboard::OnboardClient;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const COMMAND_SILENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resets the command-silence timer. Cheap to clone; dropping every handle
/// stops the watchdog task.
#[derive(Clone)]
pub struct WatchdogHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl WatchdogHandle {
    pub fn reset(&self) {
        let _ = self.tx.send(());
    }
}

/// Arms a timer that re-runs the edge-online handshake after `timeout` of
/// heartbeat-ack silence. A failed handshake terminates the process; the
/// external supervisor restarts it.
pub fn spawn(
    onboard: OnboardClient,
    edge_id: String,
    version: String,
    timeout: Duration,
) -> (WatchdogHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(()) => continue,
                        None => break,
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(
                        timeout_s = timeout.as_secs(),
                        "command silence timeout; re-running online handshake"
                    );
                    match onboard.report_online(&edge_id, &version).await {
                        Ok(()) => tracing::info!("re-onboard succeeded"),
                        Err(err) => {
                            tracing::error!(error = %err, "re-onboard failed; terminating");
                            std::process::exit(1);
                        }
                    }
                }
            }
        }
    });
    (WatchdogHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resets_keep_the_timer_from_firing() {
        // Unroutable base URL: a fired watchdog would exit the process, so
        // the test passing at all demonstrates the resets worked.
        let onboard = OnboardClient::new("http://127.0.0.1:9").unwrap();
        let (handle, task) = spawn(
            onboard,
            "RED-0A1B2C3D".to_string(),
            "1.0.0".to_string(),
            Duration::from_secs(5),
        );

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.reset();
        }

        drop(handle);
        task.await.unwrap();
    }
}
