//! Endpoint reachability monitor
//!
//! While a remote session is open, its endpoint is probed every 5 seconds
//! and each `{ip, latency_ms}` sample published as a session event. Probe
//! failures are logged and skipped; they never affect the session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use crate::backend::ShellBackend;

use super::types::{SessionConfig, SessionEvent};

/// Interval between endpoint probes
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the probe loop for a remote session. Exits when the liveness flag
/// drops or the event channel closes. Local sessions are never probed.
pub fn spawn_endpoint_monitor(
    backend: Arc<dyn ShellBackend>,
    config: SessionConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(PROBE_INTERVAL).await;

            if !alive.load(Ordering::Acquire) {
                break;
            }

            match backend.check_endpoint(&config.host, config.port).await {
                Ok(probe) => {
                    if !alive.load(Ordering::Acquire) {
                        break;
                    }
                    if events.send(SessionEvent::EndpointHealth(probe)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Endpoint probe for {} failed: {}", config.host, e);
                }
            }
        }
        debug!("Endpoint monitor for {} stopped", config.host);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::{EndpointProbe, TransportError};

    #[tokio::test(start_paused = true)]
    async fn test_probe_every_five_seconds() {
        let backend = Arc::new(MockBackend::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let handle = spawn_endpoint_monitor(
            backend.clone(),
            SessionConfig::remote("example.com", 22),
            tx,
            alive.clone(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(backend.probe_calls(), 2);

        let ev = rx.recv().await.unwrap();
        assert_eq!(
            ev,
            SessionEvent::EndpointHealth(EndpointProbe {
                ip: "127.0.0.1".to_string(),
                latency_ms: 12,
            })
        );

        alive.store(false, Ordering::Release);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_is_skipped() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(Err(TransportError::Probe("unreachable".to_string())));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let handle = spawn_endpoint_monitor(
            backend.clone(),
            SessionConfig::remote("example.com", 22),
            tx,
            alive.clone(),
        );

        tokio::time::sleep(Duration::from_secs(16)).await;
        // Loop keeps polling despite failures, publishing nothing
        assert!(backend.probe_calls() >= 3);
        assert!(rx.try_recv().is_err());

        alive.store(false, Ordering::Release);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.is_finished());
    }
}
