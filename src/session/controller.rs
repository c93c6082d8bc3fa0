//! Session controller
//!
//! Owns the connection state machine for one session, drives connect and
//! reconnect, wires backend output to the renderer, and owns the write
//! queue. All state transitions happen in the session's own tasks; the only
//! suspension points are backend calls and timers. Post-await updates are
//! gated on the session liveness flag so a closed tab never resurrects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backend::{ShellBackend, TransportError};
use crate::renderer::Renderer;

use super::log_buffer::SessionLog;
use super::types::{ConnectionStatus, SessionConfig, SessionEvent};
use super::write_queue::WriteQueue;

/// Maximum reconnect attempts per triggered write failure
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Linear backoff base: attempt *n* waits `base * n` after the previous
/// failure (300ms, 600ms, 900ms).
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(300);

/// Clears the reconnecting flag on every exit path of the reconnect flow.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionController {
    session_id: String,
    config: SessionConfig,
    backend: Arc<dyn ShellBackend>,
    renderer: Arc<dyn Renderer>,
    status: Mutex<ConnectionStatus>,
    write_queue: WriteQueue,
    reconnecting: AtomicBool,
    alive: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    log: Arc<SessionLog>,
    term_size: Mutex<(u16, u16)>,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        config: SessionConfig,
        backend: Arc<dyn ShellBackend>,
        renderer: Arc<dyn Renderer>,
        events: mpsc::UnboundedSender<SessionEvent>,
        log: Arc<SessionLog>,
        alive: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let session_id = session_id.into();
        let cols = config.cols;
        let rows = config.rows;
        Arc::new(Self {
            write_queue: WriteQueue::new(session_id.clone(), backend.clone()),
            session_id,
            config,
            backend,
            renderer,
            status: Mutex::new(ConnectionStatus::Idle),
            reconnecting: AtomicBool::new(false),
            alive,
            events,
            log,
            term_size: Mutex::new((cols, rows)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.lock().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Bytes enqueued but not yet delivered.
    pub fn queued_bytes(&self) -> usize {
        self.write_queue.queued_bytes()
    }

    /// The single transition point: updates status and makes it observable.
    fn set_status(&self, next: ConnectionStatus) {
        {
            let mut status = self.status.lock();
            if *status == next {
                return;
            }
            debug!(
                "Session {}: {:?} -> {:?}",
                self.session_id, *status, next
            );
            *status = next.clone();
        }
        let _ = self.events.send(SessionEvent::StatusChanged(next));
    }

    /// Establish (or re-establish) the connection.
    ///
    /// Idle/Error -> Connecting -> {Connected, Error}. Calling while already
    /// Connecting is a no-op; stale backend state is dropped best-effort
    /// before the new connection is requested.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if matches!(self.status(), ConnectionStatus::Connecting) {
            debug!("Session {}: connect while connecting, ignored", self.session_id);
            return Ok(());
        }

        self.set_status(ConnectionStatus::Connecting);
        self.log.push(format!("Connecting to {}", self.config.display_name()));

        // Drop whatever half-open state the backend may still hold.
        let _ = self.backend.disconnect(&self.session_id).await;

        match self.backend.open_shell(&self.session_id).await {
            Ok(()) => {
                if !self.is_alive() {
                    return Ok(());
                }
                self.set_status(ConnectionStatus::Connected);
                self.log.push("Connected");
                info!("Session {}: connected", self.session_id);
                Ok(())
            }
            Err(e) => {
                if self.is_alive() {
                    self.set_status(ConnectionStatus::Error(e.to_string()));
                    self.log.push(format!("Connect failed: {}", e));
                }
                warn!("Session {}: connect failed: {}", self.session_id, e);
                Err(e)
            }
        }
    }

    /// Light recovery path after the application unlocks from an idle lock.
    ///
    /// If the backend reports the transport still connected, the session is
    /// re-attached directly and the renderer told to resume exactly once;
    /// otherwise this falls back to a full [`connect`](Self::connect).
    pub async fn recover_after_unlock(&self) -> Result<(), TransportError> {
        if self.backend.is_connected(&self.session_id).await {
            if !self.is_alive() {
                return Ok(());
            }
            self.set_status(ConnectionStatus::Connected);
            self.log.push("Resumed after unlock");
            let _ = self.events.send(SessionEvent::Resumed);
            self.renderer.focus();
            info!("Session {}: resumed after unlock", self.session_id);
            Ok(())
        } else {
            debug!(
                "Session {}: transport gone after unlock, full reconnect",
                self.session_id
            );
            self.connect().await
        }
    }

    /// Enqueue input and drive delivery. On write failure the reconnect
    /// policy takes over (remote sessions only).
    pub async fn send_input(&self, data: &[u8]) -> Result<(), TransportError> {
        self.write_queue.enqueue(Bytes::copy_from_slice(data));

        match self.write_queue.flush().await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.log.push(format!("Write failed: {}", e));
                if self.config.is_local {
                    // Local PTYs have nothing to reconnect; surface the error.
                    self.set_status(ConnectionStatus::Error(e.to_string()));
                    return Err(e);
                }
                self.reconnect().await
            }
        }
    }

    /// Resize the PTY and remember the size for reconnect probing.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), TransportError> {
        *self.term_size.lock() = (cols, rows);
        self.backend.resize_pty(&self.session_id, cols, rows).await
    }

    /// Bounded-retry reconnect flow.
    ///
    /// Blocks the write path, then tries up to [`MAX_RECONNECT_ATTEMPTS`]
    /// times with linear backoff. Concurrent calls coalesce into the one
    /// outstanding flow. On success the queued input is re-delivered; on
    /// exhaustion the session lands in `Error`, the write path is unblocked
    /// so a future manual write can re-trigger retry, and the queued byte
    /// count is surfaced to the user.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            debug!(
                "Session {}: reconnect already in flight, coalesced",
                self.session_id
            );
            return Ok(());
        }
        let _guard = ReconnectGuard(&self.reconnecting);

        self.write_queue.block();
        self.set_status(ConnectionStatus::Connecting);

        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            sleep(RECONNECT_BASE_DELAY * attempt).await;

            if !self.is_alive() {
                self.write_queue.unblock();
                return Ok(());
            }

            info!(
                "Session {}: reconnect attempt {}/{}",
                self.session_id, attempt, MAX_RECONNECT_ATTEMPTS
            );
            self.log.push(format!(
                "Reconnect attempt {}/{}",
                attempt, MAX_RECONNECT_ATTEMPTS
            ));

            match self.try_reestablish().await {
                Ok(()) => {
                    if !self.is_alive() {
                        self.write_queue.unblock();
                        return Ok(());
                    }
                    self.write_queue.unblock();
                    self.set_status(ConnectionStatus::Connected);
                    self.log.push(format!("Reconnected on attempt {}", attempt));
                    let _ = self.events.send(SessionEvent::ReconnectSucceeded);
                    self.renderer.focus();

                    // Re-deliver what queued up during the outage. A failure
                    // here leaves the data queued for the next manual write.
                    if let Err(e) = self.write_queue.flush().await {
                        warn!(
                            "Session {}: flush after reconnect failed: {}",
                            self.session_id, e
                        );
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Session {}: reconnect attempt {} failed: {}",
                        self.session_id, attempt, e
                    );
                    last_err = Some(e);
                }
            }
        }

        // Budget exhausted. Unblock so future manual writes re-trigger retry,
        // and tell the user how much input is still queued.
        self.write_queue.unblock();
        let err =
            last_err.unwrap_or_else(|| TransportError::Connect("reconnect failed".to_string()));
        if self.is_alive() {
            self.set_status(ConnectionStatus::Error(err.to_string()));
            self.log.push(format!(
                "Reconnect failed after {} attempts",
                MAX_RECONNECT_ATTEMPTS
            ));
            let queued = self.write_queue.queued_bytes();
            if queued > 0 {
                let _ = self
                    .events
                    .send(SessionEvent::UndeliveredInput { bytes: queued });
            }
        }
        Err(err)
    }

    /// One reconnect attempt. When the backend still reports the transport
    /// connected, probe the shell channel (PTY resize round-trip) before
    /// declaring success; otherwise tear down and open fresh.
    async fn try_reestablish(&self) -> Result<(), TransportError> {
        if self.backend.is_connected(&self.session_id).await {
            let (cols, rows) = *self.term_size.lock();
            self.backend.resize_pty(&self.session_id, cols, rows).await
        } else {
            let _ = self.backend.disconnect(&self.session_id).await;
            self.backend.open_shell(&self.session_id).await
        }
    }

    /// Pump backend output to the renderer, in arrival order, filtered by
    /// session id. Exits when the session dies or the stream closes.
    pub fn spawn_output_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut rx = controller.backend.subscribe_output();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(output) => {
                        if !controller.is_alive() {
                            break;
                        }
                        if output.session_id != controller.session_id {
                            continue;
                        }
                        controller.renderer.apply_output(&output.data);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Session {}: output stream lagged, {} events dropped",
                            controller.session_id, skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Session {}: output pump stopped", controller.session_id);
        })
    }

    /// Teardown: discard queued input. The registry flips the liveness flag
    /// before calling this, so in-flight results are already ignored.
    pub async fn shutdown(&self) {
        self.write_queue.clear();
        let _ = self.backend.disconnect(&self.session_id).await;
        self.set_status(ConnectionStatus::Idle);
    }
}
