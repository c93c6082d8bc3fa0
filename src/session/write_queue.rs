//! Write queue: serialized input delivery
//!
//! User keystrokes are queued as byte payloads and drained by a single flush
//! loop. The loop coalesces everything currently queued into one delivery
//! call per iteration, bounded by a per-call timeout. On timeout or delivery
//! error the un-delivered coalesced chunk goes back to the front of the queue
//! and the loop stops; data is never silently dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::{ShellBackend, TransportError};

/// Per-delivery timeout. A write that takes longer is treated as failed and
/// its payload requeued.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(4000);

/// Outcome of a [`WriteQueue::flush`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Queue drained to empty
    Drained,
    /// Another flush loop is already running; this call was a no-op
    AlreadyRunning,
    /// Writes are blocked (mid-reconnect); this call was a no-op
    Blocked,
}

/// Per-session FIFO of pending input payloads with a single-writer flush loop.
pub struct WriteQueue {
    session_id: String,
    backend: Arc<dyn ShellBackend>,
    pending: Mutex<VecDeque<Bytes>>,
    flushing: AtomicBool,
    blocked: AtomicBool,
    write_timeout: Duration,
}

/// Clears the flushing flag on every exit path of the flush loop.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WriteQueue {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn ShellBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            pending: Mutex::new(VecDeque::new()),
            flushing: AtomicBool::new(false),
            blocked: AtomicBool::new(false),
            write_timeout: WRITE_TIMEOUT,
        }
    }

    /// Append a payload. Delivery order equals insertion order.
    pub fn enqueue(&self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.pending.lock().push_back(data);
    }

    /// Total bytes currently queued and undelivered.
    pub fn queued_bytes(&self) -> usize {
        self.pending.lock().iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Block the write path while a reconnect flow is in flight.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::Release);
    }

    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    /// Discard all pending payloads (session teardown).
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Pop everything currently queued as one coalesced payload.
    fn coalesce(&self) -> Option<Bytes> {
        let mut pending = self.pending.lock();
        match pending.len() {
            0 => None,
            1 => pending.pop_front(),
            _ => {
                let total: usize = pending.iter().map(|b| b.len()).sum();
                let mut buf = BytesMut::with_capacity(total);
                while let Some(chunk) = pending.pop_front() {
                    buf.extend_from_slice(&chunk);
                }
                Some(buf.freeze())
            }
        }
    }

    /// Drain the queue. Idempotent and re-entrant-safe: a no-op when a flush
    /// is already running or writes are blocked.
    ///
    /// `Err` means one delivery failed or timed out; the un-delivered chunk
    /// has been pushed back to the front and the loop stopped. The caller
    /// (the session controller) decides whether to start a reconnect.
    pub async fn flush(&self) -> Result<FlushStatus, TransportError> {
        if self.is_blocked() {
            return Ok(FlushStatus::Blocked);
        }
        if self.flushing.swap(true, Ordering::AcqRel) {
            return Ok(FlushStatus::AlreadyRunning);
        }
        let _guard = FlushGuard(&self.flushing);

        loop {
            if self.is_blocked() {
                return Ok(FlushStatus::Blocked);
            }

            let Some(chunk) = self.coalesce() else {
                return Ok(FlushStatus::Drained);
            };

            let delivery = timeout(
                self.write_timeout,
                self.backend.write_to_shell(&self.session_id, &chunk),
            )
            .await;

            match delivery {
                Ok(Ok(())) => {
                    debug!(
                        "Session {}: delivered {} bytes",
                        self.session_id,
                        chunk.len()
                    );
                }
                Ok(Err(e)) => {
                    warn!("Session {}: write failed: {}", self.session_id, e);
                    self.pending.lock().push_front(chunk);
                    return Err(e);
                }
                Err(_) => {
                    let ms = self.write_timeout.as_millis() as u64;
                    warn!("Session {}: write timed out after {}ms", self.session_id, ms);
                    self.pending.lock().push_front(chunk);
                    return Err(TransportError::WriteTimeout(ms));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn queue_with(backend: Arc<MockBackend>) -> WriteQueue {
        WriteQueue::new("sess-1", backend)
    }

    #[tokio::test]
    async fn test_flush_drains_in_order() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend.clone());

        queue.enqueue(Bytes::from_static(b"ls"));
        queue.enqueue(Bytes::from_static(b" -la\n"));

        let status = queue.flush().await.unwrap();
        assert_eq!(status, FlushStatus::Drained);
        assert!(queue.is_empty());

        // Both chunks were queued before the flush started, so they coalesce
        // into a single delivery preserving enqueue order.
        assert_eq!(backend.written(), vec![b"ls -la\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_flush_is_noop_when_blocked() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend);

        queue.enqueue(Bytes::from_static(b"x"));
        queue.block();

        let status = queue.flush().await.unwrap();
        assert_eq!(status, FlushStatus::Blocked);
        assert_eq!(queue.queued_bytes(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_requeues_full_payload() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend.clone());

        backend.set_fail_writes(true);
        queue.enqueue(Bytes::from_static(b"echo "));
        queue.enqueue(Bytes::from_static(b"hi\n"));

        let err = queue.flush().await.unwrap_err();
        assert!(matches!(err, TransportError::Write(_)));
        assert_eq!(queue.queued_bytes(), 8);

        // After the backend recovers, the requeued payload delivers intact.
        backend.set_fail_writes(false);
        queue.flush().await.unwrap();
        assert_eq!(backend.written(), vec![b"echo hi\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout_requeues() {
        let backend = Arc::new(MockBackend::new());
        let queue = queue_with(backend.clone());

        backend.set_hang_writes(true);
        queue.enqueue(Bytes::from_static(b"stuck"));

        let err = queue.flush().await.unwrap_err();
        assert!(matches!(err, TransportError::WriteTimeout(4000)));
        assert_eq!(queue.queued_bytes(), 5);
    }

    #[tokio::test]
    async fn test_single_flush_loop_at_a_time() {
        let backend = Arc::new(MockBackend::new());
        let queue = Arc::new(queue_with(backend.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(Bytes::from(format!("chunk-{};", i)));
                queue.flush().await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Stragglers enqueued after the winning loop's last coalesce
        let _ = queue.flush().await.unwrap();

        assert!(queue.is_empty());
        assert_eq!(backend.max_writes_in_flight(), 1);

        let delivered: Vec<u8> = backend.written().concat();
        assert_eq!(delivered.iter().filter(|&&b| b == b';').count(), 16);
    }
}
