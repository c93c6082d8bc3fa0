//! Scriptable in-memory backend for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::sftp::{SftpEntry, SftpError};

use super::{EndpointProbe, ShellBackend, TerminalOutput, TransportError};

pub(crate) struct MockBackend {
    output_tx: broadcast::Sender<TerminalOutput>,

    // Shell channel behavior
    connected: AtomicBool,
    open_results: Mutex<VecDeque<Result<(), TransportError>>>,
    open_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fail_writes: AtomicBool,
    hang_writes: AtomicBool,
    write_log: Mutex<Vec<Vec<u8>>>,
    writes_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
    fail_resize: AtomicBool,
    resize_calls: AtomicUsize,

    // SFTP behavior
    entries: Mutex<Vec<SftpEntry>>,
    list_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    sftp_fail: Mutex<Option<String>>,
    sftp_ops: Mutex<Vec<String>>,
    upload_fail_paths: Mutex<HashSet<String>>,

    // Probe behavior
    probe: Mutex<Result<EndpointProbe, TransportError>>,
    probe_calls: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        let (output_tx, _) = broadcast::channel(64);
        Self {
            output_tx,
            connected: AtomicBool::new(false),
            open_results: Mutex::new(VecDeque::new()),
            open_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            hang_writes: AtomicBool::new(false),
            write_log: Mutex::new(Vec::new()),
            writes_in_flight: AtomicUsize::new(0),
            max_writes_in_flight: AtomicUsize::new(0),
            fail_resize: AtomicBool::new(false),
            resize_calls: AtomicUsize::new(0),
            entries: Mutex::new(Vec::new()),
            list_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            sftp_fail: Mutex::new(None),
            sftp_ops: Mutex::new(Vec::new()),
            upload_fail_paths: Mutex::new(HashSet::new()),
            probe: Mutex::new(Ok(EndpointProbe {
                ip: "127.0.0.1".to_string(),
                latency_ms: 12,
            })),
            probe_calls: AtomicUsize::new(0),
        }
    }

    // ── Scripting knobs ────────────────────────────────────────────────

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Queue the results of upcoming `open_shell` calls; once drained,
    /// further calls succeed.
    pub(crate) fn script_open(&self, results: Vec<Result<(), TransportError>>) {
        *self.open_results.lock() = results.into();
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_hang_writes(&self, hang: bool) {
        self.hang_writes.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_resize(&self, fail: bool) {
        self.fail_resize.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_entries(&self, entries: Vec<SftpEntry>) {
        *self.entries.lock() = entries;
    }

    pub(crate) fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    pub(crate) fn fail_sftp_ops(&self, message: &str) {
        *self.sftp_fail.lock() = Some(message.to_string());
    }

    pub(crate) fn fail_upload_for(&self, local_path: &str) {
        self.upload_fail_paths.lock().insert(local_path.to_string());
    }

    pub(crate) fn set_probe(&self, probe: Result<EndpointProbe, TransportError>) {
        *self.probe.lock() = probe;
    }

    pub(crate) fn push_output(&self, session_id: &str, data: &[u8]) {
        let _ = self.output_tx.send(TerminalOutput {
            session_id: session_id.to_string(),
            data: data.to_vec(),
        });
    }

    // ── Observations ───────────────────────────────────────────────────

    pub(crate) fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn resize_calls(&self) -> usize {
        self.resize_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn written(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().clone()
    }

    /// Highest number of `write_to_shell` calls ever in flight at once.
    pub(crate) fn max_writes_in_flight(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sftp_calls(&self) -> usize {
        self.sftp_ops.lock().len()
    }

    pub(crate) fn last_sftp_op(&self) -> Option<String> {
        self.sftp_ops.lock().last().cloned()
    }

    pub(crate) fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    fn sftp_gate(&self) -> Result<(), SftpError> {
        match self.sftp_fail.lock().clone() {
            Some(msg) => Err(SftpError::Backend(msg)),
            None => Ok(()),
        }
    }

    fn record_op(&self, op: String) {
        self.sftp_ops.lock().push(op);
    }
}

#[async_trait]
impl ShellBackend for MockBackend {
    async fn open_shell(&self, _session_id: &str) -> Result<(), TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.open_results.lock().pop_front();
        match scripted {
            Some(result) => {
                if result.is_ok() {
                    self.connected.store(true, Ordering::SeqCst);
                }
                result
            }
            None => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn disconnect(&self, _session_id: &str) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self, _session_id: &str) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write_to_shell(&self, _session_id: &str, data: &[u8]) -> Result<(), TransportError> {
        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        // Yield so overlapping callers would be observable as concurrency.
        tokio::task::yield_now().await;

        let result = if self.hang_writes.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        } else if self.fail_writes.load(Ordering::SeqCst) {
            Err(TransportError::Write("broken pipe".to_string()))
        } else {
            self.write_log.lock().push(data.to_vec());
            Ok(())
        };

        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn resize_pty(
        &self,
        _session_id: &str,
        _cols: u16,
        _rows: u16,
    ) -> Result<(), TransportError> {
        self.resize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resize.load(Ordering::SeqCst) {
            Err(TransportError::Resize("channel closed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn list_sftp_dir(
        &self,
        _session_id: &str,
        _path: &str,
    ) -> Result<Vec<SftpEntry>, SftpError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sftp_gate()?;
        Ok(self.entries.lock().clone())
    }

    async fn rename_sftp_entry(
        &self,
        _session_id: &str,
        from: &str,
        to: &str,
    ) -> Result<(), SftpError> {
        self.sftp_gate()?;
        self.record_op(format!("rename {} -> {}", from, to));
        Ok(())
    }

    async fn chmod_sftp_entry(
        &self,
        _session_id: &str,
        path: &str,
        mode: u32,
    ) -> Result<(), SftpError> {
        self.sftp_gate()?;
        self.record_op(format!("chmod {:o} {}", mode, path));
        Ok(())
    }

    async fn delete_sftp_entry(
        &self,
        _session_id: &str,
        path: &str,
        is_dir: bool,
    ) -> Result<(), SftpError> {
        self.sftp_gate()?;
        self.record_op(format!("delete {} (dir: {})", path, is_dir));
        Ok(())
    }

    async fn mkdir_sftp_entry(&self, _session_id: &str, path: &str) -> Result<(), SftpError> {
        self.sftp_gate()?;
        self.record_op(format!("mkdir {}", path));
        Ok(())
    }

    async fn upload_file(
        &self,
        _session_id: &str,
        local_path: &str,
        remote_path: &str,
    ) -> Result<(), SftpError> {
        self.sftp_gate()?;
        if self.upload_fail_paths.lock().contains(local_path) {
            return Err(SftpError::Backend(format!("upload failed: {}", local_path)));
        }
        self.record_op(format!("upload {} -> {}", local_path, remote_path));
        Ok(())
    }

    async fn download_file(
        &self,
        _session_id: &str,
        remote_path: &str,
        local_path: &str,
    ) -> Result<(), SftpError> {
        self.sftp_gate()?;
        self.record_op(format!("download {} -> {}", remote_path, local_path));
        Ok(())
    }

    async fn check_endpoint(
        &self,
        _host: &str,
        _port: u16,
    ) -> Result<EndpointProbe, TransportError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.lock().clone()
    }

    fn subscribe_output(&self) -> broadcast::Receiver<TerminalOutput> {
        self.output_tx.subscribe()
    }
}
