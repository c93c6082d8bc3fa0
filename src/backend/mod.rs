//! Shell backend boundary
//!
//! The core never talks to the SSH/SFTP/PTY transport directly. Everything
//! goes through [`ShellBackend`]: request/response calls plus one broadcast
//! stream of terminal output shared by all sessions (each session filters by
//! its own id).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::sftp::{SftpEntry, SftpError};

#[cfg(test)]
pub(crate) mod mock;

/// Transport-level errors (connect/write/resize/probe)
///
/// Write timeouts get their own variant so the UI can word them differently,
/// but they follow the same reconnect path as any other write failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Write timed out after {0}ms")]
    WriteTimeout(u64),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Endpoint probe failed: {0}")]
    Probe(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),
}

/// One chunk of terminal output pushed by the backend.
///
/// Delivered to every subscriber; sessions filter on `session_id`.
#[derive(Debug, Clone)]
pub struct TerminalOutput {
    pub session_id: String,
    pub data: Vec<u8>,
}

/// Result of a reachability probe against the session endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointProbe {
    /// Resolved IP address
    pub ip: String,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Transport surface consumed by the session core.
///
/// Implementations wrap the actual SSH/SFTP client or a local PTY; the core
/// only assumes the calls can fail and can take arbitrarily long (it applies
/// its own timeouts on writes and directory listings).
#[async_trait]
pub trait ShellBackend: Send + Sync + 'static {
    /// Open (or re-open) the shell channel for a session.
    async fn open_shell(&self, session_id: &str) -> Result<(), TransportError>;

    /// Tear down any backend state for a session. Best-effort.
    async fn disconnect(&self, session_id: &str) -> Result<(), TransportError>;

    /// Whether the backend believes the transport is still up.
    async fn is_connected(&self, session_id: &str) -> bool;

    /// Deliver input bytes to the shell.
    async fn write_to_shell(&self, session_id: &str, data: &[u8]) -> Result<(), TransportError>;

    /// Resize the PTY. Also used as the cheapest full-channel probe.
    async fn resize_pty(&self, session_id: &str, cols: u16, rows: u16)
        -> Result<(), TransportError>;

    /// List a remote directory. The core bounds this with its own timeout.
    async fn list_sftp_dir(&self, session_id: &str, path: &str)
        -> Result<Vec<SftpEntry>, SftpError>;

    async fn rename_sftp_entry(
        &self,
        session_id: &str,
        from: &str,
        to: &str,
    ) -> Result<(), SftpError>;

    async fn chmod_sftp_entry(
        &self,
        session_id: &str,
        path: &str,
        mode: u32,
    ) -> Result<(), SftpError>;

    async fn delete_sftp_entry(
        &self,
        session_id: &str,
        path: &str,
        is_dir: bool,
    ) -> Result<(), SftpError>;

    async fn mkdir_sftp_entry(&self, session_id: &str, path: &str) -> Result<(), SftpError>;

    async fn upload_file(
        &self,
        session_id: &str,
        local_path: &str,
        remote_path: &str,
    ) -> Result<(), SftpError>;

    async fn download_file(
        &self,
        session_id: &str,
        remote_path: &str,
        local_path: &str,
    ) -> Result<(), SftpError>;

    /// Probe endpoint reachability (resolved IP + latency).
    async fn check_endpoint(&self, host: &str, port: u16) -> Result<EndpointProbe, TransportError>;

    /// Subscribe to the shared terminal output stream.
    fn subscribe_output(&self) -> broadcast::Receiver<TerminalOutput>;
}
