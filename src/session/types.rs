//! Session types and data structures

use serde::{Deserialize, Serialize};

use crate::backend::EndpointProbe;

/// Configuration for one terminal session (remote or local)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target hostname or IP ("localhost" for local shells)
    pub host: String,
    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local PTY session (no reconnect policy, no endpoint probing)
    #[serde(default)]
    pub is_local: bool,
    /// Display name (auto-generated if not provided)
    #[serde(default)]
    pub name: Option<String>,
    /// Initial terminal columns
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Initial terminal rows
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_port() -> u16 {
    22
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

impl SessionConfig {
    /// Config for a remote session
    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            is_local: false,
            name: None,
            cols: 80,
            rows: 24,
        }
    }

    /// Config for a local shell session
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
            is_local: true,
            name: None,
            cols: 80,
            rows: 24,
        }
    }

    /// Get display name (or generate from endpoint)
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            if self.is_local {
                "Local Shell".to_string()
            } else {
                format!("{}:{}", self.host, self.port)
            }
        })
    }
}

/// Connection lifecycle state.
///
/// Exactly one value per session at any time; [`SessionController`] state
/// transitions are the only writers.
///
/// [`SessionController`]: super::controller::SessionController
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Typed per-session events consumed by the UI layer.
///
/// One mpsc channel per session replaces ambient publish/subscribe: every
/// session-critical transition is delivered here and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection status changed (the only way status becomes observable)
    StatusChanged(ConnectionStatus),
    /// Unlock recovery re-attached the live transport; refocus the terminal
    Resumed,
    /// A write-failure reconnect flow finished successfully
    ReconnectSucceeded,
    /// Reconnect budget exhausted with input still queued
    UndeliveredInput { bytes: usize },
    /// Periodic endpoint reachability sample
    EndpointHealth(EndpointProbe),
}
