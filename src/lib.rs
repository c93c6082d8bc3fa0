//! Ferroterm Core - session orchestration for a modern SSH terminal client
//!
//! This crate is the layer between the UI chrome and the transport: it owns
//! connection lifecycle, serialized input delivery with retry, file-transfer
//! tracking, SFTP browsing, the per-session AI chat side-channel, and live
//! display settings. The transport, renderer and AI provider plug in behind
//! traits ([`backend::ShellBackend`], [`renderer::Renderer`],
//! [`ai::ChatProvider`]).

pub mod ai;
pub mod backend;
pub mod renderer;
pub mod session;
pub mod settings;
pub mod sftp;
pub mod transfer;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use ai::{ChatMessage, ChatProvider, ChatRole, ChatSession, ChatStore, ProviderSettings};
pub use backend::{EndpointProbe, ShellBackend, TerminalOutput, TransportError};
pub use renderer::{Renderer, RendererOption};
pub use session::{
    ConnectionStatus, Session, SessionConfig, SessionController, SessionEvent, SessionRegistry,
};
pub use settings::{SettingChange, SettingKey, SettingsStore};
pub use sftp::{SftpBrowser, SftpEntry, SftpError};
pub use transfer::{TransferDirection, TransferManager, TransferStatus, TransferTask};

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
