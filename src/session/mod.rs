//! Session lifecycle management
//!
//! One session per open tab: connection state machine, serialized input
//! delivery, bounded diagnostic log, endpoint monitoring, and the registry
//! that owns them all.

pub mod controller;
pub mod log_buffer;
pub mod monitor;
pub mod registry;
pub mod types;
pub mod write_queue;

pub use controller::{SessionController, MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY};
pub use log_buffer::{LogLine, SessionLog, MAX_LOG_LINES};
pub use monitor::{spawn_endpoint_monitor, PROBE_INTERVAL};
pub use registry::{Session, SessionRegistry};
pub use types::{ConnectionStatus, SessionConfig, SessionEvent};
pub use write_queue::{FlushStatus, WriteQueue, WRITE_TIMEOUT};
