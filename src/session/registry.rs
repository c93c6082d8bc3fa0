//! Session registry
//!
//! Owns the id -> session map and the open/close lifecycle. A session bundles
//! the controller, transfer manager, SFTP browser and chat for one tab;
//! closing the tab flips the liveness flag (so in-flight results are
//! ignored), discards queued state and stops the background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{ChatError, ChatProvider, ChatSession, ChatStore, ProviderSettings};
use crate::backend::ShellBackend;
use crate::renderer::Renderer;
use crate::sftp::SftpBrowser;
use crate::transfer::TransferManager;

use super::controller::SessionController;
use super::log_buffer::SessionLog;
use super::monitor::spawn_endpoint_monitor;
use super::types::{SessionConfig, SessionEvent};

/// System prompt given to the chat provider for every session
const CHAT_SYSTEM_PROMPT: &str =
    "You are a terminal assistant embedded in an SSH client. \
     Answer concisely and prefer runnable shell commands.";

/// One open tab: the controller plus its per-session collaborators.
pub struct Session {
    pub id: String,
    pub controller: Arc<SessionController>,
    pub transfers: Arc<TransferManager>,
    pub browser: Arc<SftpBrowser>,
    pub chat: Arc<ChatSession>,
    pub log: Arc<SessionLog>,
    alive: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flip liveness and stop background tasks. Pending timers are dropped;
    /// in-flight backend calls finish on their own and their results are
    /// discarded behind the liveness flag.
    fn teardown(&self) {
        self.alive.store(false, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Id -> session map plus the shared collaborators sessions are built from.
pub struct SessionRegistry {
    backend: Arc<dyn ShellBackend>,
    chat_store: Arc<ChatStore>,
    chat_provider: Arc<dyn ChatProvider>,
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn ShellBackend>,
        chat_store: Arc<ChatStore>,
        chat_provider: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            backend,
            chat_store,
            chat_provider,
            sessions: DashMap::new(),
        }
    }

    /// Build a session for a new tab, register it, and start its background
    /// tasks (output pump; endpoint monitor for remote sessions).
    ///
    /// Returns the session and the receiving end of its event channel.
    pub fn open_session(
        &self,
        config: SessionConfig,
        renderer: Arc<dyn Renderer>,
        chat_defaults: ProviderSettings,
    ) -> Result<(Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>), ChatError> {
        let id = Uuid::new_v4().to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let log = Arc::new(SessionLog::new());

        let controller = SessionController::new(
            id.clone(),
            config.clone(),
            self.backend.clone(),
            renderer,
            events_tx.clone(),
            log.clone(),
            alive.clone(),
        );

        let chat = Arc::new(ChatSession::open(
            id.clone(),
            self.chat_store.clone(),
            self.chat_provider.clone(),
            chat_defaults,
            CHAT_SYSTEM_PROMPT,
        )?);

        let mut tasks = vec![controller.spawn_output_pump()];
        if !config.is_local {
            tasks.push(spawn_endpoint_monitor(
                self.backend.clone(),
                config.clone(),
                events_tx,
                alive.clone(),
            ));
        }

        let session = Arc::new(Session {
            transfers: Arc::new(TransferManager::new(id.clone(), self.backend.clone())),
            browser: Arc::new(SftpBrowser::new(id.clone(), self.backend.clone())),
            chat,
            controller,
            log,
            alive,
            tasks: Mutex::new(tasks),
            id: id.clone(),
        });

        self.sessions.insert(id.clone(), session.clone());
        info!("Opened session {} ({})", id, config.display_name());
        Ok((session, events_rx))
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close a tab: tear the session down and drop it from the map.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            warn!("Close for unknown session {}", session_id);
            return false;
        };

        session.teardown();
        session.controller.shutdown().await;
        info!("Closed session {}", session_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::renderer::RendererOption;
    use tempfile::tempdir;

    struct NoopRenderer;

    impl Renderer for NoopRenderer {
        fn apply_output(&self, _data: &[u8]) {}
        fn set_option(&self, _option: RendererOption) {}
        fn schedule_refit(&self) {}
        fn focus(&self) {}
    }

    struct NoopProvider;

    #[async_trait::async_trait]
    impl ChatProvider for NoopProvider {
        async fn send_chat(
            &self,
            _settings: &ProviderSettings,
            _messages: &[crate::ai::ChatMessage],
        ) -> Result<String, ChatError> {
            Ok("ok".to_string())
        }
    }

    fn registry(backend: Arc<MockBackend>) -> (SessionRegistry, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(ChatStore::new(dir.path().join("chat.redb")).unwrap());
        (
            SessionRegistry::new(backend, store, Arc::new(NoopProvider)),
            dir,
        )
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let backend = Arc::new(MockBackend::new());
        let (registry, _dir) = registry(backend.clone());

        let (session, _events) = registry
            .open_session(
                SessionConfig::remote("example.com", 22),
                Arc::new(NoopRenderer),
                ProviderSettings::default(),
            )
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(session.is_alive());

        session.controller.connect().await.unwrap();
        assert!(registry.close_session(&session.id).await);
        assert!(!session.is_alive());
        assert!(registry.is_empty());
        // Teardown disconnected the backend session
        assert!(backend.disconnect_calls() >= 2);

        assert!(!registry.close_session("missing").await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let backend = Arc::new(MockBackend::new());
        let (registry, _dir) = registry(backend);

        let (a, _) = registry
            .open_session(
                SessionConfig::remote("a.example.com", 22),
                Arc::new(NoopRenderer),
                ProviderSettings::default(),
            )
            .unwrap();
        let (b, _) = registry
            .open_session(
                SessionConfig::local(),
                Arc::new(NoopRenderer),
                ProviderSettings::default(),
            )
            .unwrap();

        assert_ne!(a.id, b.id);
        a.chat.send_message("hello").await.unwrap();
        assert_eq!(a.chat.messages().len(), 2);
        assert!(b.chat.messages().is_empty());
    }
}
