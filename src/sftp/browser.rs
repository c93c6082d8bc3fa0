//! SFTP directory browser
//!
//! Holds the current path and one listing snapshot, replaced wholesale on
//! every navigation/refresh. Mutating operations validate locally, call the
//! backend, and on success re-list the current directory; on failure they
//! surface an inline error without touching the displayed listing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::ShellBackend;

use super::drag::DragCounter;
use super::path_utils::{join_remote_path, parent_path};
use super::{parse_octal_mode, validate_entry_name, SftpEntry, SftpError};

/// Directory listings are time-boxed; a server that stops answering must
/// resolve as an error, not a hang.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SftpBrowser {
    session_id: String,
    backend: Arc<dyn ShellBackend>,
    cwd: RwLock<String>,
    entries: RwLock<Vec<SftpEntry>>,
    last_error: RwLock<Option<String>>,
    drag: DragCounter,
}

impl SftpBrowser {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn ShellBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            cwd: RwLock::new("/".to_string()),
            entries: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
            drag: DragCounter::new(),
        }
    }

    /// Current directory path.
    pub fn cwd(&self) -> String {
        self.cwd.read().clone()
    }

    /// Current listing snapshot.
    pub fn entries(&self) -> Vec<SftpEntry> {
        self.entries.read().clone()
    }

    /// Inline error from the last failed operation, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Drag state for the drop panel.
    pub fn drag(&self) -> &DragCounter {
        &self.drag
    }

    /// List a directory, bounded by [`LIST_TIMEOUT`]. On success the snapshot
    /// and current path are replaced; on timeout or backend failure the
    /// displayed listing is left untouched and an inline error is set.
    /// Never retried automatically.
    pub async fn list_entries(&self, path: &str) -> Result<(), SftpError> {
        debug!("Listing {} for session {}", path, self.session_id);

        let result = timeout(
            LIST_TIMEOUT,
            self.backend.list_sftp_dir(&self.session_id, path),
        )
        .await;

        match result {
            Ok(Ok(listing)) => {
                *self.entries.write() = listing;
                *self.cwd.write() = path.to_string();
                *self.last_error.write() = None;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Listing {} failed: {}", path, e);
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
            Err(_) => {
                let e = SftpError::ListTimeout(LIST_TIMEOUT.as_secs());
                warn!("Listing {} timed out", path);
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Re-list the current directory.
    pub async fn refresh(&self) -> Result<(), SftpError> {
        let cwd = self.cwd();
        self.list_entries(&cwd).await
    }

    /// Navigate into a listing entry. `..` pops one segment, directories
    /// append their name; plain files are ignored.
    pub async fn navigate(&self, entry: &SftpEntry) -> Result<(), SftpError> {
        let cwd = self.cwd();
        let next = if entry.name == ".." {
            parent_path(&cwd)
        } else if entry.is_dir {
            join_remote_path(&cwd, &entry.name)
        } else {
            return Ok(());
        };
        self.list_entries(&next).await
    }

    /// Rename an entry in the current directory.
    pub async fn rename(&self, entry: &SftpEntry, new_name: &str) -> Result<(), SftpError> {
        if let Err(e) = validate_entry_name(new_name) {
            *self.last_error.write() = Some(e.to_string());
            return Err(e);
        }

        let cwd = self.cwd();
        let from = join_remote_path(&cwd, &entry.name);
        let to = join_remote_path(&cwd, new_name);
        self.mutate(self.backend.rename_sftp_entry(&self.session_id, &from, &to))
            .await
    }

    /// chmod an entry. The mode string must be 3-4 octal digits.
    pub async fn chmod(&self, entry: &SftpEntry, mode: &str) -> Result<(), SftpError> {
        let parsed = match parse_octal_mode(mode) {
            Ok(m) => m,
            Err(e) => {
                *self.last_error.write() = Some(e.to_string());
                return Err(e);
            }
        };

        let path = join_remote_path(&self.cwd(), &entry.name);
        self.mutate(
            self.backend
                .chmod_sftp_entry(&self.session_id, &path, parsed),
        )
        .await
    }

    /// Create a directory under the current path.
    pub async fn mkdir(&self, name: &str) -> Result<(), SftpError> {
        if let Err(e) = validate_entry_name(name) {
            *self.last_error.write() = Some(e.to_string());
            return Err(e);
        }

        let path = join_remote_path(&self.cwd(), name);
        self.mutate(self.backend.mkdir_sftp_entry(&self.session_id, &path))
            .await
    }

    /// Delete an entry from the current directory.
    pub async fn delete(&self, entry: &SftpEntry) -> Result<(), SftpError> {
        let path = join_remote_path(&self.cwd(), &entry.name);
        self.mutate(
            self.backend
                .delete_sftp_entry(&self.session_id, &path, entry.is_dir),
        )
        .await
    }

    /// Run a mutating backend call; on success re-list the current directory,
    /// on failure record the inline error and leave the listing untouched.
    async fn mutate(
        &self,
        op: impl std::future::Future<Output = Result<(), SftpError>>,
    ) -> Result<(), SftpError> {
        match op.await {
            Ok(()) => {
                // Re-list failures surface through the browser's own inline
                // error; the mutation itself succeeded.
                let _ = self.refresh().await;
                Ok(())
            }
            Err(e) => {
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }
}
