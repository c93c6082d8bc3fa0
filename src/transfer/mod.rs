//! Transfer task tracking
//!
//! Uploads and downloads run in the background; this module tracks their
//! lifecycle in a bounded history list. Tasks are created `running`, mutated
//! once on completion/failure, and immutable afterward except for manual
//! history clearing (which removes only finished tasks).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::ShellBackend;
use crate::sftp::path_utils::join_remote_path;
use crate::sftp::SftpBrowser;

/// Maximum tasks kept in the history (oldest dropped first)
pub const MAX_TRANSFER_TASKS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Running,
    Success,
    Failed,
}

/// One tracked transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub id: String,
    pub direction: TransferDirection,
    /// Display name (file name, not full path)
    pub name: String,
    pub source_path: String,
    pub target_path: String,
    pub status: TransferStatus,
    /// 0-100, monotonic non-decreasing until terminal status
    pub progress: u8,
    /// Error detail for failed tasks
    #[serde(default)]
    pub detail: Option<String>,
    /// Unix timestamp (ms)
    pub started_at: i64,
    #[serde(default)]
    pub finished_at: Option<i64>,
}

/// Partial update applied by id; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TransferStatus>,
    pub progress: Option<u8>,
    pub detail: Option<String>,
    pub finished_at: Option<i64>,
}

impl TaskPatch {
    fn finished(status: TransferStatus, detail: Option<String>) -> Self {
        Self {
            status: Some(status),
            progress: match status {
                TransferStatus::Success => Some(100),
                _ => None,
            },
            detail,
            finished_at: Some(Utc::now().timestamp_millis()),
        }
    }
}

/// A file dropped on or picked for the upload panel
#[derive(Debug, Clone)]
pub struct DroppedFile {
    pub name: String,
    pub path: String,
}

/// Per-session transfer tracker.
///
/// The task list is owned exclusively by this manager; all mutation goes
/// through [`create_task`](Self::create_task) /
/// [`update_task`](Self::update_task).
pub struct TransferManager {
    session_id: String,
    backend: Arc<dyn ShellBackend>,
    tasks: RwLock<VecDeque<TransferTask>>,
}

impl TransferManager {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn ShellBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            tasks: RwLock::new(VecDeque::new()),
        }
    }

    /// Track a new `running` task at the head of the list, trimmed to
    /// [`MAX_TRANSFER_TASKS`]. Returns the task id.
    pub fn create_task(
        &self,
        direction: TransferDirection,
        name: impl Into<String>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> String {
        let task = TransferTask {
            id: Uuid::new_v4().to_string(),
            direction,
            name: name.into(),
            source_path: source_path.into(),
            target_path: target_path.into(),
            status: TransferStatus::Running,
            progress: 0,
            detail: None,
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
        };
        let id = task.id.clone();

        let mut tasks = self.tasks.write();
        tasks.push_front(task);
        tasks.truncate(MAX_TRANSFER_TASKS);
        id
    }

    /// Apply a partial update by id. Unknown ids are no-ops; progress
    /// decreases are ignored (monotonicity invariant); tasks that already
    /// reached a terminal status are never touched again.
    pub fn update_task(&self, id: &str, patch: TaskPatch) {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            warn!("Transfer update for unknown task {}", id);
            return;
        };

        // Terminal tasks are immutable
        if task.status != TransferStatus::Running {
            return;
        }

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(progress) = patch.progress {
            if progress > task.progress {
                task.progress = progress.min(100);
            }
        }
        if let Some(detail) = patch.detail {
            task.detail = Some(detail);
        }
        if let Some(finished_at) = patch.finished_at {
            task.finished_at = Some(finished_at);
        }
    }

    /// Snapshot, newest first.
    pub fn tasks(&self) -> Vec<TransferTask> {
        self.tasks.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Remove every task not currently `running`.
    pub fn clear_history(&self) {
        self.tasks
            .write()
            .retain(|t| t.status == TransferStatus::Running);
    }

    /// Upload a batch of dropped/selected files into `remote_dir`, strictly
    /// sequentially: one file's backend call completes (success or failure)
    /// before the next begins. One failure does not abort the rest. After
    /// each file the browser re-lists its current directory, and the drag
    /// banner is cleared at the end regardless of individual outcomes.
    ///
    /// Returns the created task ids in file order.
    pub async fn upload_batch(
        &self,
        files: &[DroppedFile],
        remote_dir: &str,
        browser: &SftpBrowser,
    ) -> Vec<String> {
        let mut ids = Vec::with_capacity(files.len());

        for file in files {
            let remote_path = join_remote_path(remote_dir, &file.name);
            let id = self.create_task(
                TransferDirection::Upload,
                file.name.clone(),
                file.path.clone(),
                remote_path.clone(),
            );

            match self
                .backend
                .upload_file(&self.session_id, &file.path, &remote_path)
                .await
            {
                Ok(()) => {
                    info!("Uploaded {} -> {}", file.path, remote_path);
                    self.update_task(&id, TaskPatch::finished(TransferStatus::Success, None));
                }
                Err(e) => {
                    warn!("Upload {} failed: {}", file.path, e);
                    self.update_task(
                        &id,
                        TaskPatch::finished(TransferStatus::Failed, Some(e.to_string())),
                    );
                }
            }

            // Refresh after every attempt; listing errors surface inline in
            // the browser and must not stop the batch.
            let _ = browser.refresh().await;
            ids.push(id);
        }

        browser.drag().reset();
        ids
    }

    /// Download one remote file, producing a single tracked task.
    pub async fn download(
        &self,
        name: impl Into<String>,
        remote_path: &str,
        local_path: &str,
    ) -> String {
        let id = self.create_task(TransferDirection::Download, name, remote_path, local_path);

        match self
            .backend
            .download_file(&self.session_id, remote_path, local_path)
            .await
        {
            Ok(()) => {
                info!("Downloaded {} -> {}", remote_path, local_path);
                self.update_task(&id, TaskPatch::finished(TransferStatus::Success, None));
            }
            Err(e) => {
                warn!("Download {} failed: {}", remote_path, e);
                self.update_task(
                    &id,
                    TaskPatch::finished(TransferStatus::Failed, Some(e.to_string())),
                );
            }
        }
        id
    }
}
