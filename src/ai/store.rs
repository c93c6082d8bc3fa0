//! Chat history persistence using redb
//!
//! One table, keyed by session id, holding the full MessagePack-encoded
//! message list. Saves replace the stored list wholesale; the in-memory
//! session is the source of truth between saves.
//!
//! Database: chat_history.redb

#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use chrono::Utc;

use super::{ChatMessage, ChatRole};

/// Table: chat_history (key: session id, value: MessagePack bytes)
const CHAT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chat_history");

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rmp_serde::encode::Error> for ChatStoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ChatStoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ChatStoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ChatStoreError::Serialization(e.to_string())
    }
}

/// Persisted message shape. Only `{role, content}` is required; histories
/// written by older builds carry no timestamp and get one at load time.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    role: ChatRole,
    content: String,
    #[serde(default)]
    created_at: Option<i64>,
}

/// Chat history store, one list per session id.
pub struct ChatStore {
    db: Arc<Database>,
}

impl ChatStore {
    /// Open (or create) the store at the given path. A corrupted database is
    /// backed up and recreated rather than failing startup.
    pub fn new(path: PathBuf) -> Result<Self, ChatStoreError> {
        let db = match Database::create(&path) {
            Ok(db) => {
                info!("Chat history database opened at {:?}", path);
                db
            }
            Err(e) => {
                warn!("Failed to open chat database: {:?}, attempting recovery", e);

                let backup_path = path.with_extension("redb.backup");
                if let Err(e) = std::fs::rename(&path, &backup_path) {
                    error!("Failed to backup corrupted chat database: {:?}", e);
                } else {
                    info!("Backed up corrupted chat database to {:?}", backup_path);
                }

                Database::create(&path)?
            }
        };

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            {
                warn!("Failed to set chat database permissions: {}", e);
            }
        }

        let store = Self { db: Arc::new(db) };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<(), ChatStoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(CHAT_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Replace the stored history for a session with the given list.
    pub fn save_history(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), ChatStoreError> {
        let stored: Vec<StoredMessage> = messages
            .iter()
            .map(|m| StoredMessage {
                role: m.role,
                content: m.content.clone(),
                created_at: Some(m.created_at),
            })
            .collect();
        let bytes = rmp_serde::to_vec(&stored)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHAT_TABLE)?;
            table.insert(session_id, bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(
            "Saved {} chat messages for session {}",
            messages.len(),
            session_id
        );
        Ok(())
    }

    /// Load the history for a session. Missing sessions yield an empty list;
    /// messages without a timestamp get the load time.
    pub fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, ChatStoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHAT_TABLE)?;

        let Some(bytes) = table.get(session_id)? else {
            return Ok(Vec::new());
        };

        let stored: Vec<StoredMessage> = rmp_serde::from_slice(bytes.value())?;
        let now = Utc::now().timestamp_millis();

        Ok(stored
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
                created_at: m.created_at.unwrap_or(now),
            })
            .collect())
    }

    /// Drop the stored history for a session.
    pub fn delete_history(&self, session_id: &str) -> Result<(), ChatStoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHAT_TABLE)?;
            let _ = table.remove(session_id)?;
        }
        write_txn.commit()?;
        info!("Deleted chat history for session {}", session_id);
        Ok(())
    }
}
