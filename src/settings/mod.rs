//! Live display settings
//!
//! A fixed set of configuration keys applied to the running terminal without
//! reconnecting. All changes flow through one broadcast stream of
//! [`SettingChange`] and one dispatch table ([`apply_setting`]); there are no
//! per-key subscriptions. Geometry-affecting keys additionally schedule a
//! renderer re-fit pass.

pub mod storage;

pub use storage::{SettingsFile, SettingsStorage, StorageError};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::renderer::{Renderer, RendererOption};

/// The configuration keys the live sync reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    Theme,
    FontSize,
    FontFamily,
    FontWeight,
    CursorStyle,
    CursorBlink,
    LineHeight,
    AutoCopy,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::Theme,
        SettingKey::FontSize,
        SettingKey::FontFamily,
        SettingKey::FontWeight,
        SettingKey::CursorStyle,
        SettingKey::CursorBlink,
        SettingKey::LineHeight,
        SettingKey::AutoCopy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Theme => "theme",
            SettingKey::FontSize => "font_size",
            SettingKey::FontFamily => "font_family",
            SettingKey::FontWeight => "font_weight",
            SettingKey::CursorStyle => "cursor_style",
            SettingKey::CursorBlink => "cursor_blink",
            SettingKey::LineHeight => "line_height",
            SettingKey::AutoCopy => "auto_copy",
        }
    }

    pub fn parse(name: &str) -> Option<SettingKey> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Whether a change to this key alters terminal geometry and therefore
    /// needs a re-fit pass.
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            SettingKey::FontSize
                | SettingKey::FontFamily
                | SettingKey::FontWeight
                | SettingKey::LineHeight
        )
    }
}

/// One key-level change notification
#[derive(Debug, Clone)]
pub struct SettingChange {
    pub key: SettingKey,
    pub value: serde_json::Value,
}

/// Key/value settings store with key-level change notification.
pub struct SettingsStore {
    values: RwLock<HashMap<SettingKey, serde_json::Value>>,
    tx: broadcast::Sender<SettingChange>,
    storage: Option<SettingsStorage>,
}

impl SettingsStore {
    /// In-memory store (tests, ephemeral profiles).
    pub fn in_memory() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            values: RwLock::new(HashMap::new()),
            tx,
            storage: None,
        }
    }

    /// Store backed by a settings file, pre-populated from disk.
    pub async fn with_storage(storage: SettingsStorage) -> Result<Self, StorageError> {
        let file = storage.load().await?;
        let values = file
            .values
            .iter()
            .filter_map(|(name, value)| SettingKey::parse(name).map(|k| (k, value.clone())))
            .collect();

        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            values: RwLock::new(values),
            tx,
            storage: Some(storage),
        })
    }

    pub fn get(&self, key: SettingKey) -> Option<serde_json::Value> {
        self.values.read().get(&key).cloned()
    }

    /// Update one key: store, notify subscribers, persist.
    pub async fn set(
        &self,
        key: SettingKey,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.values.write().insert(key, value.clone());
        let _ = self.tx.send(SettingChange { key, value });

        if let Some(storage) = &self.storage {
            let snapshot = SettingsFile {
                version: storage::SETTINGS_VERSION,
                values: self
                    .values
                    .read()
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                    .collect(),
            };
            storage.save(&snapshot).await?;
        }
        Ok(())
    }

    /// Subscribe to the change stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.tx.subscribe()
    }
}

/// The dispatch table: one change in, at most one renderer option out, plus
/// a re-fit for geometry keys. Values that fail to coerce are skipped.
pub fn apply_setting(renderer: &dyn Renderer, change: &SettingChange) {
    let Some(option) = coerce(change) else {
        warn!(
            "Ignoring setting {} with unusable value {}",
            change.key.as_str(),
            change.value
        );
        return;
    };

    debug!("Applying setting {} -> {:?}", change.key.as_str(), option);
    renderer.set_option(option);

    if change.key.is_geometry() {
        renderer.schedule_refit();
    }
}

fn coerce(change: &SettingChange) -> Option<RendererOption> {
    let value = &change.value;
    match change.key {
        SettingKey::Theme => value.as_str().map(|s| RendererOption::Theme(s.to_string())),
        SettingKey::FontSize => value
            .as_u64()
            .filter(|n| (6..=128).contains(n))
            .map(|n| RendererOption::FontSize(n as u16)),
        SettingKey::FontFamily => value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| RendererOption::FontFamily(s.to_string())),
        SettingKey::FontWeight => value
            .as_u64()
            .filter(|n| (100..=900).contains(n))
            .map(|n| RendererOption::FontWeight(n as u16)),
        SettingKey::CursorStyle => value
            .as_str()
            .map(|s| RendererOption::CursorStyle(s.to_string())),
        SettingKey::CursorBlink => value.as_bool().map(RendererOption::CursorBlink),
        SettingKey::LineHeight => value
            .as_f64()
            .filter(|h| (0.5..=3.0).contains(h))
            .map(RendererOption::LineHeight),
        SettingKey::AutoCopy => value.as_bool().map(RendererOption::AutoCopy),
    }
}

/// Run the live sync loop: every change notification is applied to the
/// renderer in arrival order. Exits when the store is dropped.
pub fn spawn_settings_sync(
    store: &SettingsStore,
    renderer: Arc<dyn Renderer>,
) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => apply_setting(renderer.as_ref(), &change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Settings sync lagged, {} changes dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Settings sync stopped");
    })
}
