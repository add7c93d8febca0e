//! Process-wide interpreter state
//!
//! Everything that outlives a single script run lives here: global
//! variables, the pending queue, the last revert record and the settings.
//! Runs take the run gate first, so at most one script mutates this state
//! at a time.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tokio::sync::{Mutex, MutexGuard};

use crate::pending::{PendingQueue, RevertRecord};
use crate::script::GlobalVariables;
use crate::settings::{SettingChange, Settings, SettingsError};

#[derive(Debug, Default)]
pub struct ProcessState {
    run_gate: Mutex<()>,
    pub globals: GlobalVariables,
    pub pending: Mutex<PendingQueue>,
    pub revert: Mutex<Option<RevertRecord>>,
    settings: RwLock<Settings>,
    /// Where `SETTING` persists changes; in-memory only when unset
    config_path: Option<PathBuf>,
}

impl ProcessState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            ..Self::default()
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Serialize script runs
    pub async fn begin_run(&self) -> MutexGuard<'_, ()> {
        self.run_gate.lock().await
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change one setting and persist the result when a config path is set
    pub fn update_setting(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<SettingChange, SettingsError> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let change = settings.set(name, value)?;
        if let Some(path) = &self.config_path {
            settings.save(path)?;
        }
        Ok(change)
    }

    pub async fn record_revert(&self, record: RevertRecord) {
        *self.revert.lock().await = Some(record);
    }

    pub async fn take_revert(&self) -> Option<RevertRecord> {
        self.revert.lock().await.take()
    }
}
