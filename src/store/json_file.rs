use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::*;

use super::{RunStore, StoreError};

/// Whole-document JSON store. Every write rewrites the file through a temp
/// file and a rename, so a crash leaves either the old or the new document.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Snapshot, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::default());
        }
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
        snapshot.check_dates()?;
        Ok(snapshot)
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let body =
            serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Codec(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = body.len(), "snapshot written");
        Ok(())
    }

    /// Read, modify, write under the store lock.
    async fn modify(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<(), StoreError> + Send,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.read().await?;
        f(&mut snapshot)?;
        self.write(&snapshot).await
    }
}

#[async_trait]
impl RunStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.sorted())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write(snapshot).await
    }

    async fn add_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        self.modify(|s| s.insert_run(run)).await
    }

    async fn update_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        self.modify(|s| s.replace_run(run)).await
    }

    async fn delete_run(&self, id: RunId) -> Result<(), StoreError> {
        self.modify(|s| {
            s.remove_run(id);
            Ok(())
        })
        .await
    }

    async fn add_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.modify(|s| s.insert_appointment(appointment)).await
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.modify(|s| s.replace_appointment(appointment)).await
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError> {
        self.modify(|s| {
            s.remove_appointment(id);
            Ok(())
        })
        .await
    }
}
