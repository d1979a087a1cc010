mod event_log;
mod json_file;
mod memory;

pub use event_log::EventLogStore;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use tracing::info;
use ulid::Ulid;

use crate::config::{Config, StorageKind};
use crate::limits::{MAX_YEAR, MIN_YEAR};
use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Codec(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "storage I/O error: {e}"),
            StoreError::Codec(e) => write!(f, "storage format error: {e}"),
            StoreError::NotFound(id) => write!(f, "not found in storage: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already stored: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Persistence capability set. Adapters are selected at startup; nothing
/// above this trait knows which one is active.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replace everything.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    async fn add_run(&self, run: &BrewingRun) -> Result<(), StoreError>;

    /// `NotFound` if no run with this id is stored.
    async fn update_run(&self, run: &BrewingRun) -> Result<(), StoreError>;

    /// Deleting an absent run is not an error.
    async fn delete_run(&self, id: RunId) -> Result<(), StoreError>;

    async fn add_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError>;
}

/// Open the adapter named by the configuration.
pub fn open(config: &Config) -> Result<Arc<dyn RunStore>, StoreError> {
    info!("storage: {}", config.storage.label());
    let store: Arc<dyn RunStore> = match config.storage {
        StorageKind::Memory => Arc::new(MemoryStore::new()),
        StorageKind::File => {
            std::fs::create_dir_all(&config.data_dir)?;
            Arc::new(JsonFileStore::new(config.json_path()))
        }
        StorageKind::Wal => {
            std::fs::create_dir_all(&config.data_dir)?;
            Arc::new(EventLogStore::open(&config.wal_path(), config.compact_threshold)?)
        }
    };
    Ok(store)
}

// ── Snapshot mutation shared by the adapters ─────────────────────

impl Snapshot {
    pub fn run(&self, id: RunId) -> Option<&BrewingRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn insert_run(&mut self, run: &BrewingRun) -> Result<(), StoreError> {
        if self.run(run.id).is_some() {
            return Err(StoreError::AlreadyExists(run.id));
        }
        self.runs.push(run.clone());
        Ok(())
    }

    pub fn replace_run(&mut self, run: &BrewingRun) -> Result<(), StoreError> {
        let slot = self
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or(StoreError::NotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    pub fn remove_run(&mut self, id: RunId) {
        self.runs.retain(|r| r.id != id);
    }

    pub fn insert_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        if self.appointments.iter().any(|a| a.id == appointment.id) {
            return Err(StoreError::AlreadyExists(appointment.id));
        }
        self.appointments.push(appointment.clone());
        Ok(())
    }

    pub fn replace_appointment(&mut self, appointment: &Appointment) -> Result<(), StoreError> {
        let slot = self
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or(StoreError::NotFound(appointment.id))?;
        *slot = appointment.clone();
        Ok(())
    }

    pub fn remove_appointment(&mut self, id: AppointmentId) {
        self.appointments.retain(|a| a.id != id);
    }

    /// Apply a logged event. Replay is lenient: an event that no longer fits
    /// (e.g. an update for a run already removed) is skipped.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::RunBooked { run } | Event::RunRescheduled { run } => {
                if self.replace_run(run).is_err() {
                    self.runs.push(run.clone());
                }
            }
            Event::RunCancelled { id } => self.remove_run(*id),
            Event::AppointmentAdded { appointment } | Event::AppointmentUpdated { appointment } => {
                if self.replace_appointment(appointment).is_err() {
                    self.appointments.push(appointment.clone());
                }
            }
            Event::AppointmentRemoved { id } => self.remove_appointment(*id),
        }
    }

    /// Minimal event list that recreates this snapshot.
    pub fn to_events(&self) -> Vec<Event> {
        self.runs
            .iter()
            .map(|run| Event::RunBooked { run: run.clone() })
            .chain(
                self.appointments
                    .iter()
                    .map(|a| Event::AppointmentAdded { appointment: a.clone() }),
            )
            .collect()
    }

    /// Stable order: runs by start date, appointments by start date.
    pub fn sorted(mut self) -> Self {
        self.runs.sort_by_key(|r| (r.start, r.id));
        self.appointments.sort_by_key(|a| (a.start, a.id));
        self
    }

    /// Every stored date must fall in `MIN_YEAR..=MAX_YEAR`; phase
    /// arithmetic needs the headroom above it.
    pub fn check_dates(&self) -> Result<(), StoreError> {
        let runs = self.runs.iter().flat_map(|r| {
            std::iter::once((r.id, r.start)).chain(r.transfer_override.map(|t| (r.id, t)))
        });
        let appointments = self
            .appointments
            .iter()
            .flat_map(|a| [(a.id, a.start), (a.id, a.end)]);
        match runs
            .chain(appointments)
            .find(|(_, day)| !(MIN_YEAR..=MAX_YEAR).contains(&day.year()))
        {
            Some((id, day)) => Err(StoreError::Codec(format!(
                "{id}: date {day} outside {MIN_YEAR}..={MAX_YEAR}"
            ))),
            None => Ok(()),
        }
    }
}
