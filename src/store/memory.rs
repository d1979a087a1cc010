use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::*;

use super::{RunStore, StoreError};

/// Volatile store. Nothing survives the process.
pub struct MemoryStore {
    runs: DashMap<RunId, BrewingRun>,
    appointments: DashMap<AppointmentId, Appointment>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            appointments: DashMap::new(),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let snapshot = Snapshot {
            runs: self.runs.iter().map(|e| e.value().clone()).collect(),
            appointments: self.appointments.iter().map(|e| e.value().clone()).collect(),
        };
        Ok(snapshot.sorted())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.runs.clear();
        self.appointments.clear();
        for run in &snapshot.runs {
            self.runs.insert(run.id, run.clone());
        }
        for appointment in &snapshot.appointments {
            self.appointments.insert(appointment.id, appointment.clone());
        }
        Ok(())
    }

    async fn add_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        if self.runs.contains_key(&run.id) {
            return Err(StoreError::AlreadyExists(run.id));
        }
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        let mut slot = self.runs.get_mut(&run.id).ok_or(StoreError::NotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    async fn delete_run(&self, id: RunId) -> Result<(), StoreError> {
        self.runs.remove(&id);
        Ok(())
    }

    async fn add_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        if self.appointments.contains_key(&appointment.id) {
            return Err(StoreError::AlreadyExists(appointment.id));
        }
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut slot = self
            .appointments
            .get_mut(&appointment.id)
            .ok_or(StoreError::NotFound(appointment.id))?;
        *slot = appointment.clone();
        Ok(())
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError> {
        self.appointments.remove(&id);
        Ok(())
    }
}
