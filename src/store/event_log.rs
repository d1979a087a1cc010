use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::model::*;
use crate::wal::Wal;

use super::{RunStore, StoreError};

struct Inner {
    wal: Wal,
    state: Snapshot,
}

/// Event-sourced store: every change is appended to the WAL and applied to
/// an in-memory snapshot. The log is compacted once enough appends pile up.
pub struct EventLogStore {
    inner: Mutex<Inner>,
    compact_threshold: u64,
}

impl EventLogStore {
    pub fn open(path: &Path, compact_threshold: u64) -> Result<Self, StoreError> {
        let start = Instant::now();
        let (wal, replay) = Wal::open(path)?;
        if replay.discarded > 0 {
            warn!(
                bytes = replay.discarded,
                kept = replay.valid_len,
                "cut torn tail off event log"
            );
        }
        let mut state = Snapshot::default();
        for event in &replay.events {
            state.apply(event);
        }
        state.check_dates()?;
        info!(
            events = replay.events.len(),
            runs = state.runs.len(),
            appointments = state.appointments.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "replayed event log"
        );
        Ok(Self {
            inner: Mutex::new(Inner { wal, state }),
            compact_threshold: compact_threshold.max(1),
        })
    }

    async fn commit(
        &self,
        check: impl FnOnce(&Snapshot) -> Result<(), StoreError> + Send,
        event: Event,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        check(&inner.state)?;
        // A failed append leaves the state untouched; the WAL cuts the
        // partial record before it writes again.
        inner
            .wal
            .append(&event)
            .inspect_err(|e| warn!("event log append failed: {e}"))?;
        inner.state.apply(&event);
        if inner.wal.appends_since_compact() >= self.compact_threshold {
            let events = inner.state.to_events();
            match inner.wal.compact(&events) {
                Ok(()) => info!(events = events.len(), "compacted event log"),
                // The uncompacted log is still valid; try again next threshold.
                Err(e) => warn!("event log compaction failed: {e}"),
            }
        }
        Ok(())
    }
}

fn no_check(_: &Snapshot) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl RunStore for EventLogStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.inner.lock().await.state.clone().sorted())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.wal.compact(&snapshot.to_events())?;
        inner.state = snapshot.clone();
        Ok(())
    }

    async fn add_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        let id = run.id;
        self.commit(
            move |s| match s.run(id) {
                Some(_) => Err(StoreError::AlreadyExists(id)),
                None => Ok(()),
            },
            Event::RunBooked { run: run.clone() },
        )
        .await
    }

    async fn update_run(&self, run: &BrewingRun) -> Result<(), StoreError> {
        let id = run.id;
        self.commit(
            move |s| s.run(id).map(|_| ()).ok_or(StoreError::NotFound(id)),
            Event::RunRescheduled { run: run.clone() },
        )
        .await
    }

    async fn delete_run(&self, id: RunId) -> Result<(), StoreError> {
        self.commit(no_check, Event::RunCancelled { id }).await
    }

    async fn add_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let id = appointment.id;
        self.commit(
            move |s| match s.appointments.iter().any(|a| a.id == id) {
                true => Err(StoreError::AlreadyExists(id)),
                false => Ok(()),
            },
            Event::AppointmentAdded {
                appointment: appointment.clone(),
            },
        )
        .await
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let id = appointment.id;
        self.commit(
            move |s| match s.appointments.iter().any(|a| a.id == id) {
                true => Ok(()),
                false => Err(StoreError::NotFound(id)),
            },
            Event::AppointmentUpdated {
                appointment: appointment.clone(),
            },
        )
        .await
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError> {
        self.commit(no_check, Event::AppointmentRemoved { id }).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::super::testing::*;
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("brewcal_test_event_log");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn event_log_contract() {
        let store = EventLogStore::open(&tmp_path("contract.wal"), 1000).unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn replays_after_reopen() {
        let path = tmp_path("reopen.wal");
        let keep = run(0, 1);
        let gone = run(20, 1);
        {
            let store = EventLogStore::open(&path, 1000).unwrap();
            store.add_run(&keep).await.unwrap();
            store.add_run(&gone).await.unwrap();
            store.delete_run(gone.id).await.unwrap();
            store.add_appointment(&appointment(3)).await.unwrap();
        }
        let store = EventLogStore::open(&path, 1000).unwrap();
        let snap = store.load().await.unwrap();
        assert_eq!(snap.runs, vec![keep]);
        assert_eq!(snap.appointments.len(), 1);
    }

    #[tokio::test]
    async fn compacts_at_threshold() {
        let path = tmp_path("compact.wal");
        let mut r = run(0, 1);
        {
            let store = EventLogStore::open(&path, 4).unwrap();
            store.add_run(&r).await.unwrap();
            for i in 0..3 {
                r.title = format!("edit {i}");
                store.update_run(&r).await.unwrap();
            }
        }
        // Four appends hit the threshold; the log now holds a single booking.
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![Event::RunBooked { run: r.clone() }]);

        let store = EventLogStore::open(&path, 4).unwrap();
        assert_eq!(store.load().await.unwrap().runs, vec![r]);
    }

    #[tokio::test]
    async fn rejected_write_is_not_logged() {
        let path = tmp_path("rejected.wal");
        let store = EventLogStore::open(&path, 1000).unwrap();
        let ghost = run(0, 1);
        assert!(matches!(store.update_run(&ghost).await, Err(StoreError::NotFound(_))));
        assert!(Wal::replay(&path).unwrap().events.is_empty());
    }

    fn cut_tail(path: &Path, bytes: u64) {
        let len = std::fs::metadata(path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_len(len - bytes).unwrap();
    }

    #[tokio::test]
    async fn booking_after_torn_tail_survives_restart() {
        let path = tmp_path("torn.wal");
        let first = run(0, 1);
        {
            let store = EventLogStore::open(&path, 1000).unwrap();
            store.add_run(&first).await.unwrap();
            store.add_run(&run(0, 2)).await.unwrap();
        }
        // Crash mid-write: the second booking is torn.
        cut_tail(&path, 3);

        let after_crash = run(0, 3);
        {
            let store = EventLogStore::open(&path, 1000).unwrap();
            assert_eq!(store.load().await.unwrap().runs, vec![first.clone()]);
            store.add_run(&after_crash).await.unwrap();
        }

        let store = EventLogStore::open(&path, 1000).unwrap();
        let ids: Vec<RunId> = store.load().await.unwrap().runs.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&after_crash.id));
        assert_eq!(Wal::replay(&path).unwrap().discarded, 0);
    }

    #[tokio::test]
    async fn out_of_range_date_fails_open() {
        let path = tmp_path("far_future.wal");
        let mut far = run(0, 1);
        far.start = chrono::NaiveDate::MAX;
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&Event::RunBooked { run: far }).unwrap();
        }
        assert!(matches!(
            EventLogStore::open(&path, 1000),
            Err(StoreError::Codec(_))
        ));
    }
}
