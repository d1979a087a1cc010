use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{CandidateSpan, EngineError, Session};
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{self, *};
use crate::store::{self, RunStore, StoreError};

const COMMAND_QUEUE: usize = 1024;

#[derive(Debug)]
pub enum ServiceError {
    Engine(EngineError),
    Store(StoreError),
    NotFound(Ulid),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    /// The writer task is gone.
    Stopped,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Engine(e) => write!(f, "{e}"),
            ServiceError::Store(e) => write!(f, "{e}"),
            ServiceError::NotFound(id) => write!(f, "not found: {id}"),
            ServiceError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            ServiceError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            ServiceError::Stopped => write!(f, "scheduler stopped"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Engine(e) => Some(e),
            ServiceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        ServiceError::Engine(e)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

// ── Requests ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub title: String,
    pub start: Day,
    pub brew_type: BrewType,
    pub transfer_override: Option<Day>,
}

impl BookingRequest {
    pub fn new(title: impl Into<String>, start: Day, brew_type: BrewType) -> Self {
        Self {
            title: title.into(),
            start,
            brew_type,
            transfer_override: None,
        }
    }

    pub fn with_transfer(mut self, transfer: Day) -> Self {
        self.transfer_override = Some(transfer);
        self
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan {
            start: self.start,
            brew_type: self.brew_type,
            transfer_override: self.transfer_override,
        }
    }
}

/// Edits to an existing run. `None` leaves a field as it is.
///
/// `transfer_override: Some(None)` clears the override. When the start date
/// or brew type changes and the override is not mentioned, it is dropped so
/// the transfer day falls back to the brew type's default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunChanges {
    pub title: Option<String>,
    pub start: Option<Day>,
    pub brew_type: Option<BrewType>,
    pub transfer_override: Option<Option<Day>>,
}

impl RunChanges {
    pub fn apply_to(&self, plan: &RunPlan) -> RunPlan {
        let start = self.start.unwrap_or(plan.start);
        let brew_type = self.brew_type.unwrap_or(plan.brew_type);
        let transfer_override = match self.transfer_override {
            Some(explicit) => explicit,
            None if start != plan.start || brew_type != plan.brew_type => None,
            None => plan.transfer_override,
        };
        RunPlan {
            start,
            brew_type,
            transfer_override,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRequest {
    pub title: String,
    pub start: Day,
    /// Inclusive.
    pub end: Day,
    pub description: Option<String>,
}

// ── Input validation ────────────────────────────────────────────

fn validate_title(title: &str) -> Result<String, ServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::InvalidInput("title must not be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(ServiceError::LimitExceeded("title too long"));
    }
    Ok(title.to_string())
}

fn validate_day(day: Day) -> Result<(), ServiceError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&day.year()) {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput("date out of range"))
    }
}

/// Range checks only; ordering of the override is the engine's call.
fn validate_plan_input(plan: &RunPlan) -> Result<(), ServiceError> {
    validate_day(plan.start)?;
    if let Some(transfer) = plan.transfer_override {
        validate_day(transfer)?;
        if (transfer - plan.start).num_days() > MAX_TRANSFER_DELAY_DAYS {
            return Err(ServiceError::LimitExceeded("transfer too far after start"));
        }
    }
    Ok(())
}

fn validate_window(window: &DaySpan) -> Result<(), ServiceError> {
    validate_day(window.start)?;
    validate_day(window.end)?;
    if window.start >= window.end {
        return Err(ServiceError::InvalidInput("empty query window"));
    }
    if window.len_days() > MAX_QUERY_WINDOW_DAYS {
        return Err(ServiceError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

fn validate_appointment(id: AppointmentId, request: AppointmentRequest) -> Result<Appointment, ServiceError> {
    let title = validate_title(&request.title)?;
    validate_day(request.start)?;
    validate_day(request.end)?;
    if request.end < request.start {
        return Err(ServiceError::InvalidInput("appointment ends before it starts"));
    }
    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(ServiceError::LimitExceeded("description too long"));
    }
    Ok(Appointment {
        id,
        title,
        start: request.start,
        end: request.end,
        description,
    })
}

// ── Writer task ─────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

enum Command {
    Book {
        request: BookingRequest,
        response: Reply<BrewingRun>,
    },
    Reschedule {
        id: RunId,
        changes: RunChanges,
        response: Reply<BrewingRun>,
    },
    Cancel {
        id: RunId,
        response: Reply<BrewingRun>,
    },
    AddAppointment {
        request: AppointmentRequest,
        response: Reply<Appointment>,
    },
    UpdateAppointment {
        id: AppointmentId,
        request: AppointmentRequest,
        response: Reply<Appointment>,
    },
    RemoveAppointment {
        id: AppointmentId,
        response: Reply<Appointment>,
    },
}

/// Owns the only mutable view of the booking set. Every command reloads the
/// snapshot from the store first, so the availability check and the write
/// it licenses happen with no other writer in between.
struct Writer {
    store: Arc<dyn RunStore>,
    session: Session,
    notify: Arc<NotifyHub>,
}

async fn writer_loop(mut writer: Writer, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Book { request, response } => {
                let _ = response.send(writer.book(request).await);
            }
            Command::Reschedule { id, changes, response } => {
                let _ = response.send(writer.reschedule(id, changes).await);
            }
            Command::Cancel { id, response } => {
                let _ = response.send(writer.cancel(id).await);
            }
            Command::AddAppointment { request, response } => {
                let _ = response.send(writer.add_appointment(request).await);
            }
            Command::UpdateAppointment { id, request, response } => {
                let _ = response.send(writer.update_appointment(id, request).await);
            }
            Command::RemoveAppointment { id, response } => {
                let _ = response.send(writer.remove_appointment(id).await);
            }
        }
    }
    debug!("scheduler writer stopped");
}

async fn timed<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let start = Instant::now();
    let result = fut.await;
    metrics::histogram!(STORE_WRITE_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    result
}

fn record_failure(err: &EngineError) {
    metrics::counter!(ALLOCATION_FAILURES_TOTAL, "reason" => observability::failure_label(err)).increment(1);
    debug!("allocation rejected: {err}");
}

impl Writer {
    /// Reload the authoritative snapshot. Returns the appointments.
    async fn refresh(&mut self) -> Result<Vec<Appointment>, ServiceError> {
        let Snapshot { runs, appointments } = self.store.load().await?;
        self.session.replace_runs(runs);
        Ok(appointments)
    }

    fn runs_gauge(&self) {
        metrics::gauge!(RUNS_ACTIVE).set(self.session.runs().len() as f64);
    }

    async fn book(&mut self, request: BookingRequest) -> Result<BrewingRun, ServiceError> {
        let title = validate_title(&request.title)?;
        let plan = request.plan();
        validate_plan_input(&plan)?;

        self.refresh().await?;
        if self.session.runs().len() >= MAX_RUNS {
            return Err(ServiceError::LimitExceeded("too many runs"));
        }
        let allocation = self.session.allocate(&plan, None).inspect_err(record_failure)?;
        let run = BrewingRun::new(Ulid::new(), title, plan, allocation);

        timed("add_run", self.store.add_run(&run)).await?;
        self.session.upsert(run.clone());
        metrics::counter!(RUNS_BOOKED_TOTAL).increment(1);
        self.runs_gauge();
        info!(run = %run.id, start = %run.start, tank = %run.tank, "run booked");

        let resources: Vec<ResourceRef> = run.resources().collect();
        self.notify.publish(resources, &Event::RunBooked { run: run.clone() });
        Ok(run)
    }

    async fn reschedule(&mut self, id: RunId, changes: RunChanges) -> Result<BrewingRun, ServiceError> {
        self.refresh().await?;
        let current = self.session.get(id).cloned().ok_or(ServiceError::NotFound(id))?;

        let title = match &changes.title {
            Some(t) => validate_title(t)?,
            None => current.title.clone(),
        };
        let plan = changes.apply_to(&current.plan());
        validate_plan_input(&plan)?;

        // Every edit re-runs first fit, so a rename may move the run onto
        // resources freed since it was booked.
        let allocation = self.session.allocate(&plan, Some(id)).inspect_err(record_failure)?;
        let run = BrewingRun::new(id, title, plan, allocation);

        timed("update_run", self.store.update_run(&run)).await?;
        self.session.upsert(run.clone());
        metrics::counter!(RUNS_RESCHEDULED_TOTAL).increment(1);
        info!(run = %id, start = %run.start, tank = %run.tank, "run rescheduled");

        let resources: Vec<ResourceRef> = current.resources().chain(run.resources()).collect();
        self.notify.publish(resources, &Event::RunRescheduled { run: run.clone() });
        Ok(run)
    }

    async fn cancel(&mut self, id: RunId) -> Result<BrewingRun, ServiceError> {
        self.refresh().await?;
        let current = self.session.get(id).cloned().ok_or(ServiceError::NotFound(id))?;

        timed("delete_run", self.store.delete_run(id)).await?;
        self.session.remove(id);
        metrics::counter!(RUNS_CANCELLED_TOTAL).increment(1);
        self.runs_gauge();
        info!(run = %id, "run cancelled");

        let resources: Vec<ResourceRef> = current.resources().collect();
        self.notify.publish(resources, &Event::RunCancelled { id });
        Ok(current)
    }

    async fn add_appointment(&mut self, request: AppointmentRequest) -> Result<Appointment, ServiceError> {
        let appointment = validate_appointment(Ulid::new(), request)?;
        let existing = self.refresh().await?;
        if existing.len() >= MAX_APPOINTMENTS {
            return Err(ServiceError::LimitExceeded("too many appointments"));
        }
        timed("add_appointment", self.store.add_appointment(&appointment)).await?;
        info!(appointment = %appointment.id, start = %appointment.start, "appointment added");
        Ok(appointment)
    }

    async fn update_appointment(
        &mut self,
        id: AppointmentId,
        request: AppointmentRequest,
    ) -> Result<Appointment, ServiceError> {
        let appointment = validate_appointment(id, request)?;
        timed("update_appointment", self.store.update_appointment(&appointment)).await?;
        info!(appointment = %id, "appointment updated");
        Ok(appointment)
    }

    async fn remove_appointment(&mut self, id: AppointmentId) -> Result<Appointment, ServiceError> {
        let existing = self.refresh().await?;
        let appointment = existing
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(ServiceError::NotFound(id))?;
        timed("delete_appointment", self.store.delete_appointment(id)).await?;
        info!(appointment = %id, "appointment removed");
        Ok(appointment)
    }
}

// ── Handle ──────────────────────────────────────────────────────

/// Cloneable handle to the scheduling service.
///
/// Mutations are queued to a single writer task. Reads load a fresh snapshot
/// from the store and answer from it without going through the queue.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<Command>,
    store: Arc<dyn RunStore>,
    pool: Arc<ResourcePool>,
    policy: CandidateSpan,
    notify: Arc<NotifyHub>,
}

impl Scheduler {
    /// Open the configured store and start the writer task.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let store = store::open(config)?;
        Self::start(store, config.pool(), config.candidate_span).await
    }

    /// Start the writer task over an already opened store. Must run inside a
    /// tokio runtime.
    pub async fn start(
        store: Arc<dyn RunStore>,
        pool: ResourcePool,
        policy: CandidateSpan,
    ) -> Result<Self, ServiceError> {
        let snapshot = store.load().await?;
        let stray = snapshot
            .runs
            .iter()
            .filter(|r| r.resources().any(|res| !pool.contains(res)))
            .count();
        if stray > 0 {
            warn!("{stray} stored runs reference resources outside the configured pool");
        }
        info!(
            tanks = pool.tanks.len(),
            containers = pool.containers.len(),
            runs = snapshot.runs.len(),
            appointments = snapshot.appointments.len(),
            ?policy,
            "scheduler starting"
        );
        metrics::gauge!(RUNS_ACTIVE).set(snapshot.runs.len() as f64);

        let notify = Arc::new(NotifyHub::new());
        let session = Session::new(pool.clone())
            .with_policy(policy)
            .with_runs(snapshot.runs);
        let writer = Writer {
            store: store.clone(),
            session,
            notify: notify.clone(),
        };
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        tokio::spawn(writer_loop(writer, rx));

        Ok(Self {
            tx,
            store,
            pool: Arc::new(pool),
            policy,
            notify,
        })
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(make(tx)).await.map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)?
    }

    async fn session(&self) -> Result<Session, ServiceError> {
        let snapshot = self.store.load().await?;
        Ok(Session::new(self.pool.as_ref().clone())
            .with_policy(self.policy)
            .with_runs(snapshot.runs))
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    // ── Mutations ───────────────────────────────────────────

    pub async fn book(&self, request: BookingRequest) -> Result<BrewingRun, ServiceError> {
        self.call(|response| Command::Book { request, response }).await
    }

    pub async fn reschedule(&self, id: RunId, changes: RunChanges) -> Result<BrewingRun, ServiceError> {
        self.call(|response| Command::Reschedule { id, changes, response }).await
    }

    /// Returns the cancelled run.
    pub async fn cancel(&self, id: RunId) -> Result<BrewingRun, ServiceError> {
        self.call(|response| Command::Cancel { id, response }).await
    }

    pub async fn add_appointment(&self, request: AppointmentRequest) -> Result<Appointment, ServiceError> {
        self.call(|response| Command::AddAppointment { request, response }).await
    }

    pub async fn update_appointment(
        &self,
        id: AppointmentId,
        request: AppointmentRequest,
    ) -> Result<Appointment, ServiceError> {
        self.call(|response| Command::UpdateAppointment { id, request, response })
            .await
    }

    pub async fn remove_appointment(&self, id: AppointmentId) -> Result<Appointment, ServiceError> {
        self.call(|response| Command::RemoveAppointment { id, response }).await
    }

    // ── Queries ─────────────────────────────────────────────

    pub async fn status(&self, as_of: Day) -> Result<OccupancyReport, ServiceError> {
        validate_day(as_of)?;
        Ok(self.session().await?.status_as_of(as_of))
    }

    /// All runs, ordered by start date.
    pub async fn runs(&self) -> Result<Vec<BrewingRun>, ServiceError> {
        Ok(self.store.load().await?.runs)
    }

    /// Runs whose span overlaps `window`.
    pub async fn runs_between(&self, window: DaySpan) -> Result<Vec<BrewingRun>, ServiceError> {
        validate_window(&window)?;
        Ok(self.session().await?.runs_between(&window))
    }

    pub async fn schedule_of(&self, id: RunId) -> Result<RunSchedule, ServiceError> {
        self.session()
            .await?
            .compute_phases(id)
            .ok_or(ServiceError::NotFound(id))
    }

    /// Would `request` fit right now? Same answer `book` would give, minus
    /// the write.
    pub async fn check_fit(&self, request: &BookingRequest) -> Result<Allocation, ServiceError> {
        let plan = request.plan();
        validate_plan_input(&plan)?;
        Ok(self.session().await?.allocate(&plan, None)?)
    }

    /// All appointments, ordered by start date.
    pub async fn appointments(&self) -> Result<Vec<Appointment>, ServiceError> {
        Ok(self.store.load().await?.appointments)
    }

    /// Change notifications for one tank or container of the pool. The
    /// channel is dropped after the first write that finds no receivers left.
    pub fn subscribe(&self, resource: ResourceRef) -> Result<broadcast::Receiver<Event>, ServiceError> {
        if !self.pool.contains(resource) {
            return Err(ServiceError::InvalidInput("resource not in pool"));
        }
        Ok(self.notify.subscribe(resource))
    }
}
