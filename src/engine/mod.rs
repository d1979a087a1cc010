mod allocation;
mod availability;
mod conflict;
mod error;
mod phases;
mod status;

pub use allocation::{allocate, allocate_with};
pub use availability::{
    candidate_span, check_container_availability, check_tank_availability,
    container_available_over, tank_available_over, CandidateSpan,
};
pub use conflict::validate_plan;
pub use error::EngineError;
pub use phases::compute_phases;
pub use status::status_as_of;

use crate::model::*;

/// A booking snapshot plus the pool it books against.
///
/// Owned by whoever serializes writes (see `service::Scheduler`) and handed
/// to the engine explicitly; the engine itself holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pool: ResourcePool,
    runs: Vec<BrewingRun>,
    policy: CandidateSpan,
}

impl Session {
    pub fn new(pool: ResourcePool) -> Self {
        Self {
            pool,
            runs: Vec::new(),
            policy: CandidateSpan::default(),
        }
    }

    pub fn with_policy(mut self, policy: CandidateSpan) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_runs(mut self, runs: Vec<BrewingRun>) -> Self {
        self.runs = runs;
        self
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn policy(&self) -> CandidateSpan {
        self.policy
    }

    pub fn runs(&self) -> &[BrewingRun] {
        &self.runs
    }

    pub fn get(&self, id: RunId) -> Option<&BrewingRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    /// Swap in a fresh snapshot from the store.
    pub fn replace_runs(&mut self, runs: Vec<BrewingRun>) {
        self.runs = runs;
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, run: BrewingRun) {
        match self.runs.iter_mut().find(|r| r.id == run.id) {
            Some(slot) => *slot = run,
            None => self.runs.push(run),
        }
    }

    pub fn remove(&mut self, id: RunId) -> Option<BrewingRun> {
        let pos = self.runs.iter().position(|r| r.id == id)?;
        Some(self.runs.remove(pos))
    }

    // ── Engine operations over this snapshot ─────────────────

    pub fn compute_phases(&self, id: RunId) -> Option<RunSchedule> {
        self.get(id).map(BrewingRun::schedule)
    }

    pub fn check_tank_availability(&self, candidate: &RunPlan, exclude: Option<RunId>) -> bool {
        let span = candidate_span(candidate, self.policy);
        tank_available_over(&self.pool, &self.runs, &span, exclude)
    }

    pub fn check_container_availability(&self, candidate: &RunPlan, exclude: Option<RunId>) -> bool {
        let span = candidate_span(candidate, self.policy);
        container_available_over(&self.pool, &self.runs, &span, exclude)
    }

    pub fn allocate(&self, candidate: &RunPlan, exclude: Option<RunId>) -> Result<Allocation, EngineError> {
        allocate_with(&self.pool, &self.runs, candidate, exclude, self.policy)
    }

    pub fn status_as_of(&self, as_of: Day) -> OccupancyReport {
        status_as_of(&self.pool, &self.runs, as_of)
    }

    /// Runs whose outer span overlaps `window`, ordered by start date.
    pub fn runs_between(&self, window: &DaySpan) -> Vec<BrewingRun> {
        let mut hits: Vec<BrewingRun> = self
            .runs
            .iter()
            .filter(|r| r.span().overlaps(window))
            .cloned()
            .collect();
        hits.sort_by_key(|r| (r.start, r.id));
        hits
    }
}
