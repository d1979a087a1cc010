use crate::model::*;

use super::conflict::{booked_spans, container_conflict, tank_conflict, Booked};
use super::phases::compute_phases;
use super::EngineError;

// ── Availability ──────────────────────────────────────────────────

/// How a candidate's own span is projected.
///
/// Existing bookings always use their recorded transfer override. A fresh
/// request is evaluated against its default-duration span unless
/// `HonorOverride` is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateSpan {
    #[default]
    DefaultDuration,
    HonorOverride,
}

impl CandidateSpan {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "default_duration" => Some(CandidateSpan::DefaultDuration),
            "override" | "honor_override" => Some(CandidateSpan::HonorOverride),
            _ => None,
        }
    }
}

/// Outer span a candidate is checked against.
pub fn candidate_span(candidate: &RunPlan, policy: CandidateSpan) -> DaySpan {
    let plan = match policy {
        CandidateSpan::DefaultDuration => candidate.without_override(),
        CandidateSpan::HonorOverride => *candidate,
    };
    compute_phases(&plan).span
}

/// Is there at least one tank with no competing run overlapping the
/// candidate? Evaluated with the default candidate span.
pub fn check_tank_availability(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    candidate: &RunPlan,
    exclude: Option<RunId>,
) -> bool {
    let span = candidate_span(candidate, CandidateSpan::DefaultDuration);
    tank_available_over(pool, runs, &span, exclude)
}

/// Are at least three containers free across the candidate's span?
pub fn check_container_availability(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    candidate: &RunPlan,
    exclude: Option<RunId>,
) -> bool {
    let span = candidate_span(candidate, CandidateSpan::DefaultDuration);
    container_available_over(pool, runs, &span, exclude)
}

pub fn tank_available_over(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    span: &DaySpan,
    exclude: Option<RunId>,
) -> bool {
    let booked = booked_spans(runs, exclude);
    any_tank_free(pool, &booked, span)
}

pub fn container_available_over(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    span: &DaySpan,
    exclude: Option<RunId>,
) -> bool {
    let booked = booked_spans(runs, exclude);
    count_free_containers(pool, &booked, span) >= CONTAINERS_PER_RUN
}

pub(crate) fn any_tank_free(pool: &ResourcePool, booked: &[Booked<'_>], span: &DaySpan) -> bool {
    pool.tanks
        .iter()
        .any(|tank| tank_conflict(booked, tank.id, span).is_none())
}

pub(crate) fn count_free_containers(
    pool: &ResourcePool,
    booked: &[Booked<'_>],
    span: &DaySpan,
) -> usize {
    pool.containers
        .iter()
        .filter(|c| container_conflict(booked, c.id, span).is_none())
        .count()
}

/// Both checks, combined into one verdict. When both resource classes fail
/// the error says so; the caller can tell "neither" from "one of two".
pub(crate) fn verdict(
    pool: &ResourcePool,
    booked: &[Booked<'_>],
    span: &DaySpan,
) -> Result<(), EngineError> {
    let tank_ok = any_tank_free(pool, booked, span);
    let free = count_free_containers(pool, booked, span);
    let containers_ok = free >= CONTAINERS_PER_RUN;
    match (tank_ok, containers_ok) {
        (true, true) => Ok(()),
        (false, true) => Err(EngineError::NoTankAvailable),
        (true, false) => Err(EngineError::InsufficientContainers { free }),
        (false, false) => Err(EngineError::NoTankAndInsufficientContainers {
            free_containers: free,
        }),
    }
}
