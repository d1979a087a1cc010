use crate::model::*;

use super::phases::compute_phases;
use super::EngineError;

/// An existing run paired with its outer span, computed with its own override.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Booked<'a> {
    pub run: &'a BrewingRun,
    pub span: DaySpan,
}

/// Spans of every run that competes with a candidate: all runs except `exclude`.
/// Recomputed on every call; nothing is cached between calls.
pub(crate) fn booked_spans(runs: &[BrewingRun], exclude: Option<RunId>) -> Vec<Booked<'_>> {
    runs.iter()
        .filter(|run| Some(run.id) != exclude)
        .map(|run| Booked {
            run,
            span: compute_phases(&run.plan()).span,
        })
        .collect()
}

/// First booked run on `tank` whose span overlaps `span`.
pub(crate) fn tank_conflict(booked: &[Booked<'_>], tank: TankId, span: &DaySpan) -> Option<RunId> {
    booked
        .iter()
        .find(|b| b.run.uses_tank(tank) && b.span.overlaps(span))
        .map(|b| b.run.id)
}

/// First booked run holding `container` whose span overlaps `span`.
pub(crate) fn container_conflict(
    booked: &[Booked<'_>],
    container: ContainerId,
    span: &DaySpan,
) -> Option<RunId> {
    booked
        .iter()
        .find(|b| b.run.uses_container(container) && b.span.overlaps(span))
        .map(|b| b.run.id)
}

/// A transfer cannot happen before the run has begun.
pub fn validate_plan(plan: &RunPlan) -> Result<(), EngineError> {
    if let Some(transfer) = plan.transfer_override
        && transfer < add_days(plan.start, 1)
    {
        return Err(EngineError::InvalidOverride {
            start: plan.start,
            transfer,
        });
    }
    Ok(())
}
