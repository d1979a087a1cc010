use tracing::debug;

use crate::model::*;

use super::availability::{candidate_span, verdict, CandidateSpan};
use super::conflict::{booked_spans, container_conflict, tank_conflict, validate_plan, Booked};
use super::EngineError;

// ── Allocation Selector ───────────────────────────────────────────

/// First-fit allocation with the default candidate span.
pub fn allocate(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    candidate: &RunPlan,
    exclude: Option<RunId>,
) -> Result<Allocation, EngineError> {
    allocate_with(pool, runs, candidate, exclude, CandidateSpan::DefaultDuration)
}

/// Validate, check both resource classes, then bind the first free tank and
/// the first three free containers in pool order.
pub fn allocate_with(
    pool: &ResourcePool,
    runs: &[BrewingRun],
    candidate: &RunPlan,
    exclude: Option<RunId>,
    policy: CandidateSpan,
) -> Result<Allocation, EngineError> {
    validate_plan(candidate)?;
    let span = candidate_span(candidate, policy);
    let booked = booked_spans(runs, exclude);

    verdict(pool, &booked, &span)?;

    let tank = select_tank(pool, &booked, &span).ok_or(
        EngineError::AllocationInvariantViolation("tank check passed but no tank selectable"),
    )?;
    let containers = select_containers(pool, &booked, &span)?;

    debug!(%span, %tank, ?containers, "allocated");
    Ok(Allocation { tank, containers })
}

pub(crate) fn select_tank(pool: &ResourcePool, booked: &[Booked<'_>], span: &DaySpan) -> Option<TankId> {
    pool.tanks
        .iter()
        .find(|t| tank_conflict(booked, t.id, span).is_none())
        .map(|t| t.id)
}

pub(crate) fn select_containers(
    pool: &ResourcePool,
    booked: &[Booked<'_>],
    span: &DaySpan,
) -> Result<[ContainerId; CONTAINERS_PER_RUN], EngineError> {
    let chosen: Vec<ContainerId> = pool
        .containers
        .iter()
        .filter(|c| container_conflict(booked, c.id, span).is_none())
        .take(CONTAINERS_PER_RUN)
        .map(|c| c.id)
        .collect();
    chosen.try_into().map_err(|_| {
        EngineError::AllocationInvariantViolation("container check passed but fewer than 3 selectable")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn day(n: u32) -> Day {
        add_days(NaiveDate::from_ymd_opt(2024, 2, 26).unwrap(), n)
    }

    fn run(start: u32, tank: u32, containers: [u32; 3]) -> BrewingRun {
        BrewingRun {
            id: Ulid::new(),
            title: "run".into(),
            start: day(start),
            brew_type: BrewType::TopFermenting,
            transfer_override: None,
            tank: TankId(tank),
            containers: containers.map(ContainerId),
        }
    }

    #[test]
    fn first_fit_on_empty_calendar() {
        let pool = ResourcePool::default();
        let plan = RunPlan::new(day(0), BrewType::TopFermenting);
        let a = allocate(&pool, &[], &plan, None).unwrap();
        assert_eq!(a.tank, TankId(1));
        assert_eq!(a.containers, [ContainerId(1), ContainerId(2), ContainerId(3)]);
    }

    #[test]
    fn skips_busy_resources_in_pool_order() {
        let pool = ResourcePool::default();
        let runs = vec![run(0, 1, [1, 3, 5])];
        let plan = RunPlan::new(day(10), BrewType::TopFermenting);
        let a = allocate(&pool, &runs, &plan, None).unwrap();
        assert_eq!(a.tank, TankId(2));
        assert_eq!(a.containers, [ContainerId(2), ContainerId(4), ContainerId(6)]);
    }

    #[test]
    fn invalid_override_rejected_before_checks() {
        let pool = ResourcePool::new(0, 0);
        let plan = RunPlan::new(day(4), BrewType::TopFermenting).with_transfer(day(4));
        assert!(matches!(
            allocate(&pool, &[], &plan, None),
            Err(EngineError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn select_containers_reports_invariant_violation() {
        let pool = ResourcePool::new(1, 2);
        let span = DaySpan::new(day(0), day(3));
        let err = select_containers(&pool, &[], &span).unwrap_err();
        assert!(matches!(err, EngineError::AllocationInvariantViolation(_)));
    }
}
