use crate::model::*;

use super::phases::compute_phases;

// ── Status Reporter ───────────────────────────────────────────────

/// Occupancy of every tank and container on `as_of`. A resource is occupied
/// when `as_of` lies inside the outer span of a run bound to it; the report
/// also names that run and its phase on the day.
pub fn status_as_of(pool: &ResourcePool, runs: &[BrewingRun], as_of: Day) -> OccupancyReport {
    let active: Vec<(&BrewingRun, RunSchedule)> = runs
        .iter()
        .map(|run| (run, compute_phases(&run.plan())))
        .filter(|(_, schedule)| schedule.span.contains_day(as_of))
        .collect();

    let occupancy_of = |uses: &dyn Fn(&BrewingRun) -> bool| -> Occupancy {
        active
            .iter()
            .find(|entry| uses(entry.0))
            .and_then(|(run, schedule)| {
                schedule
                    .phase_on(as_of)
                    .map(|phase| Occupancy::Occupied { run: run.id, phase })
            })
            .unwrap_or(Occupancy::Free)
    };

    let tanks = pool
        .tanks
        .iter()
        .map(|tank| ResourceStatus {
            id: tank.id,
            name: tank.name.clone(),
            occupancy: occupancy_of(&|run: &BrewingRun| run.uses_tank(tank.id)),
        })
        .collect();

    let containers = pool
        .containers
        .iter()
        .map(|container| ResourceStatus {
            id: container.id,
            name: container.name.clone(),
            occupancy: occupancy_of(&|run: &BrewingRun| run.uses_container(container.id)),
        })
        .collect();

    OccupancyReport {
        as_of,
        tanks,
        containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn day(n: u32) -> Day {
        add_days(NaiveDate::from_ymd_opt(2025, 10, 27).unwrap(), n)
    }

    fn run(start: u32, tank: u32, containers: [u32; 3]) -> BrewingRun {
        BrewingRun {
            id: Ulid::new(),
            title: "run".into(),
            start: day(start),
            brew_type: BrewType::BottomFermenting,
            transfer_override: None,
            tank: TankId(tank),
            containers: containers.map(ContainerId),
        }
    }

    #[test]
    fn nothing_booked_everything_free() {
        let pool = ResourcePool::default();
        let report = status_as_of(&pool, &[], day(0));
        assert_eq!(report.free_tanks(), 3);
        assert_eq!(report.free_containers(), 20);
    }

    #[test]
    fn occupied_inside_span_only() {
        let pool = ResourcePool::default();
        let a = run(0, 2, [7, 8, 9]); // bottom-fermenting: [0, 20)
        let runs = vec![a.clone()];

        let before = status_as_of(&pool, &runs, day(0).pred_opt().unwrap());
        assert_eq!(before.free_tanks(), 3);

        let first = status_as_of(&pool, &runs, day(0));
        assert_eq!(
            first.tank(TankId(2)).unwrap().occupancy,
            Occupancy::Occupied { run: a.id, phase: PhaseKind::BrewDay }
        );
        assert_eq!(first.free_containers(), 17);

        let transfer = status_as_of(&pool, &runs, day(10));
        assert_eq!(
            transfer.container(ContainerId(8)).unwrap().occupancy,
            Occupancy::Occupied { run: a.id, phase: PhaseKind::Transfer }
        );

        let last = status_as_of(&pool, &runs, day(19));
        assert_eq!(
            last.tank(TankId(2)).unwrap().occupancy,
            Occupancy::Occupied { run: a.id, phase: PhaseKind::End }
        );

        let after = status_as_of(&pool, &runs, day(20));
        assert_eq!(after.free_tanks(), 3);
        assert_eq!(after.free_containers(), 20);
    }

    #[test]
    fn override_shortens_occupancy() {
        let pool = ResourcePool::default();
        let mut a = run(0, 1, [1, 2, 3]);
        a.transfer_override = Some(day(3)); // end = 3 + 9 = 12, span [0, 13)
        let runs = vec![a];
        assert_eq!(status_as_of(&pool, &runs, day(12)).free_tanks(), 2);
        assert_eq!(status_as_of(&pool, &runs, day(13)).free_tanks(), 3);
    }

    #[test]
    fn report_serializes_flat_status() {
        let pool = ResourcePool::new(1, 0);
        let a = run(0, 1, [1, 2, 3]);
        let report = status_as_of(&pool, &[a], day(1));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tanks"][0]["status"], "occupied");
        assert_eq!(json["tanks"][0]["phase"], "primary_fermentation");
        assert_eq!(json["tanks"][0]["name"], "Tank 1");
    }
}
