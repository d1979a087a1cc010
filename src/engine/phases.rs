use crate::model::*;

// ── Phase Calculator ──────────────────────────────────────────────

/// Decompose a plan into its outer span and ordered phases.
///
/// With `d` fermentation days: brew day, primary fermentation until the
/// transfer day (default `start + d`), the transfer day itself, secondary
/// fermentation, and the end day at `transfer + d - 1`. Empty phases are
/// omitted. A transfer override earlier than `start + 1` is clamped there;
/// callers reject such overrides before booking (see `validate_plan`).
pub fn compute_phases(plan: &RunPlan) -> RunSchedule {
    let days = plan.brew_type.fermentation_days();
    debug_assert!(days >= 2, "brew types ferment for at least two days");

    let brew_day = plan.start;
    let primary_start = add_days(brew_day, 1);
    let transfer = match plan.transfer_override {
        Some(t) if t < primary_start => primary_start,
        Some(t) => t,
        None => add_days(brew_day, days),
    };
    let secondary_start = add_days(transfer, 1);
    let end = add_days(transfer, days - 1);

    let mut phases = Vec::with_capacity(5);
    phases.push(Phase {
        kind: PhaseKind::BrewDay,
        span: DaySpan::single(brew_day),
    });
    if primary_start < transfer {
        phases.push(Phase {
            kind: PhaseKind::PrimaryFermentation,
            span: DaySpan::new(primary_start, transfer),
        });
    }
    phases.push(Phase {
        kind: PhaseKind::Transfer,
        span: DaySpan::single(transfer),
    });
    if secondary_start < end {
        phases.push(Phase {
            kind: PhaseKind::SecondaryFermentation,
            span: DaySpan::new(secondary_start, end),
        });
    }
    phases.push(Phase {
        kind: PhaseKind::End,
        span: DaySpan::single(end),
    });

    RunSchedule {
        span: DaySpan::new(brew_day, add_days(end, 1)),
        phases,
    }
}

impl RunSchedule {
    /// Which phase owns `day`. `None` outside the span.
    pub fn phase_on(&self, day: Day) -> Option<PhaseKind> {
        if !self.span.contains_day(day) {
            return None;
        }
        let kind = self
            .phases
            .iter()
            .find(|p| p.span.contains_day(day))
            .map(|p| p.kind)
            // Unreachable while phases partition the span.
            .unwrap_or(PhaseKind::BrewDay);
        Some(kind)
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    pub fn transfer_day(&self) -> Day {
        self.phase(PhaseKind::Transfer)
            .map_or(self.span.start, |p| p.span.start)
    }

    pub fn end_day(&self) -> Day {
        self.phase(PhaseKind::End)
            .map_or(self.span.start, |p| p.span.start)
    }
}

impl BrewingRun {
    pub fn schedule(&self) -> RunSchedule {
        compute_phases(&self.plan())
    }

    pub fn span(&self) -> DaySpan {
        self.schedule().span
    }
}
