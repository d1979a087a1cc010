use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Calendar date, the only date type. No time of day ever participates.
pub type Day = NaiveDate;

pub type RunId = Ulid;
pub type AppointmentId = Ulid;

/// Every run binds exactly this many containers.
pub const CONTAINERS_PER_RUN: usize = 3;

pub const DEFAULT_TANKS: u32 = 3;
pub const DEFAULT_CONTAINERS: u32 = 20;

/// `day + n` calendar days.
pub fn add_days(day: Day, n: u32) -> Day {
    day + Days::new(u64::from(n))
}

/// Half-open day range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaySpan {
    pub start: Day,
    pub end: Day,
}

impl DaySpan {
    pub fn new(start: Day, end: Day) -> Self {
        debug_assert!(start < end, "DaySpan start must be before end");
        Self { start, end }
    }

    /// The single day `[day, day + 1)`.
    pub fn single(day: Day) -> Self {
        Self::new(day, add_days(day, 1))
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// The one overlap test. A span ending on day X does not conflict with
    /// a span starting on day X.
    pub fn overlaps(&self, other: &DaySpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_day(&self, day: Day) -> bool {
        self.start <= day && day < self.end
    }

    pub fn days(&self) -> impl Iterator<Item = Day> + '_ {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

impl fmt::Display for DaySpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ── Reference data ───────────────────────────────────────────────

/// Brew types and their fermentation durations. Fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrewType {
    TopFermenting,
    BottomFermenting,
}

impl BrewType {
    pub const ALL: [BrewType; 2] = [BrewType::TopFermenting, BrewType::BottomFermenting];

    /// Days of primary fermentation; secondary fermentation plus the end day
    /// take the same number of days again.
    pub const fn fermentation_days(self) -> u32 {
        match self {
            BrewType::TopFermenting => 14,
            BrewType::BottomFermenting => 10,
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            BrewType::TopFermenting => "Top-fermenting",
            BrewType::BottomFermenting => "Bottom-fermenting",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            BrewType::TopFermenting => "top_fermenting",
            BrewType::BottomFermenting => "bottom_fermenting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top_fermenting" | "top" | "ale" => Some(BrewType::TopFermenting),
            "bottom_fermenting" | "bottom" | "lager" => Some(BrewType::BottomFermenting),
            _ => None,
        }
    }
}

impl fmt::Display for BrewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TankId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub u32);

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tank {}", self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container {}", self.0)
    }
}

/// Any bookable physical resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceRef {
    Tank(TankId),
    Container(ContainerId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tank {
    pub id: TankId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
}

/// The fixed set of tanks and containers. Iteration order is the first-fit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub tanks: Vec<Tank>,
    pub containers: Vec<Container>,
}

impl ResourcePool {
    /// Pool with ids `1..=n` and names "Tank n" / "Container n".
    pub fn new(tanks: u32, containers: u32) -> Self {
        Self {
            tanks: (1..=tanks)
                .map(|i| Tank { id: TankId(i), name: format!("Tank {i}") })
                .collect(),
            containers: (1..=containers)
                .map(|i| Container { id: ContainerId(i), name: format!("Container {i}") })
                .collect(),
        }
    }

    pub fn tank(&self, id: TankId) -> Option<&Tank> {
        self.tanks.iter().find(|t| t.id == id)
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, resource: ResourceRef) -> bool {
        match resource {
            ResourceRef::Tank(id) => self.tank(id).is_some(),
            ResourceRef::Container(id) => self.container(id).is_some(),
        }
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(DEFAULT_TANKS, DEFAULT_CONTAINERS)
    }
}

// ── Runs ─────────────────────────────────────────────────────────

/// The schedulable shape of a run: what the phase calculator needs.
/// A booking request before allocation is just a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub start: Day,
    pub brew_type: BrewType,
    pub transfer_override: Option<Day>,
}

impl RunPlan {
    pub fn new(start: Day, brew_type: BrewType) -> Self {
        Self { start, brew_type, transfer_override: None }
    }

    pub fn with_transfer(mut self, transfer: Day) -> Self {
        self.transfer_override = Some(transfer);
        self
    }

    /// Same plan with the override dropped.
    pub fn without_override(self) -> Self {
        Self { transfer_override: None, ..self }
    }
}

/// A booked run with its bound resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewingRun {
    pub id: RunId,
    pub title: String,
    pub start: Day,
    pub brew_type: BrewType,
    #[serde(default)]
    pub transfer_override: Option<Day>,
    pub tank: TankId,
    pub containers: [ContainerId; CONTAINERS_PER_RUN],
}

impl BrewingRun {
    pub fn new(id: RunId, title: String, plan: RunPlan, allocation: Allocation) -> Self {
        Self {
            id,
            title,
            start: plan.start,
            brew_type: plan.brew_type,
            transfer_override: plan.transfer_override,
            tank: allocation.tank,
            containers: allocation.containers,
        }
    }

    pub fn allocation(&self) -> Allocation {
        Allocation {
            tank: self.tank,
            containers: self.containers,
        }
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan {
            start: self.start,
            brew_type: self.brew_type,
            transfer_override: self.transfer_override,
        }
    }

    pub fn uses_tank(&self, tank: TankId) -> bool {
        self.tank == tank
    }

    pub fn uses_container(&self, container: ContainerId) -> bool {
        self.containers.contains(&container)
    }

    /// Tank first, then containers in bound order.
    pub fn resources(&self) -> impl Iterator<Item = ResourceRef> + '_ {
        std::iter::once(ResourceRef::Tank(self.tank))
            .chain(self.containers.iter().map(|c| ResourceRef::Container(*c)))
    }
}

/// Concrete resources chosen for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub tank: TankId,
    pub containers: [ContainerId; CONTAINERS_PER_RUN],
}

// ── Phases ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    BrewDay,
    PrimaryFermentation,
    Transfer,
    SecondaryFermentation,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub span: DaySpan,
}

/// Derived schedule of a run: the outer span and its phases in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSchedule {
    pub span: DaySpan,
    pub phases: Vec<Phase>,
}

// ── Appointments ─────────────────────────────────────────────────

/// Plain calendar entry. Occupies no resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub title: String,
    pub start: Day,
    /// Inclusive.
    pub end: Day,
    #[serde(default)]
    pub description: Option<String>,
}

impl Appointment {
    pub fn span(&self) -> DaySpan {
        DaySpan::new(self.start, add_days(self.end, 1))
    }
}

// ── Persistence ──────────────────────────────────────────────────

/// Everything a store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub runs: Vec<BrewingRun>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

/// The event types: flat, no nesting. This is the WAL record format and
/// the change-notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RunBooked { run: BrewingRun },
    RunRescheduled { run: BrewingRun },
    RunCancelled { id: RunId },
    AppointmentAdded { appointment: Appointment },
    AppointmentUpdated { appointment: Appointment },
    AppointmentRemoved { id: AppointmentId },
}

// ── Status ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Occupancy {
    Free,
    Occupied { run: RunId, phase: PhaseKind },
}

impl Occupancy {
    pub fn is_occupied(&self) -> bool {
        matches!(self, Occupancy::Occupied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus<Id> {
    pub id: Id,
    pub name: String,
    #[serde(flatten)]
    pub occupancy: Occupancy,
}

/// Occupancy of every resource on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyReport {
    pub as_of: Day,
    pub tanks: Vec<ResourceStatus<TankId>>,
    pub containers: Vec<ResourceStatus<ContainerId>>,
}

impl OccupancyReport {
    pub fn free_tanks(&self) -> usize {
        self.tanks.iter().filter(|t| !t.occupancy.is_occupied()).count()
    }

    pub fn free_containers(&self) -> usize {
        self.containers.iter().filter(|c| !c.occupancy.is_occupied()).count()
    }

    pub fn tank(&self, id: TankId) -> Option<&ResourceStatus<TankId>> {
        self.tanks.iter().find(|t| t.id == id)
    }

    pub fn container(&self, id: ContainerId) -> Option<&ResourceStatus<ContainerId>> {
        self.containers.iter().find(|c| c.id == id)
    }
}
