use crate::model::Day;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NoTankAvailable,
    InsufficientContainers {
        free: usize,
    },
    /// Both resource classes failed; reported together, never short-circuited.
    NoTankAndInsufficientContainers {
        free_containers: usize,
    },
    InvalidOverride {
        start: Day,
        transfer: Day,
    },
    /// Availability and selection disagreed. Never expected.
    AllocationInvariantViolation(&'static str),
}

impl EngineError {
    pub fn is_tank_shortage(&self) -> bool {
        matches!(
            self,
            EngineError::NoTankAvailable | EngineError::NoTankAndInsufficientContainers { .. }
        )
    }

    pub fn is_container_shortage(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientContainers { .. }
                | EngineError::NoTankAndInsufficientContainers { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoTankAvailable => write!(f, "no tank available"),
            EngineError::InsufficientContainers { free } => {
                write!(f, "not enough containers available: {free} free, 3 needed")
            }
            EngineError::NoTankAndInsufficientContainers { free_containers } => {
                write!(
                    f,
                    "no tank available and not enough containers: {free_containers} free, 3 needed"
                )
            }
            EngineError::InvalidOverride { start, transfer } => {
                write!(
                    f,
                    "transfer date {transfer} must be at least one day after start {start}"
                )
            }
            EngineError::AllocationInvariantViolation(msg) => {
                write!(f, "allocation invariant violated: {msg}")
            }
        }
    }
}

impl std::error::Error for EngineError {}
