// Input and size limits enforced at the service boundary.

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;

pub const MAX_RUNS: usize = 100_000;
pub const MAX_APPOINTMENTS: usize = 100_000;

pub const MAX_TANKS: u32 = 1_000;
pub const MAX_CONTAINERS: u32 = 10_000;

/// Latest accepted transfer override, counted from the start date.
pub const MAX_TRANSFER_DELAY_DAYS: i64 = 365;

/// Widest window accepted by calendar queries.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3_660;

/// Dates outside these years are rejected; keeps day arithmetic far from
/// the representable range.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;
