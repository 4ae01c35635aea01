/// Longest occupant name accepted, in bytes after trimming.
pub const MAX_OCCUPANT_NAME_LEN: usize = 128;

/// Most cells a single bulk reservation may target.
pub const MAX_BULK_TARGETS: usize = 1_000;

/// Longest horizon an office may configure, in days.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Widest availability query, in days. A horizon view includes both ends.
pub const MAX_QUERY_DAYS: u32 = MAX_HORIZON_DAYS + 1;

pub const MAX_ROSTER_SIZE: usize = 64;

pub const MAX_RESOURCE_NAME_LEN: usize = 64;

/// Storage keys become file names, keep them well below OS limits.
pub const MAX_STORAGE_KEY_LEN: usize = 128;
