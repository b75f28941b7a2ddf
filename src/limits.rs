//! Hard limits on input size. Exceeding any of them is an error, never a truncation.

/// Bookings accepted in one batch.
pub const MAX_BOOKINGS_PER_BATCH: usize = 100_000;

/// Bookings held by one ledger.
pub const MAX_BOOKINGS_PER_LEDGER: usize = 100_000;

/// Length in bytes of ids, track ids and location ids.
pub const MAX_ID_LEN: usize = 256;

/// Largest date shift a policy may allow.
pub const MAX_SHIFT_DAYS: u32 = 366;

/// Alternate tracks a policy may list.
pub const MAX_PREFERRED_TRACKS: usize = 64;

/// Years a shift proposal may land in.
pub const MIN_VALID_YEAR: i32 = 1900;
pub const MAX_VALID_YEAR: i32 = 2199;

/// Widest window accepted by the calendar views, in days.
pub const MAX_CALENDAR_DAYS: i64 = 3_660;

pub const MAX_SEASON_NAME_LEN: usize = 128;
pub const MAX_SEASONS: usize = 64;
