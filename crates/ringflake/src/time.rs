use std::time::{SystemTime, UNIX_EPOCH};

/// Default epoch: Saturday, December 31, 2016 16:00:00 UTC.
///
/// Identifiers embed seconds elapsed since this point. A 28-bit timestamp
/// field on top of it lasts until mid-2025; deployments that outlive their
/// field pick a later epoch or a wider field at startup.
pub const DEFAULT_EPOCH_SECONDS: i64 = 1_483_200_000;

/// Returns the current wall-clock time in whole seconds since the Unix
/// epoch.
///
/// Read exactly once per padding executor, to seed its logical second
/// counter. Everything after that is pure arithmetic, which is what makes
/// the generator immune to wall-clock regressions.
pub(crate) fn current_second() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_secs() as i64
}
