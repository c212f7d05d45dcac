//! Fractional scale and timing helpers.

use std::time::Duration;

/// Denominator of the fractional scale protocol: a scale of 120 is 1.0.
pub const SCALE_DENOMINATOR: u32 = 120;

/// Convert a logical coordinate to physical pixels at the given scale.
pub fn to_physical(logical: i32, scale: u32) -> i32 {
    (i64::from(logical) * i64::from(scale) / i64::from(SCALE_DENOMINATOR)) as i32
}

/// Convert a physical coordinate to logical units, rounding up so the
/// logical area never undershoots the physical one.
pub fn to_logical(physical: i32, scale: u32) -> i32 {
    if scale == 0 {
        return physical;
    }
    let num = i64::from(physical) * i64::from(SCALE_DENOMINATOR);
    num.div_euclid(i64::from(scale)) as i32 + i32::from(num.rem_euclid(i64::from(scale)) != 0)
}

/// Refresh interval in nanoseconds to a refresh rate in mHz.
pub fn refresh_interval_to_mhz(interval_ns: u32) -> i32 {
    if interval_ns == 0 {
        return 0;
    }
    (1_000_000_000_000u64 / u64::from(interval_ns)) as i32
}

/// Refresh rate in mHz to a frame interval.
pub fn mhz_to_interval(mhz: i32) -> Option<Duration> {
    if mhz <= 0 {
        return None;
    }
    Some(Duration::from_nanos(1_000_000_000_000u64 / mhz as u64))
}

pub fn get_monotonic_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out pointer and CLOCK_MONOTONIC always exists.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// Float comparison used for layer scale and offset checks.
pub fn close_enough(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.001
}
