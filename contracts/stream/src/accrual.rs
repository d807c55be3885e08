//! Elapsed-window accrual arithmetic.
//!
//! Everything here is plain integer math over explicit timestamps. Time only
//! advances with the messages the host delivers, so accrual is always a
//! function of two settlement points, never of a live clock.

/// Amount newly accrued between `last_accrual_time` and `now`.
///
/// The charged window is `[max(last_accrual_time, start_time),
/// min(now, stop_time)]`, empty windows yield zero. The product saturates at
/// `i128::MAX`; callers cap the delta at the remaining pool, which is what
/// bounds the real value.
pub fn accrual_delta(
    start_time: u64,
    stop_time: Option<u64>,
    last_accrual_time: u64,
    rate_per_second: i128,
    now: u64,
) -> i128 {
    let until = match stop_time {
        Some(stop) => now.min(stop),
        None => now,
    };
    let from = last_accrual_time.max(start_time);
    if until <= from || rate_per_second <= 0 {
        return 0;
    }

    let elapsed = (until - from) as i128;
    rate_per_second.checked_mul(elapsed).unwrap_or(i128::MAX)
}
