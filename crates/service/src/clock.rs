use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Current UTC time at microsecond precision, the finest resolution every
/// backend stores exactly.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A timestamp strictly after `prev`: the current time, or `prev` plus one
/// microsecond when the clock has not moved past it.
pub fn after(prev: DateTime<Utc>) -> DateTime<Utc> {
    let t = now();
    if t > prev { t } else { prev + Duration::microseconds(1) }
}
