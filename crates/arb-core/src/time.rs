//! UTC timestamps for hosted-anchor bookkeeping.
//!
//! Seconds since the Unix epoch, rendered as ISO-8601 with the
//! days-to-civil conversion from Howard Hinnant's date algorithms.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifetime the remote service gives a hosted anchor when no TTL is requested.
pub const DEFAULT_HOSTED_TTL_SECONDS: u32 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        )
    }

    pub fn plus_secs(self, secs: u64) -> Self {
        Timestamp(self.0.saturating_add(secs))
    }

    /// When an anchor hosted at `self` with `ttl_seconds` stops resolving.
    pub fn expiry(self, ttl_seconds: Option<u32>) -> Self {
        self.plus_secs(u64::from(ttl_seconds.unwrap_or(DEFAULT_HOSTED_TTL_SECONDS)))
    }

    pub fn is_before(self, other: Timestamp) -> bool {
        self.0 < other.0
    }

    pub fn to_iso8601(self) -> String {
        let days = (self.0 / 86_400) as i64;
        let secs = self.0 % 86_400;
        let (y, m, d) = civil_from_days(days);
        format!(
            "{y:04}-{m:02}-{d:02}T{:02}:{:02}:{:02}Z",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(Timestamp(0).to_string(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_known_instant() {
        // 2026-02-21T13:05:09Z
        assert_eq!(
            Timestamp(1_771_632_000 + 13 * 3600 + 5 * 60 + 9).to_iso8601(),
            "2026-02-21T13:05:09Z"
        );
    }

    #[test]
    fn test_expiry_defaults_to_one_day() {
        let hosted = Timestamp(1_000);
        assert_eq!(hosted.expiry(Some(60)), Timestamp(1_060));
        assert_eq!(hosted.expiry(None), Timestamp(1_000 + 86_400));
        assert!(hosted.is_before(hosted.expiry(Some(1))));
    }
}
