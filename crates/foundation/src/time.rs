use chrono::{DateTime, SecondsFormat, Utc};

/// Wall-clock instant, seconds since the Unix epoch.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Time(pub f64);

impl Time {
    pub fn now() -> Self {
        Time(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn from_secs(secs: f64) -> Self {
        Time(secs)
    }

    pub fn secs(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`; negative when `earlier` is in the future.
    pub fn since(self, earlier: Time) -> f64 {
        self.0 - earlier.0
    }

    pub fn plus(self, secs: f64) -> Self {
        Time(self.0 + secs)
    }

    /// RFC 3339 UTC stamp with second precision, e.g. `2026-10-19T12:00:00Z`.
    ///
    /// Stamps of this shape sort lexicographically in chronological order.
    pub fn to_rfc3339(self) -> String {
        let whole = self.0.floor();
        let nanos = ((self.0 - whole) * 1e9) as u32;
        DateTime::<Utc>::from_timestamp(whole as i64, nanos)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
