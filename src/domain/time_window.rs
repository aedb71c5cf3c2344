//! Read-side time windows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SitewatchError;

/// Closed set of windows accepted by the read endpoints.
///
/// `Now` is not a range: it selects the single most recent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    /// Most recent snapshot only.
    #[serde(rename = "now")]
    Now,
    /// Last hour.
    #[serde(rename = "1h")]
    Hour,
    /// Last 24 hours.
    #[serde(rename = "24h")]
    Day,
    /// Last 7 days.
    #[serde(rename = "1w")]
    Week,
    /// Last calendar month.
    #[serde(rename = "1m")]
    Month,
}

impl TimeWindow {
    /// Returns the wire token for this window.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Hour => "1h",
            Self::Day => "24h",
            Self::Week => "1w",
            Self::Month => "1m",
        }
    }

    /// Returns the inclusive lower bound of the window relative to `now`,
    /// or `None` for [`TimeWindow::Now`].
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Now => None,
            Self::Hour => Some(now - Duration::hours(1)),
            Self::Day => Some(now - Duration::hours(24)),
            Self::Week => Some(now - Duration::weeks(1)),
            Self::Month => Some(
                now.checked_sub_months(Months::new(1))
                    .unwrap_or(now - Duration::days(30)),
            ),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = SitewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now" => Ok(Self::Now),
            "1h" => Ok(Self::Hour),
            "24h" => Ok(Self::Day),
            "1w" => Ok(Self::Week),
            "1m" => Ok(Self::Month),
            other => Err(SitewatchError::InvalidTimeWindow(other.to_string())),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_closed_token_set() {
        for token in ["now", "1h", "24h", "1w", "1m"] {
            let Ok(window) = token.parse::<TimeWindow>() else {
                panic!("{token} should parse");
            };
            assert_eq!(window.as_str(), token);
        }
    }

    #[test]
    fn rejects_unknown_tokens() {
        for token in ["", "6", "2d", "1H", "week"] {
            assert!(token.parse::<TimeWindow>().is_err(), "{token} accepted");
        }
    }

    #[test]
    fn now_has_no_lower_bound() {
        assert!(TimeWindow::Now.since(Utc::now()).is_none());
    }

    #[test]
    fn month_is_calendar_month() {
        let Some(now) = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).single() else {
            panic!("valid date");
        };
        let Some(since) = TimeWindow::Month.since(now) else {
            panic!("month has a bound");
        };
        let Some(expected) = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).single() else {
            panic!("valid date");
        };
        assert_eq!(since, expected);
    }

    #[test]
    fn hour_and_day_bounds() {
        let now = Utc::now();
        assert_eq!(TimeWindow::Hour.since(now), Some(now - Duration::hours(1)));
        assert_eq!(TimeWindow::Day.since(now), Some(now - Duration::hours(24)));
    }
}
