//! Day-count thresholds with the `-1` "disabled" sentinel.

use chrono::{DateTime, Duration, Utc};

use crate::base::types::Res;

/// A configured waiting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// The rule this threshold guards never fires.
    Disabled,
    /// The rule fires once this much time has elapsed.
    After(Duration),
}

impl Threshold {
    /// Converts a configured day count, where `-1` disables the rule.
    pub fn from_days(days: i64) -> Res<Self> {
        match days {
            -1 => Ok(Self::Disabled),
            d if d >= 0 => Ok(Self::After(Duration::days(d))),
            d => Err(anyhow::anyhow!("Invalid threshold {d}: must be -1 or non-negative.")),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::After(_))
    }

    /// Whether at least this threshold has passed between `since` and `now`.
    ///
    /// Always `false` when disabled.
    pub fn has_elapsed(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Disabled => false,
            Self::After(period) => now - since >= *period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sentinel_disables() {
        let threshold = Threshold::from_days(-1).unwrap();
        let since = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(threshold, Threshold::Disabled);
        assert!(!threshold.has_elapsed(since, Utc::now()));
        assert!(Threshold::from_days(-7).is_err());
    }

    #[test]
    fn elapsed_is_inclusive() {
        let threshold = Threshold::from_days(7).unwrap();
        let since = Utc.with_ymd_and_hms(2022, 8, 1, 0, 0, 0).unwrap();

        assert!(!threshold.has_elapsed(since, since + Duration::days(7) - Duration::seconds(1)));
        assert!(threshold.has_elapsed(since, since + Duration::days(7)));
    }

    #[test]
    fn zero_days_fires_immediately() {
        let threshold = Threshold::from_days(0).unwrap();
        let since = Utc.with_ymd_and_hms(2022, 8, 1, 0, 0, 0).unwrap();

        assert!(threshold.is_enabled());
        assert!(threshold.has_elapsed(since, since));
    }
}
