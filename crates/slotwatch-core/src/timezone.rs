//! Courier-local time conversion.
//!
//! The provider reports slot boundaries as UTC epoch milliseconds. All hour
//! and day-of-month decisions are made in the courier's zone, converting each
//! instant with the offset in force at that instant.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ConfigError;

/// Time zone the courier works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourierTimeZone {
    /// Whatever the host reports as local time.
    #[default]
    System,
    /// An IANA zone such as `Europe/Warsaw`.
    Named(Tz),
    /// A fixed offset, mostly useful in tests.
    Fixed(FixedOffset),
}

impl CourierTimeZone {
    /// Resolve a configured zone name. `None` selects the system zone.
    pub fn from_config(name: Option<&str>) -> Result<Self, ConfigError> {
        match name.map(str::trim) {
            None | Some("") => Ok(Self::System),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|_| ConfigError::Invalid(format!("Unknown time zone: {}", name))),
        }
    }

    /// Local wall-clock time for a UTC instant.
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::System => instant.with_timezone(&Local).naive_local(),
            Self::Named(tz) => instant.with_timezone(tz).naive_local(),
            Self::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }

    /// Local wall-clock time for epoch milliseconds, `None` if out of range.
    pub fn local_from_millis(&self, epoch_millis: i64) -> Option<NaiveDateTime> {
        Utc.timestamp_millis_opt(epoch_millis)
            .single()
            .map(|instant| self.to_local(instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_from_config() {
        assert_eq!(CourierTimeZone::from_config(None).unwrap(), CourierTimeZone::System);
        assert_eq!(CourierTimeZone::from_config(Some("  ")).unwrap(), CourierTimeZone::System);
        assert_eq!(
            CourierTimeZone::from_config(Some("Europe/Warsaw")).unwrap(),
            CourierTimeZone::Named(chrono_tz::Europe::Warsaw)
        );
        assert!(CourierTimeZone::from_config(Some("Mars/Olympus")).is_err());
    }

    #[test]
    fn test_offset_follows_daylight_saving() {
        let zone = CourierTimeZone::Named(chrono_tz::Europe::Warsaw);

        // 10:00 UTC in January is 11:00 CET (+1)
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(zone.to_local(winter).hour(), 11);

        // 10:00 UTC in July is 12:00 CEST (+2)
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 10, 0, 0).unwrap();
        assert_eq!(zone.to_local(summer).hour(), 12);
    }

    #[test]
    fn test_local_from_millis() {
        let zone = CourierTimeZone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap());
        let millis = Utc
            .with_ymd_and_hms(2024, 3, 6, 9, 30, 0)
            .unwrap()
            .timestamp_millis();
        let local = zone.local_from_millis(millis).unwrap();
        assert_eq!(local.hour(), 11);
        assert_eq!(local.minute(), 30);
    }
}
