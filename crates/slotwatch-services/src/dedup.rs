//! Per-hour notification bookkeeping.
//!
//! A slot id is announced at most once per local clock hour. When the hour
//! changes the record is cleared, so a slot still open in the next hour is
//! announced again.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashSet;

/// Local calendar hour: the date plus the hour of day.
type HourMark = (NaiveDate, u32);

#[derive(Debug, Default)]
pub struct NotificationDeduplicator {
    notified: HashSet<String>,
    last_hour: Option<HourMark>,
}

impl NotificationDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the hour marker already set, as at process start.
    pub fn starting_at(local_now: NaiveDateTime) -> Self {
        Self {
            notified: HashSet::new(),
            last_hour: Some(hour_mark(local_now)),
        }
    }

    /// Clear the record if the local hour changed since the last call.
    ///
    /// Must run before the current poll's slots are evaluated. Returns true
    /// when the record was cleared.
    pub fn roll_hour(&mut self, local_now: NaiveDateTime) -> bool {
        let mark = hour_mark(local_now);
        match self.last_hour {
            Some(last) if last == mark => false,
            Some(_) => {
                tracing::debug!(
                    "Hour changed, forgetting {} notified slots",
                    self.notified.len()
                );
                self.notified.clear();
                self.last_hour = Some(mark);
                true
            }
            None => {
                self.last_hour = Some(mark);
                false
            }
        }
    }

    pub fn should_notify(&self, slot_id: &str) -> bool {
        !self.notified.contains(slot_id)
    }

    pub fn mark_notified(&mut self, slot_id: &str) {
        self.notified.insert(slot_id.to_string());
    }

    pub fn notified_count(&self) -> usize {
        self.notified.len()
    }
}

fn hour_mark(local: NaiveDateTime) -> HourMark {
    (local.date(), local.hour())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_notifies_once_per_hour() {
        let mut dedup = NotificationDeduplicator::starting_at(at(6, 11, 0));

        assert!(dedup.should_notify("A"));
        dedup.mark_notified("A");
        assert!(!dedup.should_notify("A"));

        assert!(!dedup.roll_hour(at(6, 11, 59)));
        assert!(!dedup.should_notify("A"));
        assert!(dedup.should_notify("B"));
    }

    #[test]
    fn test_hour_change_resets() {
        let mut dedup = NotificationDeduplicator::starting_at(at(6, 11, 30));
        dedup.mark_notified("A");

        assert!(dedup.roll_hour(at(6, 12, 0)));
        assert!(dedup.should_notify("A"));
        assert_eq!(dedup.notified_count(), 0);

        // Only one reset per hour change
        dedup.mark_notified("A");
        assert!(!dedup.roll_hour(at(6, 12, 1)));
        assert!(!dedup.should_notify("A"));
    }

    #[test]
    fn test_same_hour_next_day_resets() {
        let mut dedup = NotificationDeduplicator::starting_at(at(6, 11, 0));
        dedup.mark_notified("A");

        assert!(dedup.roll_hour(at(7, 11, 0)));
        assert!(dedup.should_notify("A"));
    }

    #[test]
    fn test_first_roll_only_sets_marker() {
        let mut dedup = NotificationDeduplicator::new();
        dedup.mark_notified("A");

        assert!(!dedup.roll_hour(at(6, 9, 0)));
        assert!(!dedup.should_notify("A"));
    }
}
