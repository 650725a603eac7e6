//! Flattening a calendar snapshot into the slots that can be taken.

use crate::types::{CalendarSnapshot, DayStatus, Slot};

/// Available slots of available days, in day, zone, slot order.
///
/// Repeated ids are kept; each occurrence is evaluated on its own.
pub fn extract_available(snapshot: &CalendarSnapshot) -> Vec<&Slot> {
    snapshot
        .days
        .iter()
        .filter(|day| day.status == DayStatus::Available)
        .flat_map(|day| day.zones_schedule.iter())
        .flat_map(|zone| zone.slots.iter())
        .filter(|slot| slot.is_available())
        .collect()
}
