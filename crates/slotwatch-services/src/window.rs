//! Hour-of-day window matching for slots.

use chrono::Timelike;

use slotwatch_calendar::Slot;
use slotwatch_core::{CourierTimeZone, TimeWindow};

/// Local start and end hour of a slot, `None` if a timestamp is out of range.
pub fn slot_local_hours(slot: &Slot, zone: &CourierTimeZone) -> Option<(u32, u32)> {
    let start = zone.local_from_millis(slot.start_time)?;
    let end = zone.local_from_millis(slot.end_time)?;
    Some((start.hour(), end.hour()))
}

/// Whether a slot's local hours fall inside one window.
///
/// Literal comparison: a slot crossing midnight (end hour below start hour)
/// only matches if both inequalities still hold.
pub fn window_contains(window: &TimeWindow, start_hour: u32, end_hour: u32) -> bool {
    start_hour >= window.start_hour && end_hour <= window.end_hour
}

/// Whether a slot fits at least one of the windows.
pub fn matches(slot: &Slot, windows: &[TimeWindow], zone: &CourierTimeZone) -> bool {
    let Some((start_hour, end_hour)) = slot_local_hours(slot, zone) else {
        tracing::warn!("Slot {} has an out-of-range timestamp", slot.id);
        return false;
    };

    windows
        .iter()
        .any(|window| window_contains(window, start_hour, end_hour))
}
