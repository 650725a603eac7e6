//! Courier scheduling calendar for slotwatch.
//!
//! Provides the scheduling API client and slot extraction.

pub mod client;
pub mod extract;
pub mod types;

pub use client::ScheduleClient;
pub use extract::extract_available;
pub use types::{BookingResponse, CalendarSnapshot, Day, DayStatus, Slot, SlotStatus, SlotTags, Zone};
