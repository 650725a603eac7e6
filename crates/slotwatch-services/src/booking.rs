//! Auto-booking policy and reservation attempts.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use std::collections::HashSet;

use slotwatch_calendar::{BookingResponse, ScheduleClient, Slot};
use slotwatch_core::{BookingConfig, BookingError, CourierTimeZone, TimeWindow};

use crate::window;

/// Something that can reserve a slot on the provider side.
pub trait SlotReserver {
    async fn reserve(&self, access_token: &str, slot_id: &str) -> Result<BookingResponse, BookingError>;
}

impl SlotReserver for ScheduleClient {
    async fn reserve(&self, access_token: &str, slot_id: &str) -> Result<BookingResponse, BookingError> {
        self.book_slot(access_token, slot_id).await
    }
}

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub enabled: bool,
    pub windows: Vec<TimeWindow>,
    pub min_lead_time: Duration,
    pub excluded_days: HashSet<u32>,
}

impl From<&BookingConfig> for BookingPolicy {
    fn from(config: &BookingConfig) -> Self {
        Self {
            enabled: config.enabled,
            windows: config.windows.clone(),
            // Out-of-range lead times saturate, so nothing is ever close enough
            min_lead_time: Duration::try_minutes(config.min_lead_time_minutes).unwrap_or(Duration::MAX),
            excluded_days: config.excluded_days.iter().copied().collect(),
        }
    }
}

/// Why a slot may or may not be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Disabled,
    InvalidTime,
    OutsideWindows,
    InsufficientLeadTime,
    ExcludedDay(u32),
}

impl BookingPolicy {
    pub fn check_eligibility(
        &self,
        slot: &Slot,
        now: DateTime<Utc>,
        zone: &CourierTimeZone,
    ) -> Eligibility {
        if !self.enabled {
            return Eligibility::Disabled;
        }

        let (Some(start), Some(local_start)) = (slot.start_utc(), zone.local_from_millis(slot.start_time))
        else {
            return Eligibility::InvalidTime;
        };

        if !window::matches(slot, &self.windows, zone) {
            return Eligibility::OutsideWindows;
        }

        // Strict: a slot starting exactly at now + lead is too close
        match now.checked_add_signed(self.min_lead_time) {
            Some(earliest) if start > earliest => {}
            _ => return Eligibility::InsufficientLeadTime,
        }

        let day = local_start.day();
        if self.excluded_days.contains(&day) {
            return Eligibility::ExcludedDay(day);
        }

        Eligibility::Eligible
    }
}

/// Result of one reservation attempt, reported to the notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingOutcome {
    pub slot_id: String,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
    pub label: String,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Applies the policy and remembers every slot it tried to reserve.
///
/// A slot id enters the ledger before its reservation request goes out and
/// never leaves, so a failed or ambiguous attempt is not repeated.
#[derive(Debug)]
pub struct BookingEngine {
    policy: BookingPolicy,
    attempted: HashSet<String>,
}

impl BookingEngine {
    pub fn new(policy: BookingPolicy) -> Self {
        Self {
            policy,
            attempted: HashSet::new(),
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn was_attempted(&self, slot_id: &str) -> bool {
        self.attempted.contains(slot_id)
    }

    /// Reserve the slot if the policy allows it. `None` means no attempt was made.
    pub async fn evaluate<R: SlotReserver>(
        &mut self,
        slot: &Slot,
        now: DateTime<Utc>,
        zone: &CourierTimeZone,
        reserver: &R,
        access_token: &str,
    ) -> Option<BookingOutcome> {
        if self.attempted.contains(&slot.id) {
            return None;
        }

        match self.policy.check_eligibility(slot, now, zone) {
            Eligibility::Eligible => {}
            Eligibility::Disabled => return None,
            reason => {
                tracing::debug!(slot_id = %slot.id, ?reason, "Slot not booked");
                return None;
            }
        }

        let local_start = zone.local_from_millis(slot.start_time)?;
        let local_end = zone.local_from_millis(slot.end_time)?;

        self.attempted.insert(slot.id.clone());
        tracing::info!(slot_id = %slot.id, start = %local_start, "Booking slot");

        let (success, error_message) = match reserver.reserve(access_token, &slot.id).await {
            Ok(response) => (response.success, response.error_message),
            Err(e) => {
                tracing::warn!(slot_id = %slot.id, "Booking failed: {}", e);
                (false, Some(e.to_string()))
            }
        };

        if success {
            tracing::info!(slot_id = %slot.id, "Slot booked");
        } else {
            tracing::warn!(slot_id = %slot.id, error = ?error_message, "Booking not accepted");
        }

        Some(BookingOutcome {
            slot_id: slot.id.clone(),
            local_start,
            local_end,
            label: slot.label().to_string(),
            success,
            error_message,
        })
    }
}
