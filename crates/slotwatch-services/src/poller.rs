//! The poll cycle and the loop that drives it.
//!
//! One cycle: token, calendar, extraction, notify-window matching with
//! per-hour deduplication, then the booking policy. The loop runs cycles on a
//! fixed interval, one at a time, and decides after each failed cycle whether
//! to keep going.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use slotwatch_auth::{CredentialCache, CredentialStore};
use slotwatch_calendar::{extract_available, CalendarSnapshot, ScheduleClient};
use slotwatch_core::{AppError, AuthError, CourierTimeZone, ErrorKind, TimeWindow, TransportError};

use crate::booking::{BookingEngine, SlotReserver};
use crate::dedup::NotificationDeduplicator;
use crate::notifier::{Notifier, SlotAlert};
use crate::window;

/// Hands out an access token for the next requests.
pub trait TokenSource {
    async fn access_token(&self) -> Result<String, AuthError>;
}

impl<C: CredentialCache> TokenSource for CredentialStore<C> {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.get_valid_access_token().await
    }
}

/// Reads the current scheduling calendar.
pub trait CalendarSource {
    async fn fetch(&self, access_token: &str) -> Result<CalendarSnapshot, TransportError>;
}

impl CalendarSource for ScheduleClient {
    async fn fetch(&self, access_token: &str) -> Result<CalendarSnapshot, TransportError> {
        self.fetch_calendar(access_token).await
    }
}

/// State carried from one cycle to the next.
#[derive(Debug)]
pub struct PollState {
    pub dedup: NotificationDeduplicator,
    pub booking: BookingEngine,
}

impl PollState {
    pub fn new(booking: BookingEngine) -> Self {
        Self {
            dedup: NotificationDeduplicator::new(),
            booking,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Available slots in the snapshot
    pub available: usize,
    /// Slots announced this cycle
    pub alerted: usize,
    pub booking_attempts: usize,
    pub booked: usize,
}

#[derive(Debug)]
pub enum CycleResult {
    Ok(CycleSummary),
    Failed(AppError),
}

impl CycleResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CycleResult::Ok(_))
    }
}

/// Everything one cycle needs besides its state.
pub struct PollCycle<T, S, N> {
    tokens: T,
    schedule: S,
    notifier: N,
    notify_windows: Vec<TimeWindow>,
    zone: CourierTimeZone,
    dump_path: Option<PathBuf>,
}

impl<T, S, N> PollCycle<T, S, N>
where
    T: TokenSource,
    S: CalendarSource + SlotReserver,
    N: Notifier,
{
    pub fn new(tokens: T, schedule: S, notifier: N, notify_windows: Vec<TimeWindow>, zone: CourierTimeZone) -> Self {
        Self {
            tokens,
            schedule,
            notifier,
            notify_windows,
            zone,
            dump_path: None,
        }
    }

    /// Write every fetched snapshot to this file.
    pub fn with_dump_path(mut self, path: Option<PathBuf>) -> Self {
        self.dump_path = path;
        self
    }

    #[instrument(skip(self, state), level = "debug")]
    pub async fn run(&self, state: &mut PollState, now: DateTime<Utc>) -> CycleResult {
        let token = match self.tokens.access_token().await {
            Ok(token) => token,
            Err(e) => return CycleResult::Failed(e.into()),
        };

        let snapshot = match self.schedule.fetch(&token).await {
            Ok(snapshot) => snapshot,
            Err(e) => return CycleResult::Failed(e.into()),
        };

        if let Some(path) = &self.dump_path {
            self.dump_snapshot(path, &snapshot).await;
        }

        let available = extract_available(&snapshot);
        state.dedup.roll_hour(self.zone.to_local(now));

        let mut batch = HashSet::new();
        let alerts: Vec<SlotAlert> = available
            .iter()
            .filter(|slot| window::matches(slot, &self.notify_windows, &self.zone))
            .filter(|slot| state.dedup.should_notify(&slot.id))
            .filter(|slot| batch.insert(slot.id.as_str()))
            .filter_map(|slot| SlotAlert::from_slot(slot, &self.zone))
            .collect();

        // Alerts that reached the webhook are marked even when a later message failed
        let (delivered, notify_failure) = match self.notifier.notify_slots(&alerts).await {
            Ok(()) => (alerts.len(), None),
            Err(e) => {
                tracing::warn!(delivered = e.delivered, "Slot notification failed: {}", e.source);
                (e.delivered.min(alerts.len()), Some(e.source))
            }
        };
        for alert in &alerts[..delivered] {
            state.dedup.mark_notified(&alert.slot_id);
        }

        let mut summary = CycleSummary {
            available: available.len(),
            alerted: delivered,
            ..CycleSummary::default()
        };

        for slot in &available {
            let Some(outcome) = state
                .booking
                .evaluate(slot, now, &self.zone, &self.schedule, &token)
                .await
            else {
                continue;
            };

            summary.booking_attempts += 1;
            if outcome.success {
                summary.booked += 1;
            }
            if let Err(e) = self.notifier.notify_booking(&outcome).await {
                tracing::error!(slot_id = %outcome.slot_id, "Failed to report booking: {}", e);
            }
        }

        match notify_failure {
            Some(e) => CycleResult::Failed(e.into()),
            None => CycleResult::Ok(summary),
        }
    }

    async fn dump_snapshot(&self, path: &Path, snapshot: &CalendarSnapshot) {
        let written = match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => tokio::fs::write(path, bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = written {
            tracing::warn!("Failed to dump calendar to {}: {}", path.display(), e);
        }
    }
}

/// Which failed cycles stop the loop.
#[derive(Debug, Clone, Default)]
pub struct LoopPolicy {
    fatal: HashSet<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDecision {
    Continue,
    Stop,
}

impl LoopPolicy {
    pub fn new(fatal: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            fatal: fatal.into_iter().collect(),
        }
    }

    pub fn decide(&self, result: &CycleResult) -> LoopDecision {
        match result {
            CycleResult::Failed(e) if self.fatal.contains(&e.kind()) => LoopDecision::Stop,
            _ => LoopDecision::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    Fatal(ErrorKind),
}

pub struct PollLoop<T, S, N> {
    cycle: PollCycle<T, S, N>,
    state: PollState,
    policy: LoopPolicy,
    interval: Duration,
}

impl<T, S, N> PollLoop<T, S, N>
where
    T: TokenSource,
    S: CalendarSource + SlotReserver,
    N: Notifier,
{
    pub fn new(cycle: PollCycle<T, S, N>, state: PollState, policy: LoopPolicy, interval: Duration) -> Self {
        Self {
            cycle,
            state,
            policy,
            interval,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Run cycles until cancelled or a fatal error kind comes up.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// delays the next tick instead of causing a burst.
    pub async fn run(&mut self, cancel: CancellationToken) -> LoopExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Polling every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Poll loop cancelled");
                    return LoopExit::Shutdown;
                }
                _ = ticker.tick() => {
                    let result = self.cycle.run(&mut self.state, Utc::now()).await;
                    match &result {
                        CycleResult::Ok(summary) => tracing::info!(
                            available = summary.available,
                            alerted = summary.alerted,
                            booking_attempts = summary.booking_attempts,
                            booked = summary.booked,
                            "Poll cycle complete"
                        ),
                        CycleResult::Failed(e) => tracing::error!(
                            kind = %e.kind(),
                            "Poll cycle failed: {} ({})",
                            e,
                            e.user_message()
                        ),
                    }

                    if self.policy.decide(&result) == LoopDecision::Stop {
                        if let CycleResult::Failed(e) = result {
                            tracing::error!("Stopping after fatal {} error", e.kind());
                            return LoopExit::Fatal(e.kind());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingOutcome, BookingPolicy};
    use crate::notifier::SlotDeliveryError;
    use chrono::{FixedOffset, TimeZone};
    use parking_lot::Mutex;
    use slotwatch_calendar::{BookingResponse, Day, DayStatus, Slot, SlotStatus, SlotTags, Zone};
    use slotwatch_core::{BookingConfig, BookingError, NotifyError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTokens {
        calls: AtomicUsize,
        /// Calls from this index on fail with an auth error
        fail_from: usize,
    }

    impl FakeTokens {
        fn working() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from: usize::MAX,
            }
        }

        fn failing_from(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from: call,
            }
        }
    }

    impl TokenSource for FakeTokens {
        async fn access_token(&self) -> Result<String, AuthError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from {
                Err(AuthError::IssueFailed("401: invalid credentials".to_string()))
            } else {
                Ok("token".to_string())
            }
        }
    }

    #[derive(Default)]
    struct FakeSchedule {
        snapshot: Mutex<CalendarSnapshot>,
        /// HTTP status to fail calendar fetches with
        fetch_failure: Mutex<Option<u16>>,
        reservations: Mutex<Vec<String>>,
    }

    impl FakeSchedule {
        fn with_slots(slots: Vec<Slot>) -> Self {
            let schedule = Self::default();
            schedule.set_slots(slots);
            schedule
        }

        fn set_slots(&self, slots: Vec<Slot>) {
            *self.snapshot.lock() = CalendarSnapshot {
                days: vec![Day {
                    status: DayStatus::Available,
                    zones_schedule: vec![Zone { slots }],
                }],
            };
        }
    }

    impl CalendarSource for FakeSchedule {
        async fn fetch(&self, _access_token: &str) -> Result<CalendarSnapshot, TransportError> {
            if let Some(status) = *self.fetch_failure.lock() {
                return Err(TransportError::Status {
                    status,
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.snapshot.lock().clone())
        }
    }

    impl SlotReserver for FakeSchedule {
        async fn reserve(&self, _access_token: &str, slot_id: &str) -> Result<BookingResponse, BookingError> {
            self.reservations.lock().push(slot_id.to_string());
            Ok(BookingResponse {
                success: true,
                error_message: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        batches: Mutex<Vec<Vec<String>>>,
        bookings: Mutex<Vec<BookingOutcome>>,
        /// Fail slot batches after delivering this many alerts
        fail_after: Mutex<Option<usize>>,
    }

    impl FakeNotifier {
        fn alerted_ids(&self) -> Vec<Vec<String>> {
            self.batches.lock().clone()
        }
    }

    impl Notifier for FakeNotifier {
        async fn notify_slots(&self, alerts: &[SlotAlert]) -> Result<(), SlotDeliveryError> {
            let fail_after = *self.fail_after.lock();
            let delivered = fail_after.map_or(alerts.len(), |n| n.min(alerts.len()));
            if delivered > 0 {
                self.batches
                    .lock()
                    .push(alerts[..delivered].iter().map(|a| a.slot_id.clone()).collect());
            }
            match fail_after {
                Some(_) => Err(SlotDeliveryError {
                    delivered,
                    source: NotifyError::WebhookStatus {
                        status: 503,
                        message: "down".to_string(),
                    },
                }),
                None => Ok(()),
            }
        }

        async fn notify_booking(&self, outcome: &BookingOutcome) -> Result<(), NotifyError> {
            self.bookings.lock().push(outcome.clone());
            Ok(())
        }
    }

    fn utc() -> CourierTimeZone {
        CourierTimeZone::Fixed(FixedOffset::east_opt(0).unwrap())
    }

    fn slot(id: &str, day: u32, start_hour: u32, end_hour: u32) -> Slot {
        Slot {
            id: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, day, start_hour, 0, 0).unwrap().timestamp_millis(),
            end_time: Utc.with_ymd_and_hms(2024, 3, day, end_hour, 0, 0).unwrap().timestamp_millis(),
            status: SlotStatus::Available,
            tags: SlotTags {
                label: Some("x1.0".to_string()),
            },
        }
    }

    fn cycle(
        tokens: FakeTokens,
        schedule: FakeSchedule,
    ) -> PollCycle<FakeTokens, FakeSchedule, FakeNotifier> {
        PollCycle::new(
            tokens,
            schedule,
            FakeNotifier::default(),
            vec![TimeWindow::new(11, 20)],
            utc(),
        )
    }

    fn disabled_booking() -> PollState {
        PollState::new(BookingEngine::new(BookingPolicy::from(&BookingConfig::default())))
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_new_slot_is_notified_once_per_hour() {
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]));
        let mut state = disabled_booking();

        let first = cycle.run(&mut state, at(6, 10, 0)).await;
        assert!(matches!(first, CycleResult::Ok(CycleSummary { available: 1, alerted: 1, .. })));
        assert_eq!(cycle.notifier.alerted_ids(), vec![vec!["A".to_string()]]);
        assert!(!state.dedup.should_notify("A"));

        // Same hour, slot still open
        let second = cycle.run(&mut state, at(6, 10, 30)).await;
        assert!(matches!(second, CycleResult::Ok(CycleSummary { alerted: 0, .. })));
        assert_eq!(cycle.notifier.alerted_ids().len(), 1);

        // Next hour it is announced again
        cycle.run(&mut state, at(6, 11, 0)).await;
        assert_eq!(cycle.notifier.alerted_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_slot_outside_notify_windows_is_ignored() {
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(vec![slot("early", 6, 9, 10)]));
        let mut state = disabled_booking();

        let result = cycle.run(&mut state, at(6, 8, 0)).await;

        assert!(matches!(result, CycleResult::Ok(CycleSummary { available: 1, alerted: 0, .. })));
        assert!(cycle.notifier.alerted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_snapshot_alert_once() {
        let cycle = cycle(
            FakeTokens::working(),
            FakeSchedule::with_slots(vec![slot("A", 6, 11, 13), slot("A", 6, 11, 13)]),
        );
        let mut state = disabled_booking();

        cycle.run(&mut state, at(6, 10, 0)).await;

        assert_eq!(cycle.notifier.alerted_ids(), vec![vec!["A".to_string()]]);
    }

    #[tokio::test]
    async fn test_auth_failure_fails_cycle_without_fetching() {
        let cycle = cycle(FakeTokens::failing_from(0), FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]));
        let mut state = disabled_booking();

        let result = cycle.run(&mut state, at(6, 10, 0)).await;

        match result {
            CycleResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::Auth),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(cycle.notifier.alerted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state_untouched() {
        let schedule = FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]);
        let cycle = cycle(FakeTokens::working(), schedule);
        let mut state = disabled_booking();

        cycle.run(&mut state, at(6, 10, 0)).await;
        assert!(!state.dedup.should_notify("A"));

        // The hour changes while the provider is down
        *cycle.schedule.fetch_failure.lock() = Some(503);
        let failed = cycle.run(&mut state, at(6, 11, 0)).await;
        match failed {
            CycleResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::Transport),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!state.dedup.should_notify("A"));
        assert_eq!(cycle.notifier.alerted_ids().len(), 1);

        // Recovery in the new hour announces the slot again
        *cycle.schedule.fetch_failure.lock() = None;
        assert!(cycle.run(&mut state, at(6, 11, 1)).await.is_ok());
        assert_eq!(cycle.notifier.alerted_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_notifier_failure_marks_nothing() {
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]));
        let mut state = disabled_booking();

        *cycle.notifier.fail_after.lock() = Some(0);
        let failed = cycle.run(&mut state, at(6, 10, 0)).await;
        match failed {
            CycleResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::Notify),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(state.dedup.should_notify("A"));

        *cycle.notifier.fail_after.lock() = None;
        cycle.run(&mut state, at(6, 10, 1)).await;
        assert_eq!(cycle.notifier.alerted_ids(), vec![vec!["A".to_string()]]);
    }

    #[tokio::test]
    async fn test_partial_delivery_marks_delivered_alerts() {
        let slots = (0..11).map(|i| slot(&format!("S{}", i), 6, 11, 13)).collect();
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(slots));
        let mut state = disabled_booking();

        *cycle.notifier.fail_after.lock() = Some(10);
        let failed = cycle.run(&mut state, at(6, 10, 0)).await;
        match failed {
            CycleResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::Notify),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!state.dedup.should_notify("S0"));
        assert!(!state.dedup.should_notify("S9"));
        assert!(state.dedup.should_notify("S10"));

        // Same hour: only the undelivered slot goes out again
        *cycle.notifier.fail_after.lock() = None;
        let retried = cycle.run(&mut state, at(6, 10, 1)).await;
        assert!(matches!(retried, CycleResult::Ok(CycleSummary { alerted: 1, .. })));
        assert_eq!(cycle.notifier.alerted_ids()[1], vec!["S10".to_string()]);
    }

    #[tokio::test]
    async fn test_booking_still_runs_when_alerts_fail() {
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(vec![slot("day7", 7, 14, 16)]));
        let mut state = PollState::new(BookingEngine::new(BookingPolicy::from(&BookingConfig {
            enabled: true,
            windows: vec![TimeWindow::new(13, 20)],
            min_lead_time_minutes: 12 * 60,
            excluded_days: Vec::new(),
        })));

        *cycle.notifier.fail_after.lock() = Some(0);
        let result = cycle.run(&mut state, at(4, 8, 0)).await;

        match result {
            CycleResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::Notify),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*cycle.schedule.reservations.lock(), vec!["day7".to_string()]);
        assert!(state.booking.was_attempted("day7"));
        assert_eq!(cycle.notifier.bookings.lock().len(), 1);
        assert!(state.dedup.should_notify("day7"));
    }

    #[tokio::test]
    async fn test_booking_runs_on_all_available_slots() {
        let schedule = FakeSchedule::with_slots(vec![
            slot("day6", 6, 14, 16),
            slot("day7", 7, 14, 16),
            slot("morning", 7, 9, 10),
        ]);
        let cycle = cycle(FakeTokens::working(), schedule);
        let mut state = PollState::new(BookingEngine::new(BookingPolicy::from(&BookingConfig {
            enabled: true,
            windows: vec![TimeWindow::new(13, 20)],
            min_lead_time_minutes: 12 * 60,
            excluded_days: vec![6, 11],
        })));

        let result = cycle.run(&mut state, at(4, 8, 0)).await;

        assert!(matches!(
            result,
            CycleResult::Ok(CycleSummary { booking_attempts: 1, booked: 1, .. })
        ));
        assert_eq!(*cycle.schedule.reservations.lock(), vec!["day7".to_string()]);
        assert_eq!(cycle.notifier.bookings.lock().len(), 1);

        // Never attempted twice
        cycle.run(&mut state, at(4, 8, 1)).await;
        assert_eq!(cycle.schedule.reservations.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_dump_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("calendar.json");
        let cycle = cycle(FakeTokens::working(), FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]))
            .with_dump_path(Some(dump.clone()));
        let mut state = disabled_booking();

        cycle.run(&mut state, at(6, 10, 0)).await;

        let written: CalendarSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&dump).unwrap()).unwrap();
        assert_eq!(written.days[0].zones_schedule[0].slots[0].id, "A");
    }

    #[test]
    fn test_loop_policy() {
        let default_policy = LoopPolicy::default();
        let strict = LoopPolicy::new([ErrorKind::Auth]);
        let auth_failure = CycleResult::Failed(AuthError::MissingAccessToken.into());
        let fetch_failure = CycleResult::Failed(TransportError::Timeout.into());

        assert_eq!(default_policy.decide(&auth_failure), LoopDecision::Continue);
        assert_eq!(strict.decide(&auth_failure), LoopDecision::Stop);
        assert_eq!(strict.decide(&fetch_failure), LoopDecision::Continue);
        assert_eq!(
            strict.decide(&CycleResult::Ok(CycleSummary::default())),
            LoopDecision::Continue
        );
    }

    #[tokio::test]
    async fn test_loop_survives_failures_until_fatal() {
        let schedule = FakeSchedule::with_slots(vec![slot("A", 6, 11, 13)]);
        *schedule.fetch_failure.lock() = Some(500);
        let cycle = cycle(FakeTokens::failing_from(3), schedule);
        let mut poll_loop = PollLoop::new(
            cycle,
            disabled_booking(),
            LoopPolicy::new([ErrorKind::Auth]),
            Duration::from_millis(1),
        );

        let exit = poll_loop.run(CancellationToken::new()).await;

        assert_eq!(exit, LoopExit::Fatal(ErrorKind::Auth));
        assert_eq!(poll_loop.cycle.tokens.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let cycle = cycle(FakeTokens::working(), FakeSchedule::default());
        let mut poll_loop = PollLoop::new(cycle, disabled_booking(), LoopPolicy::default(), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(poll_loop.run(cancel).await, LoopExit::Shutdown);
        assert_eq!(poll_loop.cycle.tokens.calls.load(Ordering::SeqCst), 0);
    }
}
