// The seam traits are awaited on the poll loop's own task, so their futures carry no Send bound
#![allow(async_fn_in_trait)]

pub mod booking;
pub mod dedup;
pub mod notifier;
pub mod poller;
pub mod retry;
pub mod window;

pub use booking::{BookingEngine, BookingOutcome, BookingPolicy, Eligibility, SlotReserver};
pub use dedup::NotificationDeduplicator;
pub use notifier::{Notifier, SlotAlert, SlotDeliveryError, WebhookNotifier};
pub use poller::{
    CalendarSource, CycleResult, CycleSummary, LoopDecision, LoopExit, LoopPolicy, PollCycle,
    PollLoop, PollState, TokenSource,
};
pub use retry::RetryConfig;
