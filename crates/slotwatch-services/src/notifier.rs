//! Slot and booking notifications, delivered to a Discord-compatible webhook.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;

use slotwatch_calendar::Slot;
use slotwatch_core::{CourierTimeZone, NotifyError, WebhookConfig};

use crate::booking::BookingOutcome;
use crate::retry::{deliver_with_retry, RetryConfig};

/// Discord accepts at most this many embeds per message.
const MAX_EMBEDS_PER_MESSAGE: usize = 10;

const SLOT_COLOR: u32 = 0xFFB700;
const BOOKED_COLOR: u32 = 0x2ECC71;
const FAILED_COLOR: u32 = 0xE74C3C;

/// A newly seen slot, in the courier's local time.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotAlert {
    pub slot_id: String,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
    pub label: String,
}

impl SlotAlert {
    pub fn from_slot(slot: &Slot, zone: &CourierTimeZone) -> Option<Self> {
        Some(Self {
            slot_id: slot.id.clone(),
            local_start: zone.local_from_millis(slot.start_time)?,
            local_end: zone.local_from_millis(slot.end_time)?,
            label: slot.label().to_string(),
        })
    }
}

/// A slot batch that failed part way through.
///
/// The first `delivered` alerts of the batch reached the webhook before `source`.
#[derive(Debug, thiserror::Error)]
#[error("{source} ({delivered} alerts delivered)")]
pub struct SlotDeliveryError {
    pub delivered: usize,
    pub source: NotifyError,
}

/// Where alerts and booking results go.
pub trait Notifier {
    /// Announce a batch of slots. An empty batch sends nothing.
    async fn notify_slots(&self, alerts: &[SlotAlert]) -> Result<(), SlotDeliveryError>;

    async fn notify_booking(&self, outcome: &BookingOutcome) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    username: &'a str,
    embeds: &'a [Embed],
}

#[derive(Debug, Clone, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

impl EmbedField {
    fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
            inline: true,
        }
    }
}

/// Discord field values must not be empty.
fn non_empty(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn slot_embed(alert: &SlotAlert) -> Embed {
    Embed {
        title: "Sloty".to_string(),
        description: "Są wolne sloty!!".to_string(),
        color: SLOT_COLOR,
        fields: vec![
            EmbedField::new("Data", alert.local_start.format("%d/%m/%Y").to_string()),
            EmbedField::new("Start", alert.local_start.format("%H:%M").to_string()),
            EmbedField::new("Koniec", alert.local_end.format("%H:%M").to_string()),
            EmbedField::new("Mnożnik", non_empty(&alert.label)),
        ],
    }
}

fn booking_embed(outcome: &BookingOutcome) -> Embed {
    let mut fields = vec![
        EmbedField::new("Data", outcome.local_start.format("%d/%m/%Y").to_string()),
        EmbedField::new("Start", outcome.local_start.format("%H:%M").to_string()),
        EmbedField::new("Koniec", outcome.local_end.format("%H:%M").to_string()),
        EmbedField::new("Mnożnik", non_empty(&outcome.label)),
    ];

    if outcome.success {
        Embed {
            title: "Zarezerwowano slot".to_string(),
            description: format!("Slot {} został zarezerwowany", outcome.slot_id),
            color: BOOKED_COLOR,
            fields,
        }
    } else {
        fields.push(EmbedField {
            name: "Błąd",
            value: non_empty(outcome.error_message.as_deref().unwrap_or_default()),
            inline: false,
        });
        Embed {
            title: "Rezerwacja nieudana".to_string(),
            description: format!("Nie udało się zarezerwować slotu {}", outcome.slot_id),
            color: FAILED_COLOR,
            fields,
        }
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    username: String,
    retry: RetryConfig,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::WebhookFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send(&self, embeds: &[Embed]) -> Result<(), NotifyError> {
        let message = WebhookMessage {
            username: &self.username,
            embeds,
        };

        deliver_with_retry(&self.retry, || self.client.post(&self.url).json(&message).send()).await?;
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn notify_slots(&self, alerts: &[SlotAlert]) -> Result<(), SlotDeliveryError> {
        if alerts.is_empty() {
            return Ok(());
        }

        let embeds: Vec<Embed> = alerts.iter().map(slot_embed).collect();
        let mut delivered = 0;
        for chunk in embeds.chunks(MAX_EMBEDS_PER_MESSAGE) {
            if let Err(source) = self.send(chunk).await {
                return Err(SlotDeliveryError { delivered, source });
            }
            delivered += chunk.len();
        }

        tracing::info!("Sent {} slot notifications", alerts.len());
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(slot_id = %outcome.slot_id, success = outcome.success))]
    async fn notify_booking(&self, outcome: &BookingOutcome) -> Result<(), NotifyError> {
        let embed = booking_embed(outcome);
        self.send(std::slice::from_ref(&embed)).await
    }
}
