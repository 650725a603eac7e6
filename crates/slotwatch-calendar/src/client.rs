//! Scheduling API client: calendar reads and slot reservations.

use std::time::Duration;
use tracing::instrument;

use crate::types::{BookingResponse, CalendarSnapshot};
use slotwatch_core::{BookingError, DeviceIdentity, ReqwestErrorExt, TransportError};

const CALENDAR_PATH: &str = "v4/scheduling/calendar";
const SLOTS_PATH: &str = "v4/scheduling/slots";

pub struct ScheduleClient {
    client: reqwest::Client,
    base_url: String,
    identity: DeviceIdentity,
}

impl ScheduleClient {
    pub fn new(base_url: &str, identity: DeviceIdentity, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.into_transport_error())?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    /// Fetch the current scheduling calendar.
    ///
    /// No retries here; a failed fetch fails the poll cycle.
    #[instrument(skip(self, access_token), level = "debug")]
    pub async fn fetch_calendar(&self, access_token: &str) -> Result<CalendarSnapshot, TransportError> {
        let url = format!("{}/{}", self.base_url, CALENDAR_PATH);

        let response = self
            .client
            .get(&url)
            .headers(self.identity.headers(Some(access_token)))
            .send()
            .await
            .map_err(|e| e.into_transport_error())?;

        self.handle_response(response).await
    }

    /// Reserve a slot. Never retried: a second attempt could double-book.
    #[instrument(skip(self, access_token), level = "info")]
    pub async fn book_slot(
        &self,
        access_token: &str,
        slot_id: &str,
    ) -> Result<BookingResponse, BookingError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            SLOTS_PATH,
            urlencoding::encode(slot_id),
        );

        let response = self
            .client
            .put(&url)
            .headers(self.identity.headers(Some(access_token)))
            .json(&serde_json::json!({ "booked": true }))
            .send()
            .await
            .map_err(|e| BookingError::Transport(e.into_transport_error()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BookingError::Rejected {
                slot_id: slot_id.to_string(),
                message: format!("{}: {}", status, text),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| BookingError::Transport(e.into_transport_error()))?;
        if text.trim().is_empty() {
            return Ok(BookingResponse {
                success: true,
                error_message: None,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            BookingError::Transport(TransportError::Malformed(format!(
                "Booking response parse error: {}",
                e
            )))
        })
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| TransportError::Malformed(format!("JSON parse error: {}", e)))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(TransportError::Status {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}
