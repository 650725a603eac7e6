//! Centralized error types for slotwatch.
//!
//! This module provides a typed error hierarchy that:
//! - Separates the failure classes a poll cycle can end with
//! - Provides short operator-facing messages for notifications and logs
//! - Preserves full error context for debugging

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level application error type.
///
/// Every pipeline failure is convertible to this type. Use `kind()` to decide
/// how the poll loop reacts and `user_message()` for a one-line summary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Booking error: {0}")]
    Booking(#[from] BookingError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short message suitable for an operator-facing notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Auth(e) => e.user_message(),
            AppError::Transport(e) => e.user_message(),
            AppError::Booking(e) => e.user_message(),
            AppError::Notify(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed.",
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }

    /// Classify this error for the loop policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Booking(_) => ErrorKind::Booking,
            AppError::Notify(_) => ErrorKind::Notify,
            AppError::Config(_) => ErrorKind::Config,
            AppError::Io(_) | AppError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Coarse error classes a poll cycle can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Auth,
    Transport,
    Booking,
    Notify,
    Config,
    Other,
}

impl ErrorKind {
    /// Parse a kind from its lowercase config name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auth" => Some(Self::Auth),
            "transport" => Some(Self::Transport),
            "booking" => Some(Self::Booking),
            "notify" => Some(Self::Notify),
            "config" => Some(Self::Config),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Booking => "booking",
            Self::Notify => "notify",
            Self::Config => "config",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure to obtain a usable access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Primary username/password exchange failed outright.
    #[error("Token issuance failed: {0}")]
    IssueFailed(String),

    /// Primary exchange answered but without an expiry.
    #[error("Token issuance returned no expiry")]
    MissingExpiry,

    /// Primary exchange answered but without an access token.
    #[error("Token issuance returned no access token")]
    MissingAccessToken,

    #[error("Network error during authentication: {0}")]
    Network(#[from] TransportError),

    #[error("Credential storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::IssueFailed(_) => "Sign-in failed. Check the courier credentials.",
            AuthError::MissingExpiry | AuthError::MissingAccessToken => {
                "Sign-in was rejected by the provider."
            }
            AuthError::Network(_) => "Unable to reach the sign-in service.",
            AuthError::StorageError(_) => "Failed to save credentials.",
        }
    }
}

/// Non-2xx or malformed response from the scheduling provider.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TransportError::ConnectionFailed(_) => "Unable to connect to the scheduling service.",
            TransportError::Timeout => "The scheduling service timed out.",
            TransportError::Status { status, .. } if *status >= 500 => {
                "The scheduling service is experiencing issues."
            }
            TransportError::Status { .. } => "The scheduling service rejected the request.",
            TransportError::Malformed(_) => "Received an unexpected response.",
        }
    }
}

/// A reservation attempt that did not go through.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Reservation of slot {slot_id} rejected: {message}")]
    Rejected { slot_id: String, message: String },

    #[error("Reservation request failed: {0}")]
    Transport(#[from] TransportError),
}

impl BookingError {
    pub fn user_message(&self) -> &'static str {
        match self {
            BookingError::Rejected { .. } => "The slot could not be booked.",
            BookingError::Transport(_) => "The booking request did not complete.",
        }
    }
}

/// Failure to deliver a notification event.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook delivery failed: {0}")]
    WebhookFailed(String),

    #[error("Webhook returned {status}: {message}")]
    WebhookStatus { status: u16, message: String },
}

impl NotifyError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NotifyError::WebhookFailed(_) => "Unable to reach the notification webhook.",
            NotifyError::WebhookStatus { .. } => "The notification webhook rejected the message.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_transport_error(self) -> TransportError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_transport_error(self) -> TransportError {
        if self.is_timeout() {
            TransportError::Timeout
        } else if self.is_connect() {
            TransportError::ConnectionFailed(self.to_string())
        } else if self.is_decode() {
            TransportError::Malformed(self.to_string())
        } else if let Some(status) = self.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            TransportError::ConnectionFailed(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let auth_err = AuthError::MissingExpiry;
        let app_err: AppError = auth_err.into();
        assert!(matches!(app_err, AppError::Auth(AuthError::MissingExpiry)));
        assert_eq!(app_err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_kind_classification() {
        let err: AppError = TransportError::Timeout.into();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err: AppError = NotifyError::WebhookFailed("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Notify);

        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            ErrorKind::Auth,
            ErrorKind::Transport,
            ErrorKind::Booking,
            ErrorKind::Notify,
            ErrorKind::Config,
            ErrorKind::Other,
        ] {
            assert_eq!(ErrorKind::from_name(&kind.to_string()), Some(kind));
        }
        assert_eq!(ErrorKind::from_name("fatal"), None);
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Booking(BookingError::Rejected {
            slot_id: "A".into(),
            message: "taken".into(),
        });
        assert_eq!(app_err.user_message(), "The slot could not be booked.");
    }
}
