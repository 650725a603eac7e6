pub mod config;
pub mod error;
pub mod http;
pub mod timezone;

pub use config::{
    AccountConfig, ApiConfig, BookingConfig, Config, NotifyConfig, PollingConfig, TimeWindow,
    ValidationResult, WebhookConfig,
};
pub use error::{
    AppError, AuthError, BookingError, ConfigError, ErrorKind, NotifyError, ReqwestErrorExt,
    TransportError,
};
pub use http::DeviceIdentity;
pub use timezone::CourierTimeZone;

use anyhow::Result;

/// Initialize logging for the process.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("slotwatch core initialized");
    Ok(())
}
