use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use slotwatch_auth::{AccountCredentials, AuthClient, CredentialStore, FileCredentialCache};
use slotwatch_calendar::ScheduleClient;
use slotwatch_core::{Config, DeviceIdentity};
use slotwatch_services::{
    BookingEngine, BookingPolicy, LoopExit, LoopPolicy, PollCycle, PollLoop, PollState,
    WebhookNotifier,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize core
    slotwatch_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    let zone = config.courier_time_zone()?;
    let timeout = Duration::from_secs(config.api.timeout_secs);
    let identity = DeviceIdentity::from_account(&config.account);

    let auth = AuthClient::new(&config.api.base_url, identity.clone(), timeout)
        .context("Failed to build auth client")?;
    let store = CredentialStore::new(
        auth,
        FileCredentialCache::new(&config.token_path),
        AccountCredentials {
            username: config.account.username.clone(),
            password: config.account.password.clone(),
        },
    );
    let schedule = ScheduleClient::new(&config.api.base_url, identity, timeout)
        .context("Failed to build scheduling client")?;
    let notifier = WebhookNotifier::new(&config.webhook, timeout)
        .context("Failed to build webhook notifier")?;

    let cycle = PollCycle::new(store, schedule, notifier, config.notify.windows.clone(), zone)
        .with_dump_path(config.polling.calendar_dump_path.clone());
    let state = PollState::new(BookingEngine::new(BookingPolicy::from(&config.booking)));
    let policy = LoopPolicy::new(config.polling.fatal_kinds());
    let mut poll_loop = PollLoop::new(
        cycle,
        state,
        policy,
        Duration::from_secs(config.polling.interval_secs),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
        }
        on_signal.cancel();
    });

    tracing::info!(
        city = %config.account.city_code,
        booking = config.booking.enabled,
        "slotwatch started"
    );

    match poll_loop.run(cancel).await {
        LoopExit::Shutdown => Ok(()),
        LoopExit::Fatal(kind) => anyhow::bail!("Stopped after a fatal {} error", kind),
    }
}
