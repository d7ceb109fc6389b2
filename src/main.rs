use notification_hub::{
    ConfigError, HubConfig, NotificationHub, TransportError, use_notification_all, watch_notification_status,
};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("configuration invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("notification hub init failed: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt::init();

    let config = HubConfig::from_env()?;
    let hub = NotificationHub::from_config(config)?;
    let ctx = hub.context();

    // Toaster: surface every notification.
    let _toaster = use_notification_all(&ctx, |event| {
        tracing::info!(
            kind = event.payload_type().unwrap_or(&event.event_type),
            data = %event.data,
            "notification received"
        );
    });

    if let Some(mut changes) = watch_notification_status(&ctx) {
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = changes.borrow_and_update().clone();
                tracing::info!(phase = ?state.phase, session_id = ?state.session_id, "connection status changed");
            }
        });
    }

    let session_id = hub.start();
    tracing::info!(%session_id, "notification hub running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    hub.close();
    tracing::info!("notification hub stopped");
    Ok(())
}
