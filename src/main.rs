use std::time::Duration;

use dotenvy::dotenv;
use rust_live_chat::{backend, config, sync::SyncClient, ui::ChatApp};
use tokio::sync::mpsc;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    dotenv().ok();
    env_logger::init();

    let app_config = config::load_config();
    log::info!(
        "Starting chat for app {} ({})",
        app_config.app_id,
        app_config.messages_collection()
    );

    // UI -> sync client
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // sync client -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let backend = backend::connect(&app_config.backend);
    let client = SyncClient::new(
        backend,
        app_config.messages_collection(),
        app_config.auth_token.clone(),
        event_tx,
        cmd_rx,
    );
    let sync_task = tokio::spawn(client.run());

    let options = eframe::NativeOptions::default();
    let mut parts = Some((cmd_tx, event_rx));

    let result = eframe::run_native(
        "Live Chat",
        options,
        Box::new(move |cc| {
            let (command_sender, event_receiver) = parts
                .take()
                .expect("ChatApp should only be initialized once");
            Ok(Box::new(ChatApp::new(cc, command_sender, event_receiver)))
        }),
    );

    // The window is gone and with it the command sender; let the client unsubscribe.
    match tokio::time::timeout(SHUTDOWN_GRACE, sync_task).await {
        Ok(Err(err)) => log::error!("Sync client task failed: {err}"),
        Ok(Ok(())) => {}
        Err(_) => log::warn!("Sync client still running at exit; dropping it"),
    }

    result
}
