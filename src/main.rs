// main.rs
use cli_log::{info, init_cli_log};
use color_eyre::eyre::WrapErr;
use ragbus::bus::MessageBus;
use ragbus::config::Config;
use ragbus::coordinator::Coordinator;
use ragbus::provider;
use ragbus::service::RagService;
use ragbus::ui::UI;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    // Writes a log file only when RAGBUS_LOG is set, e.g. RAGBUS_LOG=debug.
    init_cli_log!("ragbus");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = Config::load_or_default(&config_path)
        .wrap_err_with(|| format!("loading configuration from {}", config_path.display()))?;
    info!("Configuration: {:?}", config);

    let (embedder, generator) = provider::from_config(&config.provider);
    let bus = MessageBus::new();
    let coordinator = Coordinator::new(config, bus, embedder, generator)?;
    let service = Arc::new(RagService::new(coordinator));

    let mut ui = UI::new(service);
    ui.run().await?;
    Ok(())
}
