use color_eyre::eyre::{eyre, Result};
use std::sync::Arc;
use tracing::info;

use voice_journal::api::ApiClient;
use voice_journal::app::{App, Services};
use voice_journal::config::Config;
use voice_journal::entry_store::{EntryStore, StoreTimings};
use voice_journal::logging;
use voice_journal::playback::{backend_from_config, PlaybackSettings, Player};
use voice_journal::ui::Tui;
use voice_journal::voice::{Transcriber, VoiceCalibrator};
use voice_journal::voice_events::VoiceEvents;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::load()?;
    logging::init(&config.log_path())?;
    info!(api = %config.api.base_url, backend = ?config.playback.backend, "starting");

    let client = ApiClient::new(&config.api)?;
    let voice_events = VoiceEvents::new();
    let store = EntryStore::new(
        Arc::new(client.clone()),
        StoreTimings::from(&config.timing),
        voice_events.clone(),
    );

    let backend = backend_from_config(&config.playback, Arc::new(client.clone()))
        .map_err(|e| eyre!("Failed to set up playback: {}", e))?;
    let player = Player::new(backend, PlaybackSettings::from(&config.playback));

    let services = Services {
        transcriber: Arc::new(Transcriber::new(Arc::new(client.clone()), voice_events)),
        calibrator: Arc::new(VoiceCalibrator::new(Arc::new(client.clone()))),
        community: config.community.clone(),
        client,
    };

    let mut tui = Tui::new()?;
    App::new(store, player, services).run(&mut tui).await
}
