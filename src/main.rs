mod app;
mod core;
mod events;
mod models;
mod overlay;
mod utils;

use crate::{
    app::{
        config,
        identity::IdentityResolver,
        presenter::Presenter,
        roster::{ROSTER_PATH, Roster},
    },
    core::chat::{ChatAdapter, TwitchIrcTransport},
    overlay::{
        server::{self, ServerState},
        sound::{OverlaySound, load_sound},
        surface::OverlayHub,
    },
};
use eyre::WrapErr;
use std::sync::Arc;
use tokio::{runtime::Runtime, sync::mpsc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), eyre::Report> {
    // Log to a file and to stderr.
    let file_appender = tracing_appender::rolling::never(".", "racechat.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = Runtime::new().wrap_err("Failed to create Tokio runtime")?;
    runtime.block_on(run())
}

async fn run() -> Result<(), eyre::Report> {
    tracing::info!("Starting racechat overlay...");

    let config = Arc::new(config::load().await?);
    let roster = Roster::load_or_default(ROSTER_PATH);
    let identity = IdentityResolver::new(&config, roster)?;

    let hub = OverlayHub::new(64);
    let sound = load_sound(&config.audio).await;
    let sound_path = sound.as_ref().and_then(|sound| sound.local_path().cloned());
    let player = OverlaySound::new(hub.clone(), sound, config.audio.volume);

    let (event_tx, event_rx) = mpsc::channel(100);
    let presenter = Presenter::new(config.clone(), identity, hub.clone(), player);
    tokio::spawn(presenter.run(event_rx));

    let adapter = ChatAdapter::new(TwitchIrcTransport::new(&config), event_tx.clone());
    tokio::spawn(adapter.run());

    let bind = config.overlay.bind;
    let state = Arc::new(ServerState {
        hub,
        event_tx,
        sound_path,
    });
    tokio::spawn(async move {
        if let Err(e) = server::serve(bind, state).await {
            tracing::error!("Overlay server stopped: {:?}", e);
        }
    });

    tracing::info!(
        "Overlay initialized for #{}. Try http://{}/simulate?user=alice&message=hello",
        config.channel_login(),
        bind
    );

    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down.");
    Ok(())
}
