//! # Terminal Game Demo
//!
//! Plays Wahlplakat from a terminal:
//!
//! 1. Restore the stored session, or log in with credentials from the
//!    environment
//! 2. Load the party catalog and join the lobby
//! 3. Type a party name to answer, `/source` to reveal the last source,
//!    `/leave` to leave the game, `/quit` (or Ctrl+C) to close
//!
//! ## Running
//!
//! ```sh
//! WAHLPLAKAT_NICKNAME=ana WAHLPLAKAT_PASSWORD=secret123 cargo run --example play
//!
//! # Override the server:
//! WAHLPLAKAT_URL=https://quiz.example.org cargo run --example play
//! ```

use tokio::io::{AsyncBufReadExt, BufReader};

use wahlplakat_client::audio::LogAudio;
use wahlplakat_client::http::ReqwestBackend;
use wahlplakat_client::session::FileStore;
use wahlplakat_client::transports::SocketIoConnector;
use wahlplakat_client::view::ConsoleView;
use wahlplakat_client::{App, ClientConfig, GameControls, GameExit};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for the channel internals.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env()?;
    tracing::info!("Playing on {}", config.server_url);

    let http = reqwest::Client::new();
    let backend = ReqwestBackend::new(http.clone(), config.clone());
    let store = FileStore::from_config(&config);
    let mut app = App::new(
        config.clone(),
        backend,
        store,
        ConsoleView::stdout(true),
        LogAudio,
    );

    // ── Session ─────────────────────────────────────────────────────
    let session = match app.start().await {
        Some(session) => session,
        None => {
            let nickname = std::env::var("WAHLPLAKAT_NICKNAME")?;
            let password = std::env::var("WAHLPLAKAT_PASSWORD")?;
            match app.login(&nickname, &password).await? {
                Some(session) => session,
                None => return Ok(()),
            }
        }
    };

    // ── Input ───────────────────────────────────────────────────────
    let (controls, actions) = GameControls::channel();

    let stdin_controls = controls.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let sent = match line.trim() {
                "" => true,
                "/source" => stdin_controls.show_source(),
                "/leave" => stdin_controls.leave(),
                "/quit" => stdin_controls.close(),
                party => stdin_controls.submit_answer(party),
            };
            if !sent {
                break;
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, closing");
            controls.close();
        }
    });

    // ── Play ────────────────────────────────────────────────────────
    let connector = SocketIoConnector::new(http, &config)?;
    match app.play(session, connector, actions).await? {
        GameExit::Left => tracing::info!("Left the game"),
        GameExit::Closed => tracing::info!("Closed"),
        GameExit::ConnectionLost => tracing::warn!("Gave up reconnecting"),
    }

    Ok(())
}
