//! # Wahlplakat Client
//!
//! Async Rust client for the Wahlplakat quiz: players see a campaign slogan
//! and guess which party used it.
//!
//! The crate covers the whole client side of the game:
//!
//! - **Auth** — login, registration, nickname checks and session
//!   revalidation over JSON HTTP ([`auth`], [`http`], [`session`])
//! - **Realtime channel** — Socket.IO over a WebSocket with long-polling
//!   fallback, pings and automatic reconnect ([`channel`], [`transports`])
//! - **Round state machine** — a pure reducer from server events and user
//!   actions to UI effects ([`round`]), driven by [`game::GameSession`]
//! - **Rendering seams** — [`View`] and [`AudioSink`] traits so any front
//!   end can host the game; [`view::ConsoleView`] renders to a terminal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wahlplakat_client::audio::LogAudio;
//! use wahlplakat_client::game::GameControls;
//! use wahlplakat_client::http::ReqwestBackend;
//! use wahlplakat_client::session::FileStore;
//! use wahlplakat_client::transports::SocketIoConnector;
//! use wahlplakat_client::view::ConsoleView;
//! use wahlplakat_client::{App, ClientConfig};
//!
//! # async fn run() -> wahlplakat_client::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let http = reqwest::Client::new();
//! let store = FileStore::from_config(&config);
//! let backend = ReqwestBackend::new(http.clone(), config.clone());
//! let mut app = App::new(config.clone(), backend, store, ConsoleView::stdout(true), LogAudio);
//!
//! let session = match app.start().await {
//!     Some(session) => session,
//!     None => match app.login("ana", "secret123").await? {
//!         Some(session) => session,
//!         None => return Ok(()),
//!     },
//! };
//!
//! let (controls, actions) = GameControls::channel();
//! controls.submit_answer("SPD");
//! app.play(session, SocketIoConnector::new(http, &config)?, actions).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod audio;
pub mod auth;
pub mod channel;
pub mod config;
pub mod engineio;
pub mod error;
pub mod game;
pub mod http;
pub mod protocol;
pub mod round;
pub mod session;
pub mod transport;
pub mod transports;
pub mod view;

// Re-export primary types for ergonomic imports.
pub use app::App;
pub use audio::{AudioSink, Cue, CuePlayer};
pub use channel::{ChannelEvent, EventChannel};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{ClientError, Result, ValidationError};
pub use game::{GameControls, GameExit, GameSession, UserAction};
pub use protocol::{ClientEvent, ServerEvent};
pub use round::{ActionError, Effect, Input, Phase, RoundMachine};
pub use session::{KeyValueStore, Session, SessionStore, UserProfile};
pub use transport::{Connector, Transport};
pub use view::View;
