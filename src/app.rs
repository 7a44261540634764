//! Application shell: startup, page switching and the hand-off into a game.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{AudioSink, CuePlayer};
use crate::auth::AuthController;
use crate::channel::EventChannel;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::game::{GameExit, GameSession, UserAction};
use crate::http::{ApiClient, HttpBackend};
use crate::round::RoundMachine;
use crate::session::{KeyValueStore, Session, SessionStore};
use crate::transport::Connector;
use crate::view::{Page, View};

/// Owns the controllers, the view and the audio for one client instance.
pub struct App<B, S, V, A: AudioSink> {
    config: ClientConfig,
    api: Arc<ApiClient<B>>,
    auth: AuthController<B, S>,
    sessions: SessionStore<S>,
    view: V,
    audio: CuePlayer<A>,
}

impl<B, S, V, A> App<B, S, V, A>
where
    B: HttpBackend,
    S: KeyValueStore,
    V: View,
    A: AudioSink,
{
    pub fn new(config: ClientConfig, backend: B, store: S, view: V, audio: A) -> Self {
        let api = Arc::new(ApiClient::new(backend));
        let sessions = SessionStore::new(store);
        let audio = CuePlayer::preload(audio, &config.base_path);
        Self {
            auth: AuthController::new(Arc::clone(&api), sessions.clone()),
            config,
            api,
            sessions,
            view,
            audio,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient<B> {
        &self.api
    }

    pub fn sessions(&self) -> &SessionStore<S> {
        &self.sessions
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn audio(&self) -> &CuePlayer<A> {
        &self.audio
    }

    /// Restore a stored session. Returns it when the server still accepts
    /// the token; otherwise the auth page is shown.
    pub async fn start(&mut self) -> Option<Session> {
        let Some(stored) = self.sessions.load() else {
            tracing::info!("no stored session, showing login");
            self.view.show_page(Page::Auth);
            return None;
        };
        tracing::info!(nickname = %stored.profile.nickname, "stored session found, validating");
        match self.auth.validate(&mut self.view, &stored).await {
            Ok(session) => session,
            Err(ClientError::Validation(e)) => {
                tracing::warn!("stored session unusable: {e}");
                self.sessions.clear();
                self.view.show_page(Page::Auth);
                None
            }
            Err(e) => {
                tracing::warn!("could not validate stored session: {e}");
                None
            }
        }
    }

    /// # Errors
    ///
    /// See [`AuthController::login`].
    pub async fn login(&mut self, nickname: &str, password: &str) -> Result<Option<Session>> {
        self.auth.login(&mut self.view, nickname, password).await
    }

    /// # Errors
    ///
    /// See [`AuthController::register`].
    pub async fn register(&mut self, nickname: &str, password: &str, repeat: &str) -> Result<bool> {
        self.auth
            .register(&mut self.view, nickname, password, repeat)
            .await
    }

    /// # Errors
    ///
    /// See [`AuthController::check_username`].
    pub async fn check_username(&mut self, nickname: &str) -> Result<bool> {
        self.auth.check_username(&mut self.view, nickname).await
    }

    pub async fn logout(&mut self) {
        self.auth.logout(&mut self.view).await;
    }

    /// Load the party catalog, show the game page, connect through
    /// `connector` and play until the game ends.
    ///
    /// # Errors
    ///
    /// Fails before connecting if the party catalog cannot be loaded; the
    /// user is alerted and sent back to the auth page.
    pub async fn play<C: Connector>(
        &mut self,
        session: Session,
        connector: C,
        actions: mpsc::UnboundedReceiver<UserAction>,
    ) -> Result<GameExit> {
        self.view.set_loading(true);
        let parties = self.load_parties().await;
        self.view.set_loading(false);
        let parties = match parties {
            Ok(parties) => parties,
            Err(e) => {
                tracing::error!("failed to load the game: {e}");
                self.view.alert("Failed to load the game.");
                self.view.show_page(Page::Auth);
                return Err(e);
            }
        };

        self.view.render_parties(&parties);
        self.view
            .render_user(&session.profile.nickname, session.profile.points);
        self.view.show_page(Page::Game);

        let channel = EventChannel::connect(connector, &self.config);
        let machine = RoundMachine::new(Some(session), parties);
        let exit = GameSession::new(
            machine,
            channel,
            actions,
            &mut self.view,
            &mut self.audio,
            self.sessions.clone(),
        )
        .run()
        .await;

        tracing::info!(?exit, "game ended");
        if exit == GameExit::ConnectionLost {
            self.view.show_page(Page::Auth);
        }
        Ok(exit)
    }

    async fn load_parties(&self) -> Result<Vec<String>> {
        let response = self.api.parties().await?;
        if !response.success {
            return Err(ClientError::Protocol(format!(
                "party catalog unavailable: {}",
                response.message.unwrap_or_default()
            )));
        }
        Ok(response.parteien)
    }
}

impl<B, S, V, A: AudioSink> std::fmt::Debug for App<B, S, V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("server", &self.config.server_url.as_str())
            .finish_non_exhaustive()
    }
}
