//! Login, registration and session revalidation.
//!
//! Every operation validates its input first; a validation failure is shown
//! to the user and returned without touching the network. While a request
//! is in flight the triggering [`Control`] is disabled and labelled with a
//! progress string by a [`BusyGuard`], which puts the control back when it
//! drops, whichever way the operation ends.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::error::{ClientError, Result, ValidationError};
use crate::http::{ApiClient, HttpBackend};
use crate::session::{KeyValueStore, Session, SessionStore, UserProfile};
use crate::view::{AuthTab, Control, ControlState, Page, StatusLine, View};

/// Longest accepted nickname, in characters.
pub const MAX_NICKNAME_CHARS: usize = 18;

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_CHARS: usize = 6;

const UNKNOWN: &str = "Unknown";

// ── Validation ──────────────────────────────────────────────────────

/// Trim and check a nickname for registration or availability checks.
///
/// # Errors
///
/// Empty or longer than [`MAX_NICKNAME_CHARS`] characters.
pub fn validate_nickname(nickname: &str) -> std::result::Result<&str, ValidationError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ValidationError::MissingNickname);
    }
    if nickname.chars().count() > MAX_NICKNAME_CHARS {
        return Err(ValidationError::NicknameTooLong {
            max: MAX_NICKNAME_CHARS,
        });
    }
    Ok(nickname)
}

/// # Errors
///
/// Empty nickname or empty password.
pub fn validate_login<'a>(
    nickname: &'a str,
    password: &str,
) -> std::result::Result<&'a str, ValidationError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ValidationError::MissingNickname);
    }
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    Ok(nickname)
}

/// # Errors
///
/// Any nickname failure, an empty or short password, or a repeat mismatch.
pub fn validate_registration<'a>(
    nickname: &'a str,
    password: &str,
    repeat: &str,
) -> std::result::Result<&'a str, ValidationError> {
    let nickname = validate_nickname(nickname)?;
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_CHARS,
        });
    }
    if password != repeat {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(nickname)
}

// ── Busy guard ──────────────────────────────────────────────────────

type BusySet = Arc<Mutex<HashSet<Control>>>;

/// Marks a control busy for the lifetime of one request.
///
/// Derefs to the wrapped view so the operation keeps rendering through it.
/// On drop the control is re-enabled with its resting label and the loading
/// indicator is cleared.
pub struct BusyGuard<'a, V: View + ?Sized> {
    view: &'a mut V,
    busy: BusySet,
    control: Option<Control>,
    loading: bool,
}

impl<'a, V: View + ?Sized> BusyGuard<'a, V> {
    /// Claim `control`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Busy`] if the control is already claimed.
    fn acquire(busy: &BusySet, view: &'a mut V, control: Control, loading: bool) -> Result<Self> {
        {
            let mut set = busy.lock().map_err(|_| ClientError::Busy)?;
            if !set.insert(control) {
                tracing::debug!(?control, "control busy, ignoring trigger");
                return Err(ClientError::Busy);
            }
        }
        view.set_control(control, ControlState::busy(control));
        if loading {
            view.set_loading(true);
        }
        Ok(Self {
            view,
            busy: Arc::clone(busy),
            control: Some(control),
            loading,
        })
    }

    /// Show the loading indicator without claiming a control.
    fn loading(busy: &BusySet, view: &'a mut V) -> Self {
        view.set_loading(true);
        Self {
            view,
            busy: Arc::clone(busy),
            control: None,
            loading: true,
        }
    }
}

impl<V: View + ?Sized> Deref for BusyGuard<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.view
    }
}

impl<V: View + ?Sized> DerefMut for BusyGuard<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        self.view
    }
}

impl<V: View + ?Sized> Drop for BusyGuard<'_, V> {
    fn drop(&mut self) {
        if let Some(control) = self.control {
            self.view.set_control(control, ControlState::enabled(control));
            if let Ok(mut set) = self.busy.lock() {
                set.remove(&control);
            }
        }
        if self.loading {
            self.view.set_loading(false);
        }
    }
}

// ── Controller ──────────────────────────────────────────────────────

/// Drives the auth forms against the API and the session store.
pub struct AuthController<B, S> {
    api: Arc<ApiClient<B>>,
    sessions: SessionStore<S>,
    busy: BusySet,
}

impl<B: HttpBackend, S: KeyValueStore> AuthController<B, S> {
    pub fn new(api: Arc<ApiClient<B>>, sessions: SessionStore<S>) -> Self {
        Self {
            api,
            sessions,
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a request triggered by `control` is in flight.
    pub fn is_busy(&self, control: Control) -> bool {
        self.busy
            .lock()
            .map(|set| set.contains(&control))
            .unwrap_or(false)
    }

    /// Log in. Returns the new session on success and `None` when the server
    /// refused the credentials (the reason has been shown).
    ///
    /// # Errors
    ///
    /// Validation failures, [`ClientError::Busy`], or the transport error
    /// after a generic retry alert.
    pub async fn login<V: View + ?Sized>(
        &self,
        view: &mut V,
        nickname: &str,
        password: &str,
    ) -> Result<Option<Session>> {
        let nickname = match validate_login(nickname, password) {
            Ok(nickname) => nickname,
            Err(e) => {
                view.alert(&e.to_string());
                return Err(e.into());
            }
        };

        let mut view = BusyGuard::acquire(&self.busy, view, Control::Login, true)?;
        let response = match self.api.login(nickname, password).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("login request failed: {e}");
                view.alert("Login failed. Please try again.");
                return Err(e);
            }
        };

        if !response.success {
            let message = response.message.unwrap_or_default();
            tracing::info!(nickname, "login refused: {message}");
            view.alert(&format!("Login failed!\n\n{message}"));
            return Ok(None);
        }

        let Some(token) = response.token else {
            tracing::error!("login succeeded without a token");
            view.alert("Login failed. Please try again.");
            return Err(ClientError::Protocol("login response has no token".into()));
        };
        let profile = UserProfile {
            user_id: response.user_id.unwrap_or_default(),
            nickname: response.nickname.unwrap_or_else(|| nickname.to_string()),
            points: response.points.unwrap_or_default(),
        };
        self.sessions.save(&token, &profile);
        tracing::info!(nickname = %profile.nickname, "logged in");

        view.alert(&format!(
            "Welcome back, {}!\n\nPoints: {}\nLast login: {}\nIP: {}",
            profile.nickname,
            profile.points,
            response.last_login_time.as_deref().unwrap_or(UNKNOWN),
            response.last_login_ip.as_deref().unwrap_or(UNKNOWN),
        ));

        Ok(Some(Session { token, profile }))
    }

    /// Create an account. Never logs in; on success the login tab is shown
    /// with the nickname filled in. Returns whether the server accepted it.
    ///
    /// # Errors
    ///
    /// Validation failures, [`ClientError::Busy`], or the transport error.
    pub async fn register<V: View + ?Sized>(
        &self,
        view: &mut V,
        nickname: &str,
        password: &str,
        repeat: &str,
    ) -> Result<bool> {
        let nickname = match validate_registration(nickname, password, repeat) {
            Ok(nickname) => nickname,
            Err(e) => {
                view.alert(&e.to_string());
                return Err(e.into());
            }
        };

        let mut view = BusyGuard::acquire(&self.busy, view, Control::Register, true)?;
        let response = match self.api.register(nickname, password).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("register request failed: {e}");
                view.alert("Registration failed. Please try again.");
                return Err(e);
            }
        };

        if !response.success {
            let message = response.message.unwrap_or_default();
            view.alert(&format!("Registration failed!\n\n{message}"));
            return Ok(false);
        }

        tracing::info!(nickname, "account created");
        view.alert(&format!(
            "Account created!\n\nYou can now log in as \"{nickname}\".\n\nHave fun playing!"
        ));
        view.clear_register_form();
        view.switch_auth_tab(AuthTab::Login);
        view.prefill_login(nickname);
        Ok(true)
    }

    /// Ask whether a nickname is free. The answer is shown as the status line.
    ///
    /// # Errors
    ///
    /// Validation failures, [`ClientError::Busy`], or the transport error.
    pub async fn check_username<V: View + ?Sized>(
        &self,
        view: &mut V,
        nickname: &str,
    ) -> Result<bool> {
        let nickname = match validate_nickname(nickname) {
            Ok(nickname) => nickname,
            Err(e) => {
                view.set_status(StatusLine::error(e.to_string()));
                return Err(e.into());
            }
        };

        let mut view = BusyGuard::acquire(&self.busy, view, Control::CheckUsername, false)?;
        match self.api.check_username(nickname).await {
            Ok(response) if response.available => {
                view.set_status(StatusLine::ok("✓ Username available!"));
                Ok(true)
            }
            Ok(_) => {
                view.set_status(StatusLine::error("❌ Username already taken"));
                Ok(false)
            }
            Err(e) => {
                tracing::error!("username check failed: {e}");
                view.set_status(StatusLine::error("❌ Check failed"));
                Err(e)
            }
        }
    }

    /// Revalidate a stored session.
    ///
    /// A valid token refreshes (and persists) the cached profile. An invalid
    /// token clears the session and shows the auth page. When the server
    /// cannot be asked, the session is kept for a later retry.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingToken`] for an empty token, or the transport
    /// error after a generic retry alert.
    pub async fn validate<V: View + ?Sized>(
        &self,
        view: &mut V,
        session: &Session,
    ) -> Result<Option<Session>> {
        if session.token.is_empty() {
            return Err(ValidationError::MissingToken.into());
        }

        let mut view = BusyGuard::loading(&self.busy, view);
        match self.api.validate(&session.token).await {
            Ok(response) if response.valid => {
                let profile = UserProfile {
                    user_id: response.user_id.unwrap_or(session.profile.user_id),
                    nickname: response
                        .nickname
                        .unwrap_or_else(|| session.profile.nickname.clone()),
                    points: response.points.unwrap_or(session.profile.points),
                };
                tracing::info!(nickname = %profile.nickname, "session valid");
                self.sessions.save(&session.token, &profile);
                Ok(Some(Session {
                    token: session.token.clone(),
                    profile,
                }))
            }
            Ok(_) => {
                tracing::info!("session invalid");
                self.sessions.clear();
                view.show_page(Page::Auth);
                Ok(None)
            }
            Err(e) => {
                tracing::error!("session validation failed: {e}");
                view.alert("Could not reach the server. Please try again.");
                view.show_page(Page::Auth);
                Err(e)
            }
        }
    }

    /// Log out. The local session is cleared even if the server cannot be
    /// reached.
    pub async fn logout<V: View + ?Sized>(&self, view: &mut V) {
        if let Some(session) = self.sessions.load() {
            let mut view = BusyGuard::loading(&self.busy, view);
            match self.api.logout(&session.token).await {
                Ok(response) if !response.success => {
                    tracing::warn!(message = ?response.message, "server refused logout");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("logout request failed: {e}"),
            }
            self.sessions.clear();
            view.show_page(Page::Auth);
            return;
        }
        self.sessions.clear();
        view.show_page(Page::Auth);
    }
}

impl<B, S> std::fmt::Debug for AuthController<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_trimmed_and_counted_in_chars() {
        assert_eq!(validate_nickname("  ana  ").unwrap(), "ana");
        assert_eq!(validate_nickname("   "), Err(ValidationError::MissingNickname));
        // 18 umlauts are 36 bytes but still within the limit
        assert!(validate_nickname(&"ü".repeat(18)).is_ok());
        assert_eq!(
            validate_nickname(&"a".repeat(19)),
            Err(ValidationError::NicknameTooLong { max: 18 })
        );
    }

    #[test]
    fn registration_rules_apply_in_order() {
        assert_eq!(
            validate_registration("ana", "", ""),
            Err(ValidationError::MissingPassword)
        );
        assert_eq!(
            validate_registration("ana", "12345", "12345"),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert_eq!(
            validate_registration("ana", "123456", "123457"),
            Err(ValidationError::PasswordMismatch)
        );
        assert_eq!(validate_registration(" ana", "123456", "123456"), Ok("ana"));
    }

    #[test]
    fn login_needs_both_fields() {
        assert_eq!(validate_login("", "pw"), Err(ValidationError::MissingNickname));
        assert_eq!(validate_login("ana", ""), Err(ValidationError::MissingPassword));
        assert_eq!(validate_login(" ana ", "pw"), Ok("ana"));
    }
}
