//! JSON request/response transport for the auth and catalog endpoints.
//!
//! [`HttpBackend`] is the seam: it takes a method, a path below the game's
//! base path and an optional JSON body, and hands back the parsed response
//! body. [`ApiClient`] layers typed calls on top of any backend so the
//! controllers never see raw JSON.
//!
//! The server answers failed requests with `400` and a
//! `{"success": false, "message": ...}` body. Such a response is an
//! application-level failure, not a transport error, so the backend returns
//! the body whatever the status code as long as it is JSON.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{
    AvailabilityResponse, Credentials, LeaderboardResponse, LoginResponse, NicknameQuery,
    PartiesResponse, StatusResponse, TokenBody, ValidateResponse,
};

/// HTTP verbs used by the game API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Whether requests with this verb carry a JSON body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Performs one JSON request against the game server.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Send `body` (POST/PUT only) to `path` and return the parsed JSON
    /// response body.
    ///
    /// # Errors
    ///
    /// Network failures map to [`ClientError::Http`] or
    /// [`ClientError::Timeout`]; a body that is not JSON maps to
    /// [`ClientError::Http`].
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;
}

// ── reqwest backend ─────────────────────────────────────────────────

/// Production [`HttpBackend`] built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestBackend {
    pub fn new(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// The underlying client, shared with the long-polling transport.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.config.api_url(path)?;
        tracing::debug!(%method, %url, "api request");

        let mut request = self
            .client
            .request(method.into(), url)
            .timeout(self.config.connect_timeout);
        match body {
            Some(body) if method.has_body() => request = request.json(&body),
            Some(_) => tracing::debug!(%method, path, "dropping body on bodiless request"),
            None if method.has_body() => {
                request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            None => {}
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(%status, path, "response is not JSON: {e}");
            ClientError::Http(format!("{status}: response is not JSON"))
        })
    }
}

// ── Typed API ───────────────────────────────────────────────────────

/// Typed calls for every endpoint the client uses.
#[derive(Debug, Clone)]
pub struct ApiClient<B> {
    backend: B,
}

impl<B: HttpBackend> ApiClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn call<T, R>(&self, method: Method, path: &str, body: Option<&T>) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        let value = self.backend.request(method, path, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST /api/auth/login`
    pub async fn login(&self, nickname: &str, password: &str) -> Result<LoginResponse> {
        let body = Credentials {
            nickname: nickname.to_string(),
            password: password.to_string(),
        };
        self.call(Method::Post, "/api/auth/login", Some(&body)).await
    }

    /// `POST /api/auth/register`
    pub async fn register(&self, nickname: &str, password: &str) -> Result<StatusResponse> {
        let body = Credentials {
            nickname: nickname.to_string(),
            password: password.to_string(),
        };
        self.call(Method::Post, "/api/auth/register", Some(&body))
            .await
    }

    /// `POST /api/auth/check-username`
    pub async fn check_username(&self, nickname: &str) -> Result<AvailabilityResponse> {
        let body = NicknameQuery {
            nickname: nickname.to_string(),
        };
        self.call(Method::Post, "/api/auth/check-username", Some(&body))
            .await
    }

    /// `POST /api/auth/validate`
    pub async fn validate(&self, token: &str) -> Result<ValidateResponse> {
        let body = TokenBody {
            token: token.to_string(),
        };
        self.call(Method::Post, "/api/auth/validate", Some(&body))
            .await
    }

    /// `POST /api/auth/logout`
    pub async fn logout(&self, token: &str) -> Result<StatusResponse> {
        let body = TokenBody {
            token: token.to_string(),
        };
        self.call(Method::Post, "/api/auth/logout", Some(&body))
            .await
    }

    /// `GET /api/game/parteien`
    pub async fn parties(&self) -> Result<PartiesResponse> {
        self.call::<(), _>(Method::Get, "/api/game/parteien", None)
            .await
    }

    /// `GET /api/game/leaderboard?limit=N`
    pub async fn leaderboard(&self, limit: u32) -> Result<LeaderboardResponse> {
        let path = format!("/api/game/leaderboard?limit={limit}");
        self.call::<(), _>(Method::Get, &path, None).await
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
    use serde_json::json;
    use std::sync::Mutex;

    struct Canned {
        response: Value,
        seen: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    #[async_trait]
    impl HttpBackend for Canned {
        async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((method, path.to_string(), body));
            Ok(self.response.clone())
        }
    }

    fn canned(response: Value) -> ApiClient<Canned> {
        ApiClient::new(Canned {
            response,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn only_post_and_put_carry_bodies() {
        assert!(Method::Post.has_body());
        assert!(Method::Put.has_body());
        assert!(!Method::Get.has_body());
        assert!(!Method::Delete.has_body());
    }

    #[tokio::test]
    async fn login_posts_credentials() {
        let api = canned(json!({"success": true, "token": "T", "user_id": 7, "nickname": "ana", "points": 0}));
        let response = api.login("ana", "secret").await.unwrap();
        assert_eq!(response.token.as_deref(), Some("T"));

        let seen = api.backend().seen.lock().unwrap();
        let (method, path, body) = &seen[0];
        assert_eq!(*method, Method::Post);
        assert_eq!(path, "/api/auth/login");
        assert_eq!(body.as_ref().unwrap(), &json!({"nickname": "ana", "password": "secret"}));
    }

    #[tokio::test]
    async fn application_failure_is_a_successful_response() {
        let api = canned(json!({"success": false, "message": "Nickname already taken"}));
        let response = api.register("ana", "secret").await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Nickname already taken"));
    }

    #[tokio::test]
    async fn parties_is_a_bodiless_get() {
        let api = canned(json!({"success": true, "parteien": ["SPD", "CDU"]}));
        let response = api.parties().await.unwrap();
        assert_eq!(response.parteien, vec!["SPD".to_string(), "CDU".to_string()]);

        let seen = api.backend().seen.lock().unwrap();
        assert_eq!(seen[0].0, Method::Get);
        assert!(seen[0].2.is_none());
    }

    #[tokio::test]
    async fn mismatched_shape_is_a_serialization_error() {
        let api = canned(json!({"unexpected": true}));
        let err = api.validate("T").await.unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let config = ClientConfig::new("http://127.0.0.1:1")
            .unwrap()
            .with_connect_timeout(std::time::Duration::from_millis(500));
        let api = ApiClient::new(ReqwestBackend::new(reqwest::Client::new(), config));
        let err = api.parties().await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_) | ClientError::Timeout));
    }
}
