//! Transport implementations and negotiation for the game channel.
//!
//! | Transport              | When                                          |
//! |------------------------|-----------------------------------------------|
//! | [`WebSocketTransport`] | preferred; needs the `transport-websocket` feature |
//! | [`PollingTransport`]   | fallback when the socket cannot be opened     |
//!
//! [`SocketIoConnector`] implements the negotiation: it tries the WebSocket
//! first and falls back to long-polling, and is what the event channel uses
//! to reconnect.

pub mod polling;
#[cfg(feature = "transport-websocket")]
pub mod websocket;

use async_trait::async_trait;
use url::Url;

pub use polling::PollingTransport;
#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;

use crate::config::ClientConfig;
use crate::engineio::ENGINE_IO_VERSION;
use crate::error::{ClientError, Result};
use crate::transport::{Connector, Transport};

/// Opens a Socket.IO transport, preferring a WebSocket over long-polling.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    http: reqwest::Client,
    socket_url: Url,
    prefer_websocket: bool,
    connect_timeout: std::time::Duration,
}

impl SocketIoConnector {
    /// Build a connector for the server in `config`.
    ///
    /// # Errors
    ///
    /// Fails if the Socket.IO URL cannot be derived from the configuration.
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            http,
            socket_url: config.socket_url()?,
            prefer_websocket: config.prefer_websocket,
            connect_timeout: config.connect_timeout,
        })
    }

    /// The `ws://` / `wss://` URL used for the WebSocket attempt.
    ///
    /// # Errors
    ///
    /// Fails if the server URL has a scheme other than `http` or `https`.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self.socket_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Protocol(format!(
                    "unsupported scheme {other:?} for the game socket"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Protocol("cannot switch url scheme".into()))?;
        url.query_pairs_mut()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", "websocket");
        Ok(url)
    }

    async fn connect_polling(&self) -> Result<Box<dyn Transport>> {
        let polling = tokio::time::timeout(
            self.connect_timeout,
            PollingTransport::connect(self.http.clone(), &self.socket_url),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        Ok(Box::new(polling))
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    type Transport = Box<dyn Transport>;

    async fn connect(&self) -> Result<Self::Transport> {
        #[cfg(feature = "transport-websocket")]
        if self.prefer_websocket {
            let url = self.websocket_url()?;
            match WebSocketTransport::connect_with_timeout(url.as_str(), self.connect_timeout).await
            {
                Ok(ws) => return Ok(Box::new(ws)),
                Err(e) => {
                    tracing::warn!("websocket unavailable ({e}), falling back to long-polling");
                }
            }
        }

        self.connect_polling().await
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
    fn websocket_url_switches_scheme_and_adds_query() {
        let config = ClientConfig::new("https://example.org").unwrap();
        let connector = SocketIoConnector::new(reqwest::Client::new(), &config).unwrap();
        assert_eq!(
            connector.websocket_url().unwrap().as_str(),
            "wss://example.org/wahlplakatgame/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[tokio::test]
    async fn connect_fails_when_both_transports_are_unreachable() {
        let config = ClientConfig::new("http://127.0.0.1:1")
            .unwrap()
            .with_connect_timeout(std::time::Duration::from_millis(500));
        let connector = SocketIoConnector::new(reqwest::Client::new(), &config).unwrap();
        assert!(connector.connect().await.is_err());
    }
}
