//! HTTP long-polling transport, the fallback when a WebSocket cannot be opened.
//!
//! The Engine.IO polling protocol exchanges batches of packets separated by
//! `\x1e`. A background task keeps one `GET` outstanding at all times and
//! feeds every received packet into an unbounded channel, which makes
//! [`recv`](Transport::recv) cancel-safe. Each [`send`](Transport::send) is a
//! `POST` carrying a single packet.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::engineio::{self, Packet, ENGINE_IO_VERSION};
use crate::error::ClientError;
use crate::transport::Transport;

/// A [`Transport`] implementation backed by Engine.IO HTTP long-polling.
#[derive(Debug)]
pub struct PollingTransport {
    http: reqwest::Client,
    /// Polling URL including `EIO`, `transport` and `sid` query parameters.
    session_url: Url,
    incoming: mpsc::UnboundedReceiver<Result<String, ClientError>>,
    poller: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl PollingTransport {
    /// Perform the polling handshake against the Socket.IO endpoint `url`
    /// (e.g. `http://host/wahlplakatgame/socket.io/`).
    ///
    /// The `open` packet returned by the handshake is replayed as the first
    /// packet from [`recv`](Transport::recv), exactly as a WebSocket would
    /// deliver it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] on network failure and
    /// [`ClientError::Protocol`] if the server does not answer with an
    /// Engine.IO `open` packet.
    pub async fn connect(http: reqwest::Client, url: &Url) -> Result<Self, ClientError> {
        let mut base = url.clone();
        base.query_pairs_mut()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", "polling");

        tracing::debug!(url = %base, "starting long-polling handshake");
        let body = http.get(base.clone()).send().await?.error_for_status()?.text().await?;

        let mut packets = engineio::split_payload(&body);
        let open = packets
            .next()
            .ok_or_else(|| ClientError::Protocol("empty polling handshake".into()))?;
        let Packet::Open(handshake) = engineio::decode(open)? else {
            return Err(ClientError::Protocol(
                "polling handshake did not start with an open packet".into(),
            ));
        };

        let mut session_url = base;
        session_url
            .query_pairs_mut()
            .append_pair("sid", &handshake.sid);

        let (tx, incoming) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(open.to_string()));
        for packet in packets {
            let _ = tx.send(Ok(packet.to_string()));
        }

        let poller = tokio::spawn(poll_loop(http.clone(), session_url.clone(), tx));
        tracing::info!(sid = %handshake.sid, "long-polling session established");

        Ok(Self {
            http,
            session_url,
            incoming,
            poller,
            closed: false,
        })
    }
}

/// Keep one `GET` in flight until the server closes the session or the
/// receiver is dropped.
async fn poll_loop(
    http: reqwest::Client,
    url: Url,
    tx: mpsc::UnboundedSender<Result<String, ClientError>>,
) {
    loop {
        let response = match http.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(Err(ClientError::TransportReceive(e.to_string())));
                return;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "polling session ended by server");
            return;
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(Err(ClientError::TransportReceive(e.to_string())));
                return;
            }
        };
        for packet in engineio::split_payload(&body) {
            let is_close = packet == "1";
            if tx.send(Ok(packet.to_string())).is_err() || is_close {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    async fn send(&mut self, packet: String) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::TransportClosed);
        }
        self.http
            .post(self.session_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(packet)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map(|_| ())
            .map_err(|e| ClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        let result = self.send("1".to_string()).await;
        self.closed = true;
        self.poller.abort();
        result
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.poller.abort();
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
    fn polling_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PollingTransport>();
    }

    #[tokio::test]
    async fn handshake_fails_against_unreachable_host() {
        let url = Url::parse("http://127.0.0.1:1/wahlplakatgame/socket.io/").unwrap();
        let err = PollingTransport::connect(reqwest::Client::new(), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http(_) | ClientError::Timeout));
    }
}
