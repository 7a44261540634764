//! Transport abstraction for the realtime game channel.
//!
//! The [`Transport`] trait is a bidirectional channel of Engine.IO text
//! packets. A WebSocket carries one packet per frame; the long-polling
//! fallback unpacks batched payloads so that every call to
//! [`recv`](Transport::recv) still yields exactly one packet.
//!
//! Connection setup lives in the separate [`Connector`] trait because the
//! event channel reconnects on its own: after a drop it asks the connector
//! for a fresh transport instead of holding on to a dead one.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use wahlplakat_client::error::ClientError;
//! use wahlplakat_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, packet: String) -> Result<(), ClientError> {
//!         // Write one Engine.IO packet
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ClientError>> {
//!         // Read the next Engine.IO packet; None once closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ClientError;

/// A bidirectional Engine.IO packet transport.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one Engine.IO packet to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TransportSend`] if the packet could not be sent.
    async fn send(&mut self, packet: String) -> Result<(), ClientError>;

    /// Receive the next Engine.IO packet from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete packet was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ClientError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, packet: String) -> Result<(), ClientError> {
        (**self).send(packet).await
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        (**self).close().await
    }
}

/// Opens new transports for the event channel.
///
/// Called once at start and again after every drop while the channel is
/// reconnecting.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Open a connected transport.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt and retried with backoff.
    async fn connect(&self) -> Result<Self::Transport, ClientError>;
}
