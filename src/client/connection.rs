//! Async connection driver.
//!
//! Owns the transport and a signaling engine, pumps inbound frames
//! through [`Signaling::step`], transmits the produced frames, and
//! surfaces engine events to the host over an unbounded channel. Exactly
//! one task runs the driver; the engine never sees concurrency.
//!
//! Reconnect policy deliberately lives with the host: every handshake is
//! a single linear run, and on any error the driver returns after
//! notifying the host, which decides whether to dial again.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::core::{CloseCode, SignalingError, Transport, TransportError};
use crate::crypto::{AuthToken, KeyStore, PublicKey};
use crate::signaling::{
    InitiatorSignaling, ResponderSignaling, Signaling, SignalingEvent, SignalingState,
};

/// Errors that can occur in the connection driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The builder was missing a required part.
    #[error("missing configuration: {0}")]
    Config(&'static str),

    /// The signaling engine aborted the connection.
    #[error("signaling failed: {0}")]
    Signaling(#[from] SignalingError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Notifications surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The server handshake finished.
    ServerHandshakeDone,
    /// The peer handshake finished; the secure channel is up.
    Connected {
        /// Address of the authenticated peer.
        peer: u8,
    },
    /// Decrypted post-handshake payload from the authenticated peer.
    Data {
        /// Address the payload came from.
        source: u8,
        /// The decrypted bytes.
        payload: Vec<u8>,
    },
    /// The server reported a peer as gone.
    PeerDisconnected {
        /// Address that disconnected.
        id: u8,
    },
    /// The connection ended. `None` means the remote end closed without
    /// a code the driver could observe.
    Closed {
        /// Close code, if known.
        code: Option<CloseCode>,
    },
    /// Something went wrong; the engine state is reflected in
    /// [`Connection::state`] and the driver's return value.
    Error {
        /// Human-readable cause.
        message: String,
    },
}

fn map_event(event: SignalingEvent) -> ConnectionEvent {
    match event {
        SignalingEvent::ServerHandshakeDone => ConnectionEvent::ServerHandshakeDone,
        SignalingEvent::Connected { peer } => ConnectionEvent::Connected { peer },
        SignalingEvent::Data { source, payload } => ConnectionEvent::Data { source, payload },
        SignalingEvent::PeerDisconnected { id } => ConnectionEvent::PeerDisconnected { id },
    }
}

/// Builder for a [`Connection`].
#[derive(Default)]
pub struct ConnectionBuilder {
    transport: Option<Box<dyn Transport>>,
    signaling: Option<Box<dyn Signaling>>,
}

impl ConnectionBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport (already connected to the relay).
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Run as initiator with the given permanent keystore and the auth
    /// token handed out through the side channel.
    pub fn initiator(mut self, permanent: KeyStore, auth_token: AuthToken) -> Self {
        self.signaling = Some(Box::new(InitiatorSignaling::new(permanent, auth_token)));
        self
    }

    /// Run as responder toward the given initiator key, carrying the auth
    /// token received through the side channel.
    pub fn responder(
        mut self,
        permanent: KeyStore,
        initiator_permanent: PublicKey,
        auth_token: AuthToken,
    ) -> Self {
        self.signaling = Some(Box::new(ResponderSignaling::new(
            permanent,
            initiator_permanent,
            auth_token,
        )));
        self
    }

    /// Use a custom signaling engine.
    pub fn signaling(mut self, signaling: impl Signaling + 'static) -> Self {
        self.signaling = Some(Box::new(signaling));
        self
    }

    /// Assemble the connection.
    pub fn build(
        self,
    ) -> Result<
        (
            Connection,
            ConnectionHandle,
            mpsc::UnboundedReceiver<ConnectionEvent>,
        ),
        ClientError,
    > {
        let transport = self.transport.ok_or(ClientError::Config("transport"))?;
        let signaling = self.signaling.ok_or(ClientError::Config("role"))?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connection = Connection {
            transport,
            signaling,
            events: event_tx,
            shutdown: shutdown_rx,
        };
        let handle = ConnectionHandle {
            shutdown: Some(shutdown_tx),
        };
        Ok((connection, handle, event_rx))
    }
}

/// Handle for shutting a running [`Connection`] down.
///
/// Dropping the handle closes the connection as well.
pub struct ConnectionHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl ConnectionHandle {
    /// Request a graceful close.
    pub fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A signaling connection over one transport.
pub struct Connection {
    transport: Box<dyn Transport>,
    signaling: Box<dyn Signaling>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: oneshot::Receiver<()>,
}

impl Connection {
    /// Coarse engine state.
    pub fn state(&self) -> SignalingState {
        self.signaling.state()
    }

    /// Drive the connection until it closes or fails.
    ///
    /// The transport must already be connected; the server speaks first.
    pub async fn run(mut self) -> Result<(), ClientError> {
        self.signaling.begin()?;
        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    info!("close requested by host");
                    let _ = self.transport.close(CloseCode::GoingAway).await;
                    self.signaling.close();
                    self.emit(ConnectionEvent::Closed { code: Some(CloseCode::GoingAway) });
                    return Ok(());
                }
                frame = self.transport.recv() => match frame {
                    Ok(Some(frame)) => {
                        if let Err(error) = self.handle_frame(&frame).await {
                            return Err(error);
                        }
                    }
                    Ok(None) => {
                        info!("transport closed by remote");
                        self.signaling.close();
                        self.emit(ConnectionEvent::Closed { code: None });
                        return Ok(());
                    }
                    Err(error) => {
                        // The engine state is left untouched on transport
                        // errors; the host decides what happens next.
                        warn!(%error, "transport error");
                        self.emit(ConnectionEvent::Error {
                            message: error.to_string(),
                        });
                        return Err(error.into());
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        let out = match self.signaling.step(frame) {
            Ok(out) => out,
            Err(error) => {
                // The engine has already reset itself; tear the transport
                // down and surface the cause.
                self.emit(ConnectionEvent::Error {
                    message: error.to_string(),
                });
                let _ = self.transport.close(CloseCode::ProtocolError).await;
                self.signaling.close();
                self.emit(ConnectionEvent::Closed {
                    code: Some(CloseCode::ProtocolError),
                });
                return Err(error.into());
            }
        };
        for frame in out.frames {
            if let Err(error) = self.transport.send(frame).await {
                self.emit(ConnectionEvent::Error {
                    message: error.to_string(),
                });
                return Err(error.into());
            }
        }
        for event in out.events {
            self.emit(map_event(event));
        }
        Ok(())
    }

    fn emit(&self, event: ConnectionEvent) {
        // The host may have dropped its receiver; that is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// A scripted transport feeding canned frames.
    struct ScriptedTransport {
        inbound: VecDeque<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<Vec<u8>>) -> Self {
            Self {
                inbound: inbound.into(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, _frame: Vec<u8>) -> Result<(), TransportError> {
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.inbound.pop_front())
        }

        async fn close(&mut self, _code: CloseCode) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_remote_close_surfaces_event() {
        let (connection, _handle, mut events) = ConnectionBuilder::new()
            .transport(ScriptedTransport::new(vec![]))
            .initiator(KeyStore::generate(), AuthToken::generate())
            .build()
            .unwrap();

        connection.run().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Closed { code: None }));
    }

    #[tokio::test]
    async fn test_garbage_frame_closes_with_protocol_error() {
        let (connection, _handle, mut events) = ConnectionBuilder::new()
            .transport(ScriptedTransport::new(vec![vec![0u8; 64]]))
            .initiator(KeyStore::generate(), AuthToken::generate())
            .build()
            .unwrap();

        assert!(connection.run().await.is_err());
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Error { .. })
        ));
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Closed {
                code: Some(CloseCode::ProtocolError)
            })
        );
    }

    #[tokio::test]
    async fn test_builder_requires_transport_and_role() {
        assert!(matches!(
            ConnectionBuilder::new().build(),
            Err(ClientError::Config("transport"))
        ));
        assert!(matches!(
            ConnectionBuilder::new()
                .transport(ScriptedTransport::new(vec![]))
                .build(),
            Err(ClientError::Config("role"))
        ));
    }

    #[tokio::test]
    async fn test_handle_close_requests_shutdown() {
        // No inbound frames: recv would return None immediately, so push
        // the shutdown first by closing the handle before running.
        let (connection, handle, mut events) = ConnectionBuilder::new()
            .transport(ScriptedTransport::new(vec![]))
            .responder(
                KeyStore::generate(),
                KeyStore::generate().public_key().clone(),
                AuthToken::generate(),
            )
            .build()
            .unwrap();

        handle.close();
        connection.run().await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConnectionEvent::Closed { .. }));
    }
}
