//! WebSocket client for the relay.
//!
//! Thin by design: the relay is fire-and-forget transport, so the client is
//! a pair of pump tasks — a writer fed by an mpsc channel and a reader that
//! decodes frames into [`ServerEvent`]s — with no replay or offline
//! buffering. Dropping the client sends a clean close frame.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientEvent, ProtocolError, ServerEvent};

/// A connection to a relay server.
pub struct RelayClient {
    outgoing_tx: mpsc::Sender<ClientEvent>,
    event_rx: mpsc::Receiver<ServerEvent>,
    server_url: String,
}

impl RelayClient {
    /// Connect and spawn the reader/writer pump tasks.
    pub async fn connect(server_url: impl Into<String>) -> Result<Self, ProtocolError> {
        let server_url = server_url.into();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&server_url)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientEvent>(64);
        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(256);

        // Writer pump: encode and send until the client handle is dropped,
        // then close cleanly.
        tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                match event.encode() {
                    Ok(encoded) => {
                        if ws_sender.send(Message::Binary(encoded.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => log::error!("failed to encode outbound event: {e}"),
                }
            }
            let _ = ws_sender.send(Message::Close(None)).await;
        });

        // Reader pump: decode inbound frames into events.
        tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ServerEvent::decode(&bytes) {
                            Ok(event) => {
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => log::warn!("undecodable frame from relay: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            // event_tx drops here; next_event() then yields None.
        });

        Ok(Self {
            outgoing_tx,
            event_rx,
            server_url,
        })
    }

    /// Join a document's room.
    pub async fn join(&self, document_id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(ClientEvent::Join {
            document_id: document_id.into(),
        })
        .await
    }

    /// Send an edit delta to the other members of the room.
    pub async fn send_edit(
        &self,
        document_id: impl Into<String>,
        delta: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientEvent::EditDelta {
            document_id: document_id.into(),
            delta,
        })
        .await
    }

    /// Send a cursor/selection move to the other members of the room.
    pub async fn send_cursor(
        &self,
        document_id: impl Into<String>,
        range: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientEvent::CursorMove {
            document_id: document_id.into(),
            range,
        })
        .await
    }

    /// Next event from the relay; `None` once the connection has closed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    /// The server URL this client connected to.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn send(&self, event: ClientEvent) -> Result<(), ProtocolError> {
        self.outgoing_tx
            .send(event)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}
