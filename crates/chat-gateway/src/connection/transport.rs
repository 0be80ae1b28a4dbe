//! Gateway transport
//!
//! A connection is a pair of frame channels; the transport owns the socket
//! and pumps frames between it and the channels.

use async_trait::async_trait;
use chat_common::{ClientError, ClientResult};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Channel buffer size for frames in each direction
const FRAME_BUFFER_SIZE: usize = 100;

/// Frame sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame
    Text(String),
    /// Close the connection with the given code
    Close(u16),
}

/// Frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// JSON text frame
    Text(String),
    /// Connection ended; the close code if the server sent one
    Closed(Option<u16>),
}

/// An open gateway connection
#[derive(Debug)]
pub struct GatewayConnection {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<Inbound>,
}

impl GatewayConnection {
    /// Create a connection and the opposite ends of its channels
    #[must_use]
    pub fn pair() -> (Self, mpsc::Receiver<Outbound>, mpsc::Sender<Inbound>) {
        let (out_tx, out_rx) = mpsc::channel(FRAME_BUFFER_SIZE);
        let (in_tx, in_rx) = mpsc::channel(FRAME_BUFFER_SIZE);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens gateway connections
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, url: &str) -> ClientResult<GatewayConnection>;
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl GatewayTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> ClientResult<GatewayConnection> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::connection(format!("gateway connect failed: {e}")))?;

        tracing::debug!(url = %url, "WebSocket connection established");

        let (connection, mut outbound, inbound) = GatewayConnection::pair();
        let (mut ws_sink, mut ws_stream) = socket.split();

        // Send task: channel -> socket
        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if ws_sink.send(Message::Text(text)).await.is_err() {
                            tracing::warn!("Failed to send frame to WebSocket");
                            break;
                        }
                    }
                    Outbound::Close(code) => {
                        let frame = CloseFrame {
                            code: WsCloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = ws_sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = ws_sink.close().await;
        });

        // Receive task: socket -> channel
        tokio::spawn(async move {
            let mut code = None;
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound.send(Inbound::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if inbound.send(Inbound::Text(text)).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => tracing::warn!("Dropping non UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            let _ = inbound.send(Inbound::Closed(code)).await;
        });

        Ok(connection)
    }
}
