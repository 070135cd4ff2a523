//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] into the reader/writer halves the
//! hub drives. Envelopes are JSON, so data frames go out as text messages;
//! both text and binary messages are accepted inbound.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};
use tracing::debug;

use crate::traits::{FrameReader, FrameWriter, Incoming, TransportError};

/// Split an upgraded socket into hub-facing halves.
#[must_use]
pub fn split(socket: WebSocket, remote_addr: Option<String>) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    (
        WebSocketReader {
            stream,
            remote_addr,
        },
        WebSocketWriter { sink, closed: false },
    )
}

/// Read half of a WebSocket connection.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
    remote_addr: Option<String>,
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Incoming::Frame(Bytes::from(text)))),
            Some(Ok(Message::Binary(data))) => Ok(Some(Incoming::Frame(Bytes::from(data)))),
            // Pongs to pings are queued by the socket itself and flushed with
            // the next write.
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                Ok(Some(Incoming::Heartbeat))
            }
            Some(Ok(Message::Close(_))) => {
                debug!("Received close frame");
                Ok(None)
            }
            Some(Err(e)) => Err(read_error(e)),
            None => {
                debug!("WebSocket stream ended");
                Ok(None)
            }
        }
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}

/// Surface the socket's own message size limit as [`TransportError::FrameTooLarge`].
fn read_error(error: axum::Error) -> TransportError {
    let error = error.into_inner();
    match error.downcast_ref::<WsError>() {
        Some(WsError::Capacity(CapacityError::MessageTooLong { size, max_size })) => {
            TransportError::FrameTooLarge {
                size: *size,
                max: *max_size,
            }
        }
        _ => TransportError::ReceiveFailed(error.to_string()),
    }
}

/// Write half of a WebSocket connection.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WebSocketWriter {
    async fn write(&mut self, message: Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(Vec::from(frame))
            .map_err(|e| TransportError::SendFailed(format!("frame is not UTF-8: {}", e)))?;
        self.write(Message::Text(text)).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.write(Message::Ping(Vec::new())).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(()); // Already closed
        }
        self.closed = true;
        // A failed close just means the peer is already gone.
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}
