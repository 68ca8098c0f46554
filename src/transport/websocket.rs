//! WebSocket transport over tokio-tungstenite

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use super::{Connector, Link, WireMessage};
use crate::{ChannelError, Result};

/// Opens plain WebSocket links
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>> {
        let (socket, response) = connect_async(endpoint).await.map_err(|e| {
            ChannelError::transport_with_source(format!("connect to {} failed", endpoint), Box::new(e))
        })?;
        debug!(status = %response.status(), "WebSocket upgrade to {} complete", endpoint);
        Ok(Box::new(WebSocketLink { socket }))
    }
}

struct WebSocketLink {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Link for WebSocketLink {
    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let message = match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(bytes) => Message::Binary(bytes.to_vec()),
        };
        self.socket
            .send(message)
            .await
            .map_err(|e| ChannelError::transport_with_source("send failed", Box::new(e)))
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => {
                    return Some(Err(ChannelError::transport_with_source("receive failed", Box::new(e))));
                }
            };

            match message {
                Message::Text(text) => return Some(Ok(WireMessage::Text(text))),
                Message::Binary(data) => return Some(Ok(WireMessage::Binary(Bytes::from(data)))),
                Message::Close(frame) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return None;
                }
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Skipping control frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.socket.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ChannelError::transport_with_source("close failed", Box::new(e))),
        }
    }
}
