//! WebSocket stream channel.
//!
//! One `WsChannel` owns one connected socket, split into:
//!
//! - a **writer task** fed by an mpsc channel, so any number of callers can
//!   send without contending on the sink,
//! - a **reader task** forwarding inbound text frames to the receiver handed
//!   out by [`WsChannel::connect`].
//!
//! Either task flips the shared connected flag off when the socket closes or
//! errors; transport errors are logged here and never escalate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::MessageChannel;
use crate::error::{BotgateError, Result};

/// Capacity of the outbound and inbound message queues.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A connected WebSocket channel to the gateway.
pub struct WsChannel {
    name: &'static str,
    outbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl WsChannel {
    /// Dial `url`, carrying the access token in the `Authorization` header.
    ///
    /// Returns the channel handle and the receiver on which inbound text
    /// frames are delivered. `name` identifies the channel in logs.
    pub async fn connect(
        name: &'static str,
        url: &str,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<String>)> {
        let mut request = url.into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_| BotgateError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = connect_async(request).await?;
        tracing::info!(channel = name, %url, "connected");

        let (sink, stream) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_loop(name, sink, outbound_rx, connected.clone()));
        tokio::spawn(read_loop(name, stream, inbound_tx, connected.clone()));

        Ok((
            Self {
                name,
                outbound: outbound_tx,
                connected,
            },
            inbound_rx,
        ))
    }
}

#[async_trait::async_trait]
impl MessageChannel for WsChannel {
    async fn send(&self, payload: String) -> Result<()> {
        if !self.is_connected() {
            return Err(BotgateError::NotConnected);
        }
        self.outbound.send(payload).await.map_err(|_| {
            tracing::debug!(channel = self.name, "send after writer shut down");
            BotgateError::ConnectionClosed
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Drain the outbound queue into the socket sink.
async fn write_loop<S>(
    name: &'static str,
    mut sink: S,
    mut outbound: mpsc::Receiver<String>,
    connected: Arc<AtomicBool>,
) where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(payload) = outbound.recv().await {
        if let Err(error) = sink.send(Message::Text(payload)).await {
            tracing::error!(channel = name, %error, "write failed");
            break;
        }
    }
    connected.store(false, Ordering::Release);
}

/// Forward inbound text frames until the socket closes or errors.
async fn read_loop<S>(
    name: &'static str,
    mut stream: S,
    inbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
) where
    S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                tracing::error!(channel = name, %error, "read failed");
                break;
            }
            None => {
                tracing::info!(channel = name, "closed by remote");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(error) => {
                    tracing::error!(channel = name, %error, "dropping non-utf8 frame");
                    continue;
                }
            },
            Message::Close(_) => {
                tracing::info!(channel = name, "close frame received");
                break;
            }
            // Ping/pong are handled by the protocol layer.
            _ => continue,
        };

        if inbound.send(text).await.is_err() {
            // Receiver dropped: the client is gone, stop reading.
            break;
        }
    }
    connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal in-process gateway: accepts one socket and echoes text frames.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Text(text) = message {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_connect_send_receive() {
        let url = spawn_echo_server().await;
        let (channel, mut inbound) = WsChannel::connect("test", &url, "secret")
            .await
            .unwrap();

        assert!(channel.is_connected());

        channel.send(r#"{"hello":true}"#.to_string()).await.unwrap();
        let echoed = inbound.recv().await.unwrap();
        assert_eq!(echoed, r#"{"hello":true}"#);
    }

    #[tokio::test]
    async fn test_disconnected_after_remote_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Complete the handshake, then drop the socket.
            let _socket = accept_async(stream).await.unwrap();
        });

        let url = format!("ws://{addr}");
        let (channel, mut inbound) = WsChannel::connect("test", &url, "secret")
            .await
            .unwrap();

        // The reader observes the close and flips the flag.
        assert!(inbound.recv().await.is_none());
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing listens here.
        let result = WsChannel::connect("test", "ws://127.0.0.1:1", "secret").await;
        assert!(result.is_err());
    }
}
