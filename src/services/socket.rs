//! Socket transport seam.
//!
//! The connection manager only ever talks to [`SocketTransport`] and
//! [`SocketLink`]; the websocket implementation lives behind them so tests
//! can script the transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{ChatError, Result};

/// One live bidirectional connection.
#[async_trait]
pub trait SocketLink: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Send a keepalive ping.
    async fn ping(&mut self) -> Result<()>;

    /// Receive the next text frame. `None` means the remote side closed
    /// the connection; `Some(Err(_))` is a transport error.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Dials the realtime endpoint with a bearer credential.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Box<dyn SocketLink>>;
}

// ── WebSocket implementation ───────────────────────────────────

/// `tokio-tungstenite` backed transport.
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| ChatError::Config(format!("socket URL: {}", e)))?;
        Ok(Self { url })
    }
}

#[async_trait]
impl SocketTransport for WsTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn SocketLink>> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ChatError::Connection(format!("credential not header-safe: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = connect_async(request).await?;
        log::info!("WebSocket connected to {}", self.url);
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketLink for WsLink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        log::warn!("Ignoring non-UTF-8 binary frame: {}", e);
                    }
                },
                // Control frames are transport noise to the layers above.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
