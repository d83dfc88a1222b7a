//! Realtime notification transport.
//!
//! [`RealtimeConnector`] opens one authenticated, subscribed session for an
//! identity; [`RealtimeSession`] yields raw JSON payloads until the link
//! drops. Reconnection policy lives one layer up (`ledgerlink-core`), so a
//! connector only ever performs a single handshake.
//!
//! [`StompConnector`] is the production implementation: STOMP 1.2 over a
//! WebSocket, bearer credential in the CONNECT frame, one SUBSCRIBE to the
//! identity's topic.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::stomp::Frame;

const SUBSCRIPTION_ID: &str = "sub-0";

// ── Traits ───────────────────────────────────────────────────────────

/// Opens realtime sessions. One call = one handshake + subscription.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(
        &self,
        identity: &str,
        credential: &SecretString,
    ) -> Result<Box<dyn RealtimeSession>, Error>;
}

/// A live, subscribed session.
#[async_trait]
pub trait RealtimeSession: Send {
    /// Next inbound payload. `None` means the broker ended the stream cleanly.
    async fn next_payload(&mut self) -> Option<Result<String, Error>>;

    /// Unsubscribe and close the underlying transport. Best effort.
    async fn close(&mut self);
}

// ── StompConnector ───────────────────────────────────────────────────

/// STOMP-over-WebSocket connector.
#[derive(Debug, Clone)]
pub struct StompConnector {
    url: Url,
    topic_prefix: String,
}

impl StompConnector {
    /// `url` is the broker endpoint (e.g. `wss://bank.example/ws`). Topics are
    /// `"{topic_prefix}/{identity}"`.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            topic_prefix: "/topic/notifications".into(),
        }
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// The per-identity destination this connector subscribes to.
    pub fn topic_for(&self, identity: &str) -> String {
        format!("{}/{identity}", self.topic_prefix.trim_end_matches('/'))
    }
}

#[async_trait]
impl RealtimeConnector for StompConnector {
    async fn connect(
        &self,
        identity: &str,
        credential: &SecretString,
    ) -> Result<Box<dyn RealtimeSession>, Error> {
        info!(url = %self.url, "connecting to notification broker");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_sub_protocol("v12.stomp");

        let (mut ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let host = self.url.host_str().unwrap_or("localhost");
        send_frame(&mut ws, &Frame::connect(host, credential.expose_secret())).await?;
        await_connected(&mut ws).await?;

        let destination = self.topic_for(identity);
        send_frame(&mut ws, &Frame::subscribe(SUBSCRIPTION_ID, &destination)).await?;
        info!(destination = %destination, "subscribed to notifications");

        Ok(Box::new(StompSession {
            ws,
            pending: VecDeque::new(),
        }))
    }
}

// ── StompSession ─────────────────────────────────────────────────────

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct StompSession {
    ws: Ws,
    /// MESSAGE bodies decoded from a payload that carried several frames.
    pending: VecDeque<String>,
}

#[async_trait]
impl RealtimeSession for StompSession {
    async fn next_payload(&mut self) -> Option<Result<String, Error>> {
        loop {
            if let Some(body) = self.pending.pop_front() {
                return Some(Ok(body));
            }

            match self.ws.next().await? {
                Ok(tungstenite::Message::Text(text)) => {
                    if let Err(e) = route_payload(&text, &mut self.pending) {
                        return Some(Err(e));
                    }
                }
                Ok(tungstenite::Message::Ping(_)) => {
                    // tungstenite handles pong replies automatically
                    trace!("WebSocket ping");
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(cf) = frame {
                        return Some(Err(Error::WebSocketClosed {
                            code: cf.code.into(),
                            reason: cf.reason.to_string(),
                        }));
                    }
                    info!("WebSocket close frame received (no payload)");
                    return None;
                }
                Ok(_) => {
                    // Binary, Pong, Frame -- ignore
                }
                Err(e) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = send_frame(&mut self.ws, &Frame::unsubscribe(SUBSCRIPTION_ID)).await;
        let _ = send_frame(&mut self.ws, &Frame::disconnect()).await;
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "WebSocket close failed (non-fatal)");
        }
    }
}

/// Queue the MESSAGE bodies carried by one WebSocket payload.
///
/// Frames that fail to decode are logged and skipped; the session stays up.
/// Only a broker ERROR frame ends it.
fn route_payload(text: &str, pending: &mut VecDeque<String>) -> Result<(), Error> {
    for frame in Frame::decode_each(text) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable STOMP frame");
                continue;
            }
        };
        match frame.command.as_str() {
            "MESSAGE" => pending.push_back(frame.body),
            "ERROR" => {
                return Err(Error::Stomp {
                    message: frame
                        .get_header("message")
                        .unwrap_or("broker sent ERROR frame")
                        .to_owned(),
                });
            }
            other => trace!(command = other, "ignoring STOMP frame"),
        }
    }
    Ok(())
}

// ── Handshake helpers ────────────────────────────────────────────────

async fn send_frame(ws: &mut Ws, frame: &Frame) -> Result<(), Error> {
    ws.send(tungstenite::Message::text(frame.encode()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Read until the broker answers the CONNECT frame.
async fn await_connected(ws: &mut Ws) -> Result<(), Error> {
    while let Some(msg) = ws.next().await {
        let text = match msg.map_err(|e| Error::WebSocketConnect(e.to_string()))? {
            tungstenite::Message::Text(text) => text,
            tungstenite::Message::Close(_) => break,
            _ => continue,
        };
        for frame in Frame::decode_all(&text)? {
            match frame.command.as_str() {
                "CONNECTED" => {
                    debug!(version = ?frame.get_header("version"), "STOMP session established");
                    return Ok(());
                }
                "ERROR" => {
                    return Err(Error::Stomp {
                        message: frame
                            .get_header("message")
                            .unwrap_or("handshake rejected")
                            .to_owned(),
                    });
                }
                other => trace!(command = other, "ignoring frame before CONNECTED"),
            }
        }
    }

    Err(Error::Stomp {
        message: "connection closed before CONNECTED frame".into(),
    })
}
