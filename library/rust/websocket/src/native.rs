//! tokio-tungstenite を使用した本番用コネクタ。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::{WsConnection, WsConnector};
use crate::config::WsConfig;
use crate::error::WsError;
use crate::message::{CloseFrame, WsMessage};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteConnector {
    config: WsConfig,
}

impl TungsteniteConnector {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, WsError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| WsError::ConnectionError(e.to_string()))?;
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::ConnectionError(format!("invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WsError::ConnectionError(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let handshake = tokio_tungstenite::connect_async(request);
        let result = match self.config.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| WsError::Timeout)?,
            None => handshake.await,
        };
        let (stream, response) = result.map_err(|e| WsError::ConnectionError(e.to_string()))?;
        tracing::debug!(url, status = %response.status(), "WebSocket ハンドシェイク完了");

        let (sink, stream) = stream.split();
        Ok(Box::new(TungsteniteConnection {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            open: AtomicBool::new(true),
        }))
    }
}

pub struct TungsteniteConnection {
    sink: Mutex<SplitSink<Stream, Message>>,
    stream: Mutex<SplitStream<Stream>>,
    open: AtomicBool,
}

impl TungsteniteConnection {
    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn send(&self, message: WsMessage) -> Result<(), WsError> {
        if !self.is_open() {
            return Err(WsError::NotConnected);
        }
        let mut sink = self.sink.lock().await;
        sink.send(to_tungstenite(message))
            .await
            .map_err(|e| WsError::SendError(e.to_string()))
    }

    async fn receive(&self) -> Result<WsMessage, WsError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(msg)) => {
                    let msg = from_tungstenite(msg);
                    if msg.is_close() {
                        self.mark_closed();
                    }
                    return Ok(msg);
                }
                Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) => {
                    self.mark_closed();
                    return Err(WsError::Closed("connection closed".to_string()));
                }
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(WsError::ReceiveError(e.to_string()));
                }
                None => {
                    self.mark_closed();
                    return Err(WsError::Closed("stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), WsError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| WsError::Closed(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text.into()),
        WsMessage::Binary(bytes) => Message::Binary(bytes.into()),
        WsMessage::Ping(bytes) => Message::Ping(bytes.into()),
        WsMessage::Pong(bytes) => Message::Pong(bytes.into()),
        WsMessage::Close(frame) => Message::Close(frame.map(|f| TungsteniteCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.into(),
        })),
    }
}

fn from_tungstenite(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text.to_string()),
        Message::Binary(bytes) => WsMessage::Binary(bytes.to_vec()),
        Message::Ping(bytes) => WsMessage::Ping(bytes.to_vec()),
        Message::Pong(bytes) => WsMessage::Pong(bytes.to_vec()),
        Message::Close(frame) => WsMessage::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.to_string(),
        })),
        // receive 側で読み飛ばすため到達しない
        Message::Frame(_) => WsMessage::Binary(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_conversion() {
        let msg = to_tungstenite(WsMessage::text("{\"type\":\"ping\"}"));
        assert!(matches!(msg, Message::Text(ref t) if t.as_str() == "{\"type\":\"ping\"}"));
        assert_eq!(from_tungstenite(msg), WsMessage::text("{\"type\":\"ping\"}"));
    }

    #[test]
    fn test_close_conversion_keeps_code() {
        let msg = to_tungstenite(WsMessage::Close(Some(CloseFrame::normal("logout"))));
        match from_tungstenite(msg) {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(frame.code, 1000);
                assert_eq!(frame.reason, "logout");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected_before_handshake() {
        let connector = TungsteniteConnector::new(WsConfig::new().header("bad header", "v"));
        let result = connector.connect("ws://127.0.0.1:9/ws").await;
        assert!(matches!(result, Err(WsError::ConnectionError(_))));
    }
}
