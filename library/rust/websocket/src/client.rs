use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::WsError;
use crate::message::{CloseFrame, WsMessage};

/// WsConnector はハンドシェイクを行い、確立済みのコネクションを返す。
/// 呼び出し 1 回につきハンドシェイク 1 回。再接続の判断は呼び出し側が行う。
#[async_trait]
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, WsError>;
}

/// WsConnection は確立済みの 1 本の WebSocket コネクション。
/// receive は次のフレームが届くまで待機する。Close フレームを返した後は再利用しない。
#[async_trait]
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait WsConnection: Send + Sync {
    async fn send(&self, message: WsMessage) -> Result<(), WsError>;
    async fn receive(&self) -> Result<WsMessage, WsError>;
    async fn close(&self) -> Result<(), WsError>;
    fn is_open(&self) -> bool;
}

type Inbound = Result<WsMessage, WsError>;

struct LiveConnection {
    tx: mpsc::UnboundedSender<Inbound>,
    open: Arc<AtomicBool>,
}

impl LiveConnection {
    fn deliver(&self, item: Inbound) -> bool {
        self.open.load(Ordering::SeqCst) && self.tx.send(item).is_ok()
    }

    fn shutdown(self, item: Inbound) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        was_open && self.tx.send(item).is_ok()
    }
}

struct ServerState {
    accept: bool,
    attempts: u32,
    urls: Vec<String>,
    live: Option<LiveConnection>,
}

/// InMemoryWsConnector はテスト用のスクリプト可能なサーバー兼コネクタ。
/// ハンドシェイクの受理/拒否、受信フレームの投入、サーバー側からの切断を操作できる。
/// コネクションが存在しない間に投入したフレームは破棄される。
#[derive(Clone)]
pub struct InMemoryWsConnector {
    state: Arc<Mutex<ServerState>>,
    sent: Arc<Mutex<Vec<WsMessage>>>,
}

impl InMemoryWsConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                accept: true,
                attempts: 0,
                urls: Vec::new(),
                live: None,
            })),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 以降のハンドシェイクを受理するかどうかを切り替える。
    pub async fn set_accept(&self, accept: bool) {
        self.state.lock().await.accept = accept;
    }

    /// これまでに行われたハンドシェイクの回数（失敗を含む）。
    pub async fn connect_attempts(&self) -> u32 {
        self.state.lock().await.attempts
    }

    pub async fn last_url(&self) -> Option<String> {
        self.state.lock().await.urls.last().cloned()
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state
            .live
            .as_ref()
            .is_some_and(|live| live.open.load(Ordering::SeqCst))
    }

    /// 現在のコネクションにフレームを届ける。未接続なら false。
    pub async fn push_receive(&self, msg: WsMessage) -> bool {
        let state = self.state.lock().await;
        state.live.as_ref().is_some_and(|live| live.deliver(Ok(msg)))
    }

    pub async fn push_text(&self, body: impl Into<String>) -> bool {
        self.push_receive(WsMessage::text(body)).await
    }

    /// サーバー側から Close フレームを送って切断する。
    pub async fn close_from_server(&self, frame: Option<CloseFrame>) -> bool {
        let mut state = self.state.lock().await;
        state
            .live
            .take()
            .is_some_and(|live| live.shutdown(Ok(WsMessage::Close(frame))))
    }

    /// ネットワーク断など、Close フレームを伴わない異常切断を発生させる。
    pub async fn fail_connection(&self, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        let err = WsError::ReceiveError(reason.into());
        state.live.take().is_some_and(|live| live.shutdown(Err(err)))
    }

    /// クライアントが送信したフレームを送信順に返す。
    pub async fn sent(&self) -> Vec<WsMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|m| m.as_text().map(str::to_string))
            .collect()
    }
}

impl Default for InMemoryWsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WsConnector for InMemoryWsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, WsError> {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        state.urls.push(url.to_string());
        if !state.accept {
            return Err(WsError::ConnectionError("connection refused".to_string()));
        }

        if let Some(previous) = state.live.take() {
            previous.shutdown(Err(WsError::Closed("superseded".to_string())));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        state.live = Some(LiveConnection {
            tx: tx.clone(),
            open: open.clone(),
        });

        Ok(Box::new(InMemoryWsConnection {
            inbound: Mutex::new(rx),
            tx,
            open,
            sent: self.sent.clone(),
        }))
    }
}

pub struct InMemoryWsConnection {
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    tx: mpsc::UnboundedSender<Inbound>,
    open: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<WsMessage>>>,
}

#[async_trait]
impl WsConnection for InMemoryWsConnection {
    async fn send(&self, message: WsMessage) -> Result<(), WsError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(WsError::NotConnected);
        }
        self.sent.lock().await.push(message);
        Ok(())
    }

    async fn receive(&self) -> Result<WsMessage, WsError> {
        let mut rx = self.inbound.lock().await;
        match rx.recv().await {
            Some(Ok(msg)) => {
                if msg.is_close() {
                    self.open.store(false, Ordering::SeqCst);
                }
                Ok(msg)
            }
            Some(Err(e)) => {
                self.open.store(false, Ordering::SeqCst);
                Err(e)
            }
            None => Err(WsError::Closed("stream ended".to_string())),
        }
    }

    async fn close(&self) -> Result<(), WsError> {
        if self.open.swap(false, Ordering::SeqCst) {
            // 待機中の receive を起こす
            let _ = self
                .tx
                .send(Err(WsError::Closed("closed by client".to_string())));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
