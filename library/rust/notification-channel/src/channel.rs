//! 通知チャネルクライアント。
//!
//! 1 本のタスクがトランスポート・再接続カウンタ・トレイ・全タイマーを所有し、
//! ハンドルからのコマンドと内部イベントを到着順に処理する。
//!
//! 状態遷移:
//! - Disconnected --connect()--> Connecting --open--> Connected
//! - Connecting/Connected --close/error--> Disconnected（再接続を予約）
//! - 再接続回数が上限に達していれば Exhausted で停止する
//!
//! pong の応答期限は設けない。トランスポートが閉じない限り Connected のまま。

use std::sync::Arc;

use cineplex_websocket::{CloseFrame, WsConnection, WsConnector, WsError, WsMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ChannelConfig;
use crate::error::ProtocolError;
use crate::protocol::{ClientMessage, NotificationId, ServerMessage};
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::state::{ChannelState, ChannelStatus};
use crate::tray::{NotificationTray, NotificationView, TrayEvent};

const LOGGED_PAYLOAD_LIMIT: usize = 256;

#[derive(Debug)]
enum Command {
    Connect,
    MarkRead(NotificationId),
    Dismiss(NotificationId),
    Close,
    Dispose,
}

enum ChannelEvent {
    Opened {
        generation: u64,
        connection: Arc<dyn WsConnection>,
    },
    ConnectFailed {
        generation: u64,
        error: WsError,
    },
    Inbound {
        generation: u64,
        message: WsMessage,
    },
    Closed {
        generation: u64,
        frame: Option<CloseFrame>,
    },
    TransportError {
        generation: u64,
        error: WsError,
    },
    PingDue {
        generation: u64,
    },
    ReconnectDue,
    Tray(TrayEvent),
}

impl From<TrayEvent> for ChannelEvent {
    fn from(event: TrayEvent) -> Self {
        ChannelEvent::Tray(event)
    }
}

/// NotificationChannel は通知チャネルのハンドル。
/// ページのルートで生成し、参照で各ビューに渡す。
/// 操作はすべて非同期に処理され、失敗がホストへ伝播することはない。
pub struct NotificationChannel {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
    worker: JoinHandle<()>,
}

impl NotificationChannel {
    /// チャネルを生成する。接続は connect() を呼ぶまで開始しない。
    /// tokio ランタイム上で呼び出すこと。
    pub fn new(
        url: Url,
        config: ChannelConfig,
        connector: Arc<dyn WsConnector>,
        view: Arc<dyn NotificationView>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());

        let worker = ChannelWorker {
            tray: NotificationTray::new(config.display.clone(), view),
            url,
            config,
            connector,
            scheduler: Scheduler::new(events_tx),
            status: status_tx,
            state: ChannelState::Disconnected,
            reconnect_attempts: 0,
            generation: 0,
            connection: None,
            connecting: None,
            reader: None,
            ping: None,
            reconnect: None,
        };
        let worker = tokio::spawn(worker.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            worker,
        }
    }

    /// 接続を開始する。既存のトランスポートは閉じてから開き直す。
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// 既読通知を送る。Connected でなければ送らずに破棄する。
    pub fn mark_read(&self, id: NotificationId) {
        self.send(Command::MarkRead(id));
    }

    /// ユーザー操作で通知を閉じる。既読通知は 1 通知につき 1 回だけ送られる。
    pub fn dismiss(&self, id: NotificationId) {
        self.send(Command::Dismiss(id));
    }

    /// トランスポートを閉じ、保留中のタイマーをすべて破棄する（ログアウト時など）。
    /// 再接続は行わない。再開するには connect() を呼ぶ。
    pub fn close(&self) {
        self.send(Command::Close);
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// チャネルを破棄し、ワーカーの終了を待つ。
    pub async fn dispose(self) {
        self.send(Command::Dispose);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "通知チャネルのワーカーが異常終了しました");
        }
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            tracing::debug!(command = ?e.0, "通知チャネルは既に破棄されています");
        }
    }
}

struct ChannelWorker {
    url: Url,
    config: ChannelConfig,
    connector: Arc<dyn WsConnector>,
    scheduler: Scheduler<ChannelEvent>,
    tray: NotificationTray,
    status: watch::Sender<ChannelStatus>,
    state: ChannelState,
    reconnect_attempts: u32,
    // トランスポートごとに増やし、古いトランスポートからのイベントを捨てる
    generation: u64,
    connection: Option<Arc<dyn WsConnection>>,
    connecting: Option<ScheduledTask>,
    reader: Option<ScheduledTask>,
    ping: Option<ScheduledTask>,
    reconnect: Option<ScheduledTask>,
}

impl ChannelWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispose) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
        self.close_channel().await;
        tracing::debug!(url = %self.url, "通知チャネルを破棄しました");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.open_connection().await,
            Command::MarkRead(id) => self.send_read_ack(id).await,
            Command::Dismiss(id) => {
                if self.tray.dismiss(id, &self.scheduler) {
                    self.send_read_ack(id).await;
                }
            }
            Command::Close => self.close_channel().await,
            Command::Dispose => {}
        }
    }

    async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened {
                generation,
                connection,
            } => {
                if generation != self.generation {
                    self.close_transport(connection.as_ref()).await;
                    return;
                }
                self.on_open(connection);
            }
            ChannelEvent::ConnectFailed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                tracing::warn!(url = %self.url, error = %error, "通知チャネルへの接続に失敗しました");
                self.on_disconnect().await;
            }
            ChannelEvent::Inbound {
                generation,
                message,
            } => {
                if generation == self.generation {
                    self.on_message(message).await;
                }
            }
            ChannelEvent::Closed { generation, frame } => {
                if generation != self.generation {
                    return;
                }
                match frame {
                    Some(frame) => tracing::info!(
                        code = frame.code,
                        reason = %frame.reason,
                        "通知チャネルが閉じられました"
                    ),
                    None => tracing::info!("通知チャネルが閉じられました"),
                }
                self.on_disconnect().await;
            }
            ChannelEvent::TransportError { generation, error } => {
                if generation != self.generation {
                    return;
                }
                tracing::warn!(error = %error, "通知チャネルでエラーが発生しました");
                self.on_disconnect().await;
            }
            ChannelEvent::PingDue { generation } => {
                if generation == self.generation && self.state == ChannelState::Connected {
                    tracing::debug!("ping を送信します");
                    self.send_client_message(&ClientMessage::Ping).await;
                }
            }
            ChannelEvent::ReconnectDue => {
                self.reconnect = None;
                if self.state == ChannelState::Disconnected {
                    self.open_connection().await;
                }
            }
            ChannelEvent::Tray(event) => {
                if let Some(id) = self.tray.handle(event, &self.scheduler) {
                    self.send_read_ack(id).await;
                }
            }
        }
    }

    async fn open_connection(&mut self) {
        self.teardown().await;
        self.cancel_reconnect();
        self.set_state(ChannelState::Connecting);
        tracing::info!(
            url = %self.url,
            attempt = self.reconnect_attempts,
            "通知チャネルに接続します"
        );

        let generation = self.generation;
        let connector = self.connector.clone();
        let url = self.url.to_string();
        let tx = self.scheduler.sender();
        self.connecting = Some(self.scheduler.spawn(async move {
            let event = match connector.connect(&url).await {
                Ok(connection) => ChannelEvent::Opened {
                    generation,
                    connection: Arc::from(connection),
                },
                Err(error) => ChannelEvent::ConnectFailed { generation, error },
            };
            let _ = tx.send(event);
        }));
    }

    fn on_open(&mut self, connection: Arc<dyn WsConnection>) {
        self.connecting = None;
        self.connection = Some(connection.clone());
        self.reconnect_attempts = 0;
        self.set_state(ChannelState::Connected);
        tracing::info!(url = %self.url, "通知チャネルに接続しました");

        let generation = self.generation;
        self.reader = Some(
            self.scheduler
                .spawn(read_loop(generation, connection, self.scheduler.sender())),
        );
        self.ping = Some(self.scheduler.every(
            self.config.ping_initial_delay(),
            self.config.ping_interval(),
            move || ChannelEvent::PingDue { generation },
        ));
    }

    async fn on_disconnect(&mut self) {
        self.teardown().await;

        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            self.set_state(ChannelState::Disconnected);
            tracing::info!(
                attempt = self.reconnect_attempts,
                max_attempts = self.config.max_reconnect_attempts,
                delay_ms = self.config.reconnect_delay_ms,
                "再接続を予約しました"
            );
            self.reconnect = Some(
                self.scheduler
                    .after(self.config.reconnect_delay(), ChannelEvent::ReconnectDue),
            );
        } else {
            self.cancel_reconnect();
            self.set_state(ChannelState::Exhausted);
            tracing::error!(
                attempts = self.reconnect_attempts,
                url = %self.url,
                "再接続の上限に達したため通知チャネルを停止します"
            );
        }
    }

    async fn on_message(&mut self, message: WsMessage) {
        if matches!(message, WsMessage::Ping(_) | WsMessage::Pong(_)) {
            tracing::trace!("制御フレームを受信しました");
            return;
        }

        match ServerMessage::from_frame(&message) {
            Ok(ServerMessage::Notification(notification)) => {
                tracing::info!(
                    notification_id = %notification.id,
                    notification_type = %notification.notification_type,
                    "通知を受信しました"
                );
                self.tray.present(&notification, &self.scheduler);
            }
            Ok(ServerMessage::MarkReadResponse {
                notification_id,
                success,
            }) => {
                if success {
                    tracing::debug!(notification_id = %notification_id, "既読化が完了しました");
                } else {
                    tracing::warn!(notification_id = %notification_id, "サーバーが既読化に失敗しました");
                }
            }
            Ok(ServerMessage::Pong) => tracing::debug!("pong を受信しました"),
            Ok(ServerMessage::Unknown) => tracing::warn!(
                payload = %excerpt(&message),
                "未知のメッセージ種別のため無視します"
            ),
            Err(ProtocolError::NotText) => {
                tracing::warn!("テキストとして解釈できないフレームを無視します");
            }
            Err(e) => tracing::warn!(
                error = %e,
                payload = %excerpt(&message),
                "メッセージを解析できないため無視します"
            ),
        }
    }

    async fn send_read_ack(&mut self, id: NotificationId) {
        if self.state != ChannelState::Connected {
            tracing::debug!(notification_id = %id, "未接続のため既読通知を破棄します");
            return;
        }
        self.send_client_message(&ClientMessage::MarkRead {
            notification_id: id,
        })
        .await;
    }

    async fn send_client_message(&self, message: &ClientMessage) {
        let Some(connection) = &self.connection else {
            return;
        };
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "送信メッセージを生成できませんでした");
                return;
            }
        };
        // 送信失敗による切断は受信側が検知する
        match tokio::time::timeout(self.config.io_timeout(), connection.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "メッセージの送信に失敗しました"),
            Err(_) => tracing::warn!(
                timeout_ms = self.config.io_timeout_ms,
                "メッセージの送信がタイムアウトしました"
            ),
        }
    }

    async fn close_channel(&mut self) {
        self.teardown().await;
        self.cancel_reconnect();
        self.tray.clear();
        if self.state != ChannelState::Closed {
            self.set_state(ChannelState::Closed);
            tracing::info!(url = %self.url, "通知チャネルを閉じました");
        }
    }

    /// 現在のトランスポートと関連タスクを破棄する。再接続タイマーには触れない。
    async fn teardown(&mut self) {
        self.generation += 1;
        self.connecting = None;
        self.reader = None;
        self.ping = None;
        if let Some(connection) = self.connection.take() {
            self.close_transport(connection.as_ref()).await;
        }
    }

    async fn close_transport(&self, connection: &dyn WsConnection) {
        match tokio::time::timeout(self.config.io_timeout(), connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "トランスポートのクローズに失敗しました"),
            Err(_) => tracing::warn!(
                timeout_ms = self.config.io_timeout_ms,
                "トランスポートのクローズがタイムアウトしました"
            ),
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.cancel();
        }
    }

    fn set_state(&mut self, state: ChannelState) {
        self.state = state;
        self.status.send_replace(ChannelStatus {
            state,
            reconnect_attempts: self.reconnect_attempts,
        });
    }
}

async fn read_loop(
    generation: u64,
    connection: Arc<dyn WsConnection>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        let event = match connection.receive().await {
            Ok(WsMessage::Close(frame)) => ChannelEvent::Closed { generation, frame },
            Ok(message) => {
                if tx.send(ChannelEvent::Inbound { generation, message }).is_err() {
                    return;
                }
                continue;
            }
            Err(error) if error.is_closed() => ChannelEvent::Closed {
                generation,
                frame: None,
            },
            Err(error) => ChannelEvent::TransportError { generation, error },
        };
        let _ = tx.send(event);
        return;
    }
}

fn excerpt(message: &WsMessage) -> String {
    let text = message.as_text().unwrap_or("<binary>");
    match text.char_indices().nth(LOGGED_PAYLOAD_LIMIT) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
