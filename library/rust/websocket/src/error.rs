use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("接続エラー: {0}")]
    ConnectionError(String),
    #[error("送信エラー: {0}")]
    SendError(String),
    #[error("受信エラー: {0}")]
    ReceiveError(String),
    #[error("未接続です")]
    NotConnected,
    #[error("切断されました: {0}")]
    Closed(String),
    #[error("ハンドシェイクがタイムアウトしました")]
    Timeout,
}

impl WsError {
    /// 相手側または自身のクローズによる正常な切断かどうかを返す。
    pub fn is_closed(&self) -> bool {
        matches!(self, WsError::Closed(_))
    }
}
