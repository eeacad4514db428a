use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("メッセージの解析に失敗しました: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("メッセージの生成に失敗しました: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("テキストとして解釈できないフレームです")]
    NotText,
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("無効な URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("未対応のスキーム: {0}")]
    UnsupportedScheme(String),
    #[error("ホストが指定されていません: {0}")]
    MissingHost(String),
}
