/// チャネルの接続状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// 初期状態、または再接続待ち。
    Disconnected,
    Connecting,
    Connected,
    /// 再接続の上限に達した終端状態。自動では復帰しない。
    Exhausted,
    /// close() による意図的な切断。
    Closed,
}

impl ChannelState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelState::Exhausted | ChannelState::Closed)
    }
}

/// ホストに公開する状態のスナップショット。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub reconnect_attempts: u32,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Disconnected,
            reconnect_attempts: 0,
        }
    }
}
