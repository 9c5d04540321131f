//! # 会话状态机
//!
//! ## 意图（Why）
//! - 流式调用的客户端侧操作（开始、发送、半关闭、取消）有严格的先后关系，
//!   把合法迁移集中在一个纯同步的状态机里，各传输实现只需在持锁区间内调用它；
//!
//! ## 契约（What）
//! ```text
//! Created --start--> Started --send--> Sending --finish_send--> HalfClosed --end--> Ended
//!                       |                 ^  |
//!                       |                 +--+ (仅流式：重复 send)
//!                       +------finish_send------> HalfClosed
//! 任意非终止状态 --cancel--> Cancelled；任意非终止状态 --end--> Ended（对端可提前结束）
//! ```
//! - 非法迁移返回 [`TransportError::InvalidState`]，状态保持不变；
//! - 非流式传输上第二次 `send` 返回 [`TransportError::ClientStreamingUnsupported`]；
//! - `Ended` 与 `Cancelled` 为终止状态，重复 `cancel`/`end` 是无操作。

use crate::error::TransportError;

/// 调用的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Started,
    Sending,
    HalfClosed,
    Ended,
    Cancelled,
}

impl SessionState {
    /// 是否已终止。
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }
}

/// 客户端侧状态机。
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    client_streaming: bool,
    messages_sent: usize,
}

impl SessionStateMachine {
    pub const fn new(client_streaming: bool) -> Self {
        Self {
            state: SessionState::Created,
            client_streaming,
            messages_sent: 0,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// `Created → Started`。
    pub fn start(&mut self) -> Result<(), TransportError> {
        match self.state {
            SessionState::Created => {
                self.state = SessionState::Started;
                Ok(())
            }
            other => Err(TransportError::invalid_state("start", other)),
        }
    }

    /// 记录一次发送，`Started|Sending → Sending`。
    pub fn send(&mut self) -> Result<(), TransportError> {
        match self.state {
            SessionState::Started => {}
            SessionState::Sending if self.client_streaming => {}
            SessionState::Sending => return Err(TransportError::ClientStreamingUnsupported),
            other => return Err(TransportError::invalid_state("send_message", other)),
        }
        self.state = SessionState::Sending;
        self.messages_sent += 1;
        Ok(())
    }

    /// 结束发送，`Started|Sending → HalfClosed`。
    pub fn finish_send(&mut self) -> Result<(), TransportError> {
        match self.state {
            SessionState::Started | SessionState::Sending => {
                self.state = SessionState::HalfClosed;
                Ok(())
            }
            other => Err(TransportError::invalid_state("finish_send", other)),
        }
    }

    /// 对端结束调用；返回是否发生了迁移。
    pub fn end(&mut self) -> bool {
        self.terminate(SessionState::Ended)
    }

    /// 取消调用；返回是否发生了迁移，重复取消返回 `false`。
    pub fn cancel(&mut self) -> bool {
        self.terminate(SessionState::Cancelled)
    }

    fn terminate(&mut self, to: SessionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = to;
        true
    }
}
