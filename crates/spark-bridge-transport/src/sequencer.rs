//! # CallbackSequencer：回调时序守卫
//!
//! ## 意图（Why）
//! - 传输实现的生产端（网络读循环、进程内处理任务）可能来自多个执行上下文，
//!   而回调的使用方只想看到一条整齐的序列：头部一次、分块若干、结束一次；
//! - 取消之后任何回调都不得再触发，即便生产端还在途中。
//!
//! ## 契约（What）
//! - 投递在互斥锁内逐个执行，同一调用的回调绝不并发；
//! - `on_headers` 恰好一次且先于任何 `on_chunk`；`on_end` 恰好一次且最后；
//! - 没有头部就结束时，先补发状态 0 的头部，再投递 `on_end`，保持“头部恰好一次”；
//! - 违反时序的投递被丢弃并记录 `warn`，返回 [`TransportError::SequenceViolation`]；
//! - 取消只翻转原子标志，不获取互斥锁，因此可以在回调内部安全调用。
//!
//! ## 风险提示（Trade-offs）
//! - 回调在锁内执行，耗时的回调会阻塞同一调用的其他生产端；回调应尽快返回。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    error::TransportError,
    options::{ResponseHeaders, TransportCallbacks},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeliveryPhase {
    AwaitingHeaders,
    Streaming,
    Ended,
}

impl DeliveryPhase {
    const fn last_callback(self) -> &'static str {
        match self {
            Self::AwaitingHeaders => "start",
            Self::Streaming => "on_headers",
            Self::Ended => "on_end",
        }
    }
}

/// 为单次调用串行化并校验回调投递。
pub struct CallbackSequencer {
    url: Arc<str>,
    debug: bool,
    callbacks: Arc<dyn TransportCallbacks>,
    phase: Mutex<DeliveryPhase>,
    cancelled: AtomicBool,
}

impl CallbackSequencer {
    pub fn new(url: Arc<str>, debug: bool, callbacks: Arc<dyn TransportCallbacks>) -> Self {
        Self {
            url,
            debug,
            callbacks,
            phase: Mutex::new(DeliveryPhase::AwaitingHeaders),
            cancelled: AtomicBool::new(false),
        }
    }

    /// 投递响应头。
    pub fn deliver_headers(&self, headers: ResponseHeaders) -> Result<(), TransportError> {
        let mut phase = self.phase.lock();
        self.ensure_live()?;
        if *phase != DeliveryPhase::AwaitingHeaders {
            return Err(self.violation("on_headers", *phase));
        }
        self.note("on_headers");
        *phase = DeliveryPhase::Streaming;
        self.callbacks.on_headers(headers);
        Ok(())
    }

    /// 投递一个响应分块。
    pub fn deliver_chunk(&self, chunk: Bytes) -> Result<(), TransportError> {
        let phase = self.phase.lock();
        self.ensure_live()?;
        if *phase != DeliveryPhase::Streaming {
            return Err(self.violation("on_chunk", *phase));
        }
        self.note("on_chunk");
        self.callbacks.on_chunk(chunk);
        Ok(())
    }

    /// 投递结束信号；若头部尚未投递，先补发状态 0 的头部。
    pub fn deliver_end(&self, error: Option<TransportError>) -> Result<(), TransportError> {
        let mut phase = self.phase.lock();
        self.ensure_live()?;
        match *phase {
            DeliveryPhase::Ended => return Err(self.violation("on_end", *phase)),
            DeliveryPhase::AwaitingHeaders => {
                self.note("on_headers");
                *phase = DeliveryPhase::Streaming;
                self.callbacks.on_headers(ResponseHeaders::connection_failure());
                // 头部回调内可能已取消。
                self.ensure_live()?;
            }
            DeliveryPhase::Streaming => {}
        }
        self.note("on_end");
        *phase = DeliveryPhase::Ended;
        self.callbacks.on_end(error);
        Ok(())
    }

    /// 标记取消；返回是否为首次取消。
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            debug!(url = %self.url, "transport callbacks silenced by cancel");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 头部是否已投递。
    pub fn headers_delivered(&self) -> bool {
        *self.phase.lock() != DeliveryPhase::AwaitingHeaders
    }

    /// `on_end` 是否已投递。
    pub fn is_finished(&self) -> bool {
        *self.phase.lock() == DeliveryPhase::Ended
    }

    fn ensure_live(&self) -> Result<(), TransportError> {
        if self.is_cancelled() {
            Err(TransportError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn violation(&self, callback: &'static str, phase: DeliveryPhase) -> TransportError {
        let after = phase.last_callback();
        warn!(
            url = %self.url,
            callback,
            after,
            "out-of-order transport callback dropped"
        );
        TransportError::SequenceViolation { callback, after }
    }

    fn note(&self, callback: &'static str) {
        if self.debug {
            debug!(url = %self.url, callback, "delivering transport callback");
        } else {
            trace!(url = %self.url, callback, "delivering transport callback");
        }
    }
}

impl fmt::Debug for CallbackSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSequencer")
            .field("url", &self.url)
            .field("phase", &*self.phase.lock())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
