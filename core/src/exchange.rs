//! One HTTP exchange raced against a deadline.
//!
//! # Design
//! The network call and the deadline timer run as two tasks that both try to
//! settle a shared `CompletionToken`. The token is single-assignment: the
//! first writer wins and the loser sees an already-settled state and backs
//! off without side effects. When the timer wins it also aborts the network
//! task, which drops the in-flight transport future and releases its
//! connection.
//!
//! ```text
//! begin()
//!   ├─ call task ──▶ transport.execute ──▶ try_complete ──▶ on_success
//!   └─ timer task ──▶ sleep(timeout) ──▶ try_time_out ──▶ abort call ──▶ on_timeout
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::http::{RequestDescriptor, Transport, TransportResponse};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const TIMED_OUT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Pending,
    Completed,
    TimedOut,
}

/// Single-assignment record of how an exchange ended.
#[derive(Debug, Clone, Default)]
pub struct CompletionToken {
    state: Arc<AtomicU8>,
}

impl CompletionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ExchangeState {
        match self.state.load(Ordering::Acquire) {
            COMPLETED => ExchangeState::Completed,
            TIMED_OUT => ExchangeState::TimedOut,
            _ => ExchangeState::Pending,
        }
    }

    pub fn has_timed_out(&self) -> bool {
        self.state() == ExchangeState::TimedOut
    }

    /// Settle as completed. Returns false if the exchange was already settled.
    pub fn try_complete(&self) -> bool {
        self.settle(COMPLETED)
    }

    /// Settle as timed out. Returns false if the exchange was already settled.
    pub fn try_time_out(&self) -> bool {
        self.settle(TIMED_OUT)
    }

    fn settle(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A request paired with a deadline.
pub struct TimedExchange {
    transport: Arc<dyn Transport>,
    request: RequestDescriptor,
    timeout: Duration,
    token: CompletionToken,
}

impl TimedExchange {
    pub fn create(transport: Arc<dyn Transport>, request: RequestDescriptor, timeout: Duration) -> Self {
        Self {
            transport,
            request,
            timeout,
            token: CompletionToken::new(),
        }
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut RequestDescriptor {
        &mut self.request
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token(&self) -> CompletionToken {
        self.token.clone()
    }

    /// Run the exchange. Exactly one of `on_success` / `on_timeout` is called.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn begin<R>(
        self,
        on_success: impl FnOnce(Result<TransportResponse, TransportError>) -> R,
        on_timeout: impl FnOnce() -> R,
    ) -> R {
        let Self {
            transport,
            request,
            timeout,
            token,
        } = self;

        let call = tokio::spawn(async move { transport.execute(request).await });
        let abort = call.abort_handle();

        let timer_token = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if timer_token.try_time_out() {
                abort.abort();
            }
        });

        let joined = call.await;
        timer.abort();

        if !token.try_complete() {
            tracing::debug!(?timeout, "exchange timed out");
            return on_timeout();
        }
        match joined {
            Ok(result) => on_success(result),
            Err(e) => on_success(Err(TransportError::Other(format!("transport task failed: {e}")))),
        }
    }
}
