// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellable one-shot timers.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Runs a task once after a delay.
pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Handle to a scheduled task.
///
/// Cancelling before the delay elapses prevents the task from running. A
/// task that has already started is left to finish.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Timer backed by `tokio::time`, so tests can drive it with a paused clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        TimerHandle::new(cancel)
    }
}
