//! Cancellable deadlines shared by every blocking call.
//!
//! A [`Deadline`] bounds an operation in time and carries the process-wide
//! [`CancelSignal`]. Both the readiness poll loop and single network calls go
//! through [`Deadline::run`] / [`Deadline::sleep`], so an interrupt surfaces as
//! [`Error::Cancelled`] at whichever point the process is blocked.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Receiving side of the cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending side, held by whoever handles OS interrupts.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = self.rx.as_ref() else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
    cancel: CancelSignal,
}

impl Deadline {
    pub fn after(budget: Duration, cancel: CancelSignal) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
            cancel,
        }
    }

    /// A deadline for a sub-operation, never later than this one.
    pub fn child(&self, budget: Duration) -> Self {
        let at = (Instant::now() + budget).min(self.at);
        Self {
            at,
            budget: budget.min(self.budget),
            cancel: self.cancel.clone(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Race `fut` against the deadline and the cancellation signal.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(self.at) => Err(Error::Timeout(self.budget)),
            result = fut => result,
        }
    }

    /// Sleep for `interval`, cut short by the deadline.
    ///
    /// Returns `Ok(())` when the interval or the deadline elapses; callers
    /// check [`Deadline::is_expired`] afterwards.
    pub async fn sleep(&self, interval: Duration) -> Result<()> {
        let wake = (Instant::now() + interval).min(self.at);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(wake) => Ok(()),
        }
    }
}
