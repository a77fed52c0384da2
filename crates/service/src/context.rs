//! Cancellable request context handed to every store operation.
//!
//! A context carries an optional cancellation signal and an optional
//! deadline. Contexts form a tree: cancelling a context cancels every context
//! derived from it, and a derived context can only tighten the deadline.
//!
//! Stores call [`RequestContext::check`] before touching state and wrap
//! their awaits in [`RequestContext::run`], which drops the in-flight future
//! (rolling back any open transaction) as soon as the context is done.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::errors::{StoreError, StoreResult};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => f.write_str("context cancelled"),
            CancelCause::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

#[derive(Debug)]
struct Signal {
    fired: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Signal>>>,
}

impl Signal {
    fn new(already_fired: bool) -> Arc<Self> {
        let (fired, _) = watch::channel(already_fired);
        Arc::new(Self { fired, children: Mutex::new(Vec::new()) })
    }

    fn is_fired(&self) -> bool { *self.fired.borrow() }

    fn fire(&self) {
        self.fired.send_replace(true);
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire();
        }
    }

    fn child(self: &Arc<Self>) -> Arc<Self> {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a concurrent fire() cannot miss the child.
        let child = Signal::new(self.is_fired());
        children.retain(|w| w.strong_count() > 0);
        children.push(Arc::downgrade(&child));
        child
    }

    async fn wait(&self) {
        let mut rx = self.fired.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    signal: Option<Arc<Signal>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and everything derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    signal: Arc<Signal>,
}

impl CancelHandle {
    pub fn cancel(&self) { self.signal.fire(); }
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self { Self::default() }

    /// Derive a context that can be cancelled through the returned handle.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let signal = match &self.signal {
            Some(parent) => parent.child(),
            None => Signal::new(false),
        };
        let ctx = Self { signal: Some(signal.clone()), deadline: self.deadline };
        (ctx, CancelHandle { signal })
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline` (or earlier, if the parent does).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self { signal: self.signal.clone(), deadline: Some(deadline) }
    }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// The reason this context is done, if it is.
    pub fn err(&self) -> Option<CancelCause> {
        if self.signal.as_ref().is_some_and(|s| s.is_fired()) {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool { self.err().is_some() }

    /// Fail with a cancellation error if the context is already done.
    pub fn check(&self) -> StoreResult<()> {
        match self.err() {
            Some(cause) => Err(StoreError::Cancelled(cause)),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes. Never
    /// resolves for a background context.
    pub async fn done(&self) -> CancelCause {
        let cancelled = async {
            match &self.signal {
                Some(signal) => signal.wait().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancelled => CancelCause::Cancelled,
            _ = expired => CancelCause::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context finishes first, in which
    /// case `fut` is dropped and a cancellation error returned.
    pub async fn run<F, T>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            cause = self.done() => Err(StoreError::Cancelled(cause)),
            res = fut => res,
        }
    }
}
