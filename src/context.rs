//! Cancellation and deadline signal carried by every board operation.
//!
//! A [`Context`] is cheap to clone; all clones share the same cancellation
//! flag. An operation called with an already-finished context fails at once
//! without touching the wire.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rs_arest::Context;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(2));
//! assert!(!ctx.is_done());
//!
//! ctx.cancel();
//! assert!(ctx.is_done());
//! assert!(ctx.check().is_err());
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{BoardError, Result};

/// Cancellation handle with an optional deadline.
#[derive(Clone, Debug)]
pub struct Context {
    cancel: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never done unless cancelled.
    pub fn background() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancel: Arc::new(tx),
            deadline: None,
        }
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline(Instant::now() + timeout)
    }

    /// Set (or tighten) the deadline. Shares cancellation with `self`.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < at => existing,
            _ => at,
        });
        self
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<BoardError> {
        if *self.cancel.borrow() {
            Some(BoardError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(BoardError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    ///
    /// Returns the matching error, ready to hand back to the caller.
    pub async fn done(&self) -> BoardError {
        let mut rx = self.cancel.subscribe();
        let cancelled = async {
            // The sender lives as long as `self`, so this only returns on cancel.
            let _ = rx.wait_for(|c| *c).await;
        };

        match self.deadline {
            Some(at) => tokio::select! {
                _ = cancelled => BoardError::Cancelled,
                _ = tokio::time::sleep_until(at) => BoardError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                BoardError::Cancelled
            }
        }
    }
}
