//! Cooperative cancellation.
//!
//! A [`CancelToken`] is threaded through the task runner and every builder.
//! Long-running work polls it at safe points and bails out with
//! [`Error::Cancelled`] once it fires, either because [`CancelToken::cancel`]
//! was called or because the optional deadline passed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cloneable cancellation handle. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires automatically once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Returns `Err(Error::Cancelled)` naming `task` if the token has fired.
    pub fn check(&self, task: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                task: task.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.check("x86_64").unwrap_err().is_cancelled());
    }

    #[test]
    fn test_deadline_fires() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_far_deadline_does_not_fire() {
        let token = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(token.check("arm64").is_ok());
    }
}
