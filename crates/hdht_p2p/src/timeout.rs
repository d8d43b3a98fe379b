//! Deadlines on remote calls.

use crate::types::{HdhtP2pError, HdhtP2pResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// The instant by which one dial or request must finish. It is fixed when
/// created, so a copy handed to a later step shares what is left of the
/// budget rather than starting a new one.
#[derive(Debug, Clone, Copy)]
pub struct HdhtTimeout {
    op: &'static str,
    budget: Duration,
    deadline: Instant,
}

impl HdhtTimeout {
    /// A deadline `budget` from now for the operation named `op`.
    pub fn after(op: &'static str, budget: Duration) -> Self {
        Self {
            op,
            budget,
            deadline: Instant::now() + budget,
        }
    }

    pub fn after_millis(op: &'static str, millis: u64) -> Self {
        Self::after(op, Duration::from_millis(millis))
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Drive `f` until it finishes or the deadline passes. A passed deadline
    /// drops `f` and yields [`HdhtP2pError::TimedOut`].
    pub fn bound<'a, R, F>(&self, f: F) -> impl Future<Output = HdhtP2pResult<R>> + Send + 'a
    where
        R: 'a,
        F: Future<Output = HdhtP2pResult<R>> + Send + 'a,
    {
        let this = *self;
        async move {
            match tokio::time::timeout_at(this.deadline, f).await {
                Ok(r) => r,
                Err(_) => {
                    tracing::debug!(
                        op = this.op,
                        budget_ms = this.budget.as_millis() as u64,
                        "deadline passed"
                    );
                    Err(HdhtP2pError::TimedOut)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[tokio::test(flavor = "multi_thread")]
    async fn fast_call_keeps_its_result() {
        let t = HdhtTimeout::after_millis("request", 1000);
        assert!(t.remaining() > Duration::ZERO);
        assert_matches!(t.bound(async { Ok(7) }).await, Ok(7));
        assert_matches!(
            t.bound(async { Err::<(), _>(HdhtP2pError::NoGossipersAvailable) }).await,
            Err(HdhtP2pError::NoGossipersAvailable)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_call_times_out() {
        let t = HdhtTimeout::after_millis("dial", 10);
        let slow = t.bound(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        assert_matches!(slow.await, Err(HdhtP2pError::TimedOut));
        assert_eq!(Duration::ZERO, t.remaining());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn copies_share_one_deadline() {
        let t = HdhtTimeout::after_millis("request", 30);
        let later = t;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(Duration::ZERO, later.remaining());

        // no fresh budget for the second step
        let start = Instant::now();
        let r = later
            .bound(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;
        assert_matches!(r, Err(HdhtP2pError::TimedOut));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
