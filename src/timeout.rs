//! Timeout daemon.
//!
//! The base Poisson scheduler blocks indefinitely on `stop` after submitting
//! its last job when termination is by count, so this daemon must be
//! registered even for count-terminated runs that have no time budget — it
//! is simply never armed in that case.

use std::sync::Arc;
use std::time::Duration;

use crate::coordination::Run;

/// Spawns the timeout daemon. If `budget` is `Some`, sleeps for it and then
/// asserts `stop`, cancellable by `stop` being asserted first by someone
/// else (request cap, user interrupt). If `budget` is `None` (count
/// termination), returns immediately without spawning anything.
pub fn spawn(run: Arc<Run>, budget: Option<Duration>) -> Option<tokio::task::JoinHandle<()>> {
    let budget = budget?;
    Some(tokio::spawn(async move {
        run.stop.wait(budget).await;
        run.stop.assert();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn asserts_stop_after_budget_elapses() {
        let run = Arc::new(Run::new(None));
        let handle = spawn(run.clone(), Some(Duration::from_millis(20))).unwrap();
        assert!(!run.stop.is_set());
        handle.await.unwrap();
        assert!(run.stop.is_set());
    }

    #[tokio::test]
    async fn no_op_when_termination_is_by_count() {
        let run = Arc::new(Run::new(Some(10)));
        assert!(spawn(run, None).is_none());
    }

    #[tokio::test]
    async fn returns_early_if_stop_already_asserted() {
        let run = Arc::new(Run::new(None));
        run.stop.assert();
        let start = std::time::Instant::now();
        let handle = spawn(run.clone(), Some(Duration::from_secs(30))).unwrap();
        handle.await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
