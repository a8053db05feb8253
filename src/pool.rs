//! Bounded worker pool.
//!
//! Capacity is enforced with a `tokio::sync::Semaphore`: `submit` acquires an
//! owned permit and spawns the job holding it, so a job's slot is freed the
//! instant the job's future completes, without any pool-side bookkeeping of
//! "running" tasks beyond a `JoinSet` used only to drain on shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

const INITIAL_CHECKPOINT_S: u64 = 10;
const CHECKPOINT: u64 = 200;

/// Emitted on the status channel for the terminal heartbeat (per-batch
/// progress dots during execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Heartbeat,
}

/// Returned when `submit` is called after `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

struct CheckpointState {
    /// Emit a heartbeat every this many completions.
    checkpoint_s: u64,
    /// Completion count at which `checkpoint_s` escalates ×10 again.
    next_escalation: u64,
}

struct Inner {
    semaphore: Semaphore,
    tasks: Mutex<JoinSet<()>>,
    max_workers: usize,
    completed: AtomicU64,
    checkpoint: std::sync::Mutex<CheckpointState>,
    status_tx: UnboundedSender<StatusEvent>,
}

/// A bounded pool of execution slots. Cheap to clone; clones share the same
/// semaphore and task set.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, status_tx: UnboundedSender<StatusEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(max_workers),
                tasks: Mutex::new(JoinSet::new()),
                max_workers,
                completed: AtomicU64::new(0),
                checkpoint: std::sync::Mutex::new(CheckpointState {
                    checkpoint_s: INITIAL_CHECKPOINT_S,
                    next_escalation: CHECKPOINT,
                }),
                status_tx,
            }),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    pub fn available_permits(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Acquires a slot and spawns `job` to run in it. Blocks the caller (the
    /// scheduler) only until a slot is free, never for the job's duration.
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;

        let inner = self.inner.clone();
        let mut tasks = self.inner.tasks.lock().await;
        tasks.spawn(async move {
            job.await;
            drop(permit);
            inner.record_completion();
        });
        Ok(())
    }

    /// Stops accepting new work. `cancel_pending` is accepted for contract
    /// symmetry with the pool's submit/shutdown contract; this pool never
    /// buffers an internal queue (backpressure is the scheduler's
    /// `ready.wait()`), so there is nothing queued to cancel — running jobs
    /// always finish regardless of the flag.
    pub fn shutdown(&self, _cancel_pending: bool) {
        self.inner.semaphore.close();
    }

    /// Waits for every in-flight job to finish. Call after `shutdown`.
    pub async fn drain(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}

impl Inner {
    fn record_completion(&self) {
        let n = self.completed.fetch_add(1, Ordering::AcqRel) + 1;

        let step = {
            let mut state = self.checkpoint.lock().unwrap();
            if n >= state.next_escalation {
                state.checkpoint_s *= 10;
                state.next_escalation *= 10;
            }
            state.checkpoint_s
        };

        if n % step == 0 {
            let _ = self.status_tx.send(StatusEvent::Heartbeat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn pool(max_workers: usize) -> (WorkerPool, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WorkerPool::new(max_workers, tx), rx)
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let (p, _rx) = pool(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            p.submit(async move {
                let n = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        p.shutdown(false);
        p.drain().await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let (p, _rx) = pool(1);
        p.shutdown(false);
        let err = p.submit(async {}).await.unwrap_err();
        assert_eq!(err, PoolClosed);
    }

    #[tokio::test]
    async fn heartbeat_fires_every_ten_completions() {
        let (p, mut rx) = pool(4);
        for _ in 0..10 {
            p.submit(async {}).await.unwrap();
        }
        p.shutdown(false);
        p.drain().await;
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn drain_waits_for_running_jobs() {
        let (p, _rx) = pool(4);
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        p.submit(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            done2.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        p.shutdown(false);
        p.drain().await;
        assert!(done.load(Ordering::SeqCst));
    }
}
