//! Poisson scheduler, base variant, plus the shared `PoissonCore`/submission
//! loop reused by the sustained and linear-increase variants.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde_json::json;

use crate::coordination::Run;
use crate::pool::WorkerPool;
use crate::results::ResultsBuffer;
use crate::scheduler::{pick_body, RunResult, Scheduler};
use crate::sink::SinkHandle;
use crate::worker::{self, RequestConfig};

/// `max_concurrency` above which the slow-start ramp target is treated as
/// effectively unbounded (optional `max_concurrency K`, else `2^20`).
pub const UNBOUNDED_CONCURRENCY: u64 = 1 << 20;

/// State shared between a Poisson scheduler's submission loop and its
/// controller daemon(s) — optional controller daemons parameterized by
/// shared state, instead of subclassing.
pub struct PoissonCore {
    pub mean_req_time_us: Mutex<f64>,
    /// Current slow-start ramp value; the pool's actual capacity is fixed at
    /// construction, this is the submission-side concurrency budget.
    pub current_workers: AtomicU64,
    /// Ramp target: `max_concurrency` if bounded, else `UNBOUNDED_CONCURRENCY`.
    pub target_workers: u64,
    /// Raw CLI value (`None` when given as `-1`); used by the sustained
    /// controller's overload check, which is independent of the ramp target.
    pub max_concurrency: Option<u64>,
}

impl PoissonCore {
    pub fn new(max_throughput: f64, max_concurrency: Option<u64>) -> Self {
        Self::with_fixed_target(max_throughput, max_concurrency, max_concurrency.unwrap_or(UNBOUNDED_CONCURRENCY))
    }

    /// Like `new`, but the slow-start ramp target is `target` rather than
    /// derived from `max_concurrency` — used by the sustained variant, which
    /// fixes `max_workers = 128` independent of the CLI's `--max-concurrency`,
    /// which that variant repurposes for its overload check instead.
    pub fn with_fixed_target(max_throughput: f64, max_concurrency: Option<u64>, target: u64) -> Self {
        Self {
            mean_req_time_us: Mutex::new(1e6 / max_throughput),
            current_workers: AtomicU64::new(1),
            target_workers: target,
            max_concurrency,
        }
    }

    pub fn mean_req_time_us(&self) -> f64 {
        *self.mean_req_time_us.lock().unwrap()
    }

    pub fn set_mean_req_time_us(&self, v: f64) {
        *self.mean_req_time_us.lock().unwrap() = v;
    }

    pub fn scale_mean_req_time(&self, factor: f64) {
        let mut guard = self.mean_req_time_us.lock().unwrap();
        *guard *= factor;
    }
}

/// Slow-start daemon: ramps `current_workers` from 1 to `target_workers`,
/// one per second, stopping early if `stop` is asserted.
pub async fn slow_start(run: Arc<Run>, core: Arc<PoissonCore>) {
    loop {
        run.stop.wait(Duration::from_secs(1)).await;
        if run.stop.is_set() {
            return;
        }
        let current = core.current_workers.load(Ordering::Acquire);
        if current >= core.target_workers {
            return;
        }
        core.current_workers.fetch_add(1, Ordering::AcqRel);
    }
}

/// Samples the next inter-arrival delay (microseconds) from a Poisson
/// distribution with the core's current mean.
fn sample_delay_us(core: &PoissonCore, rng: &mut StdRng) -> f64 {
    let mean = core.mean_req_time_us().max(1.0);
    Poisson::new(mean)
        .map(|dist| dist.sample(rng))
        .unwrap_or(mean)
}

/// The submission loop shared by every Poisson-family scheduler. Runs until
/// `stop` or the request cap, then returns (it does not itself wait for the
/// pool to drain — callers do that after spawning their daemons).
pub async fn poisson_loop(
    run: Arc<Run>,
    pool: WorkerPool,
    client: reqwest::Client,
    request_cfg: Arc<RequestConfig>,
    sink: SinkHandle,
    results: ResultsBuffer,
    bodies: Arc<Vec<Vec<u8>>>,
    core: Arc<PoissonCore>,
    variant: &'static str,
    mut rng: StdRng,
) {
    loop {
        if run.stop.is_set() || run.at_request_cap() {
            return;
        }

        let in_flight = run.in_flight();
        let current_workers = core.current_workers.load(Ordering::Acquire);

        if in_flight >= current_workers {
            run.ready.clear();
            run.ready.wait().await;
            continue;
        }

        let mean = core.mean_req_time_us();
        let scheduler_options = json!({
            "type": variant,
            "in_flight": in_flight,
            "mean_req_time": mean,
            "workqueue_depth": 0,
            "total_workers": current_workers,
            "idle_workers": current_workers.saturating_sub(in_flight),
        });

        let delay_us = sample_delay_us(&core, &mut rng);
        run.stop.wait(Duration::from_micros(delay_us.max(0.0) as u64)).await;
        if run.stop.is_set() {
            return;
        }

        if !run.try_submit() {
            return;
        }

        let body = pick_body(&bodies, &mut rng);
        let job = worker::run_job(
            client.clone(),
            request_cfg.clone(),
            run.clone(),
            sink.clone(),
            results.clone(),
            body,
            scheduler_options,
        );
        if pool.submit(job).await.is_err() {
            return;
        }
    }
}

pub struct PoissonScheduler {
    pub run: Arc<Run>,
    pub pool: WorkerPool,
    pub client: reqwest::Client,
    pub request_cfg: Arc<RequestConfig>,
    pub sink: SinkHandle,
    pub results: ResultsBuffer,
    pub bodies: Arc<Vec<Vec<u8>>>,
    pub experiment_id: String,
    pub seed: u64,

    pub max_throughput: f64,
    pub max_concurrency: Option<u64>,
}

impl Scheduler for PoissonScheduler {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = RunResult> + Send>> {
        Box::pin(async move {
            let core = Arc::new(PoissonCore::new(self.max_throughput, self.max_concurrency));
            let total_start_time = crate::observation::now_secs();

            let slow_start_handle = tokio::spawn(slow_start(self.run.clone(), core.clone()));

            poisson_loop(
                self.run.clone(),
                self.pool.clone(),
                self.client,
                self.request_cfg,
                self.sink,
                self.results,
                self.bodies,
                core,
                "poisson_default",
                StdRng::seed_from_u64(self.seed),
            )
            .await;

            // Termination by count: the loop above stops submitting once the
            // cap is claimed, but `stop` isn't asserted until the worker
            // completing the capping request observes it — wait for that so
            // `total_end_time` reflects real completion.
            self.run.stop.wait_forever().await;
            let total_end_time = crate::observation::now_secs();

            let _ = slow_start_handle.await;
            self.pool.shutdown(true);
            self.pool.drain().await;

            RunResult {
                experiment_id: self.experiment_id,
                total_start_time,
                total_end_time,
            }
        })
    }
}
