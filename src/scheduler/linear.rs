//! Linear-increase Poisson: open-loop rate ramp.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::coordination::{Run, Termination};
use crate::pool::WorkerPool;
use crate::results::ResultsBuffer;
use crate::scheduler::poisson::{poisson_loop, slow_start, PoissonCore};
use crate::scheduler::{RunResult, Scheduler};
use crate::sink::SinkHandle;
use crate::utils::Threshold;
use crate::worker::RequestConfig;

pub struct LinearIncreaseScheduler {
    pub run: Arc<Run>,
    pub pool: WorkerPool,
    pub client: reqwest::Client,
    pub request_cfg: Arc<RequestConfig>,
    pub sink: SinkHandle,
    pub results: ResultsBuffer,
    pub bodies: Arc<Vec<Vec<u8>>>,
    pub experiment_id: String,
    pub seed: u64,

    pub min_throughput: f64,
    pub max_throughput: f64,
    pub max_concurrency: Option<u64>,
    pub t_start: Threshold,
    pub t_end: Threshold,
    pub termination: Termination,
}

impl Scheduler for LinearIncreaseScheduler {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = RunResult> + Send>> {
        Box::pin(async move {
            let core = Arc::new(PoissonCore::new(self.min_throughput, self.max_concurrency));
            let budget = self.termination.budget();
            let t_start = self.t_start.resolve(budget);
            let t_end = self.t_end.resolve(budget);
            let total_start_time = crate::observation::now_secs();

            let slow_start_handle = tokio::spawn(slow_start(self.run.clone(), core.clone()));
            let ramp_handle = tokio::spawn(linear_increase(
                self.run.clone(),
                core.clone(),
                self.termination,
                total_start_time,
                t_start,
                t_end,
                self.min_throughput,
                self.max_throughput,
            ));

            poisson_loop(
                self.run.clone(),
                self.pool.clone(),
                self.client,
                self.request_cfg,
                self.sink,
                self.results,
                self.bodies,
                core,
                "poisson_linear_increase",
                StdRng::seed_from_u64(self.seed),
            )
            .await;

            self.run.stop.wait_forever().await;
            let total_end_time = crate::observation::now_secs();

            let _ = slow_start_handle.await;
            let _ = ramp_handle.await;
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

/// 1 Hz controller that moves `mean_req_time` along the ramp from
/// `min_throughput` at `t_start` to `max_throughput` at `t_end`. Exits once
/// `x >= t_end` — the rate is fixed at `max_throughput` from then on, so
/// there's nothing further for this daemon to do.
async fn linear_increase(
    run: Arc<Run>,
    core: Arc<PoissonCore>,
    termination: Termination,
    total_start_time: f64,
    t_start: f64,
    t_end: f64,
    min_throughput: f64,
    max_throughput: f64,
) {
    loop {
        run.stop.wait(Duration::from_secs(1)).await;
        if run.stop.is_set() {
            return;
        }

        let x = match termination {
            Termination::ByTime(_) => crate::observation::now_secs() - total_start_time,
            Termination::ByCount(_) => run.submitted() as f64,
        };

        if x < t_start {
            core.set_mean_req_time_us(1e6 / min_throughput);
        } else if x >= t_end {
            core.set_mean_req_time_us(1e6 / max_throughput);
            return;
        } else {
            let throughput = min_throughput + (max_throughput - min_throughput) * (x - t_start) / (t_end - t_start);
            core.set_mean_req_time_us(1e6 / throughput);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn holds_min_throughput_before_t_start() {
        let run = Arc::new(Run::new(None));
        let core = Arc::new(PoissonCore::new(10.0, None));
        tokio::time::pause();
        let handle = tokio::spawn(linear_increase(
            run.clone(),
            core.clone(),
            Termination::ByTime(Duration::from_secs(100)),
            crate::observation::now_secs(),
            10.0,
            90.0,
            10.0,
            110.0,
        ));
        tokio::time::advance(Duration::from_millis(1500)).await;
        run.stop.assert();
        handle.await.unwrap();
        assert!((core.mean_req_time_us() - 1e6 / 10.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn interpolates_midpoint_by_count() {
        let run = Arc::new(Run::new(None));
        for _ in 0..50 {
            run.record_submission();
        }
        let core = Arc::new(PoissonCore::new(10.0, None));
        tokio::time::pause();
        let handle = tokio::spawn(linear_increase(
            run.clone(),
            core.clone(),
            Termination::ByCount(100),
            crate::observation::now_secs(),
            10.0,
            90.0,
            10.0,
            110.0,
        ));
        tokio::time::advance(Duration::from_millis(1500)).await;
        run.stop.assert();
        handle.await.unwrap();
        // x=50 is the midpoint of [10, 90] -> throughput = 60 req/s
        assert!((core.mean_req_time_us() - 1e6 / 60.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn exits_and_holds_max_after_t_end() {
        let run = Arc::new(Run::new(None));
        let core = Arc::new(PoissonCore::new(10.0, None));
        tokio::time::pause();
        let handle = tokio::spawn(linear_increase(
            run.clone(),
            core.clone(),
            Termination::ByTime(Duration::from_secs(100)),
            crate::observation::now_secs() - 95.0,
            10.0,
            90.0,
            10.0,
            110.0,
        ));
        tokio::time::advance(Duration::from_millis(1500)).await;
        handle.await.unwrap();
        assert!((core.mean_req_time_us() - 1e6 / 110.0).abs() < 1.0);
    }
}
