//! Fixed-concurrency scheduler.
//!
//! `concurrency` long-running workers are submitted once; each loops issuing
//! requests back-to-back (with an optional think-time pause `delay` between
//! completions) until `stop` or the request cap, holding its pool slot for
//! the worker's whole lifetime rather than per-request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use crate::coordination::Run;
use crate::pool::WorkerPool;
use crate::results::ResultsBuffer;
use crate::scheduler::{pick_body, seed_for, RunResult, Scheduler, SALT_CONCURRENT};
use crate::sink::SinkHandle;
use crate::worker::{self, RequestConfig};

pub struct ConcurrentScheduler {
    pub run: Arc<Run>,
    pub pool: WorkerPool,
    pub client: reqwest::Client,
    pub request_cfg: Arc<RequestConfig>,
    pub sink: SinkHandle,
    pub results: ResultsBuffer,
    pub bodies: Arc<Vec<Vec<u8>>>,
    pub experiment_id: String,
    pub runner_id: String,
    pub base_seed: u64,

    pub concurrency: usize,
    pub delay: Option<Duration>,
}

impl Scheduler for ConcurrentScheduler {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = RunResult> + Send>> {
        Box::pin(async move {
            let total_start_time = crate::observation::now_secs();

            for worker_index in 0..self.concurrency {
                let run = self.run.clone();
                let client = self.client.clone();
                let request_cfg = self.request_cfg.clone();
                let sink = self.sink.clone();
                let results = self.results.clone();
                let bodies = self.bodies.clone();
                let delay = self.delay;
                let concurrency = self.concurrency;
                let seed = seed_for(self.base_seed, &self.runner_id, SALT_CONCURRENT)
                    .wrapping_add(worker_index as u64);

                let _ = self
                    .pool
                    .submit(worker_loop(
                        run, client, request_cfg, sink, results, bodies, delay, concurrency, seed,
                    ))
                    .await;
            }

            self.run.stop.wait_forever().await;
            let total_end_time = crate::observation::now_secs();

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

async fn worker_loop(
    run: Arc<Run>,
    client: reqwest::Client,
    request_cfg: Arc<RequestConfig>,
    sink: SinkHandle,
    results: ResultsBuffer,
    bodies: Arc<Vec<Vec<u8>>>,
    delay: Option<Duration>,
    concurrency: usize,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);

    loop {
        if run.stop.is_set() {
            return;
        }
        if !run.try_submit() {
            return;
        }

        let body = pick_body(&bodies, &mut rng);
        let scheduler_options = json!({
            "type": "concurrent",
            "concurrency": concurrency,
        });

        worker::run_job(
            client.clone(),
            request_cfg.clone(),
            run.clone(),
            sink.clone(),
            results.clone(),
            body,
            scheduler_options,
        )
        .await;

        if let Some(d) = delay {
            run.stop.wait(d).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkConfig;
    use tokio::sync::mpsc;

    fn noop_sink() -> SinkHandle {
        // A handle whose receiver is simply dropped; tests don't assert on
        // sink delivery here (see sink.rs for that), only on submission
        // counting.
        let (handle, _join) = crate::sink::spawn(
            reqwest::Client::new(),
            SinkConfig {
                elastic_host: "http://127.0.0.1:1".into(),
                elastic_user: None,
                elastic_password: None,
                experiment_id: "exp".into(),
            },
        );
        handle
    }

    #[tokio::test]
    async fn respects_request_cap() {
        let run = Arc::new(Run::new(Some(5)));
        let (status_tx, _status_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(2, status_tx);
        let request_cfg = Arc::new(RequestConfig {
            target_url: reqwest::Url::parse("http://127.0.0.1:1/").unwrap(),
            method: reqwest::Method::GET,
            override_host: None,
            body_type: None,
            gzip_enabled: false,
        });

        let scheduler = Box::new(ConcurrentScheduler {
            run: run.clone(),
            pool,
            client: reqwest::Client::new(),
            request_cfg,
            sink: noop_sink(),
            results: ResultsBuffer::new(),
            bodies: Arc::new(vec![]),
            experiment_id: "exp".into(),
            runner_id: "runner".into(),
            base_seed: 1,
            concurrency: 2,
            delay: None,
        });

        let result = scheduler.run().await;
        assert_eq!(run.submitted(), 5);
        assert!(result.total_end_time >= result.total_start_time);
    }
}
