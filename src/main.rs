//! CLI entry point: parses arguments, builds the shared run state, dispatches
//! to the selected scheduler, and prints the final report.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rust_loadtest::config::{Cli, RunConfig, StrategyConfig};
use rust_loadtest::connection_pool::PoolConfig;
use rust_loadtest::coordination::Run;
use rust_loadtest::pool::{StatusEvent, WorkerPool};
use rust_loadtest::results::ResultsBuffer;
use rust_loadtest::scheduler::concurrent::ConcurrentScheduler;
use rust_loadtest::scheduler::linear::LinearIncreaseScheduler;
use rust_loadtest::scheduler::poisson::{PoissonScheduler, UNBOUNDED_CONCURRENCY};
use rust_loadtest::scheduler::sustained::{SustainedPoissonScheduler, MAX_WORKERS};
use rust_loadtest::scheduler::{seed_for, Scheduler, SALT_CONCURRENT, SALT_POISSON};
use rust_loadtest::sink::{SinkConfig, SinkHandle};
use rust_loadtest::worker::RequestConfig;
use rust_loadtest::{client, report, sink, timeout};

fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Pool capacity for the scheduler variant: the Concurrent scheduler's
/// workers hold a slot for their whole lifetime, while every Poisson variant
/// sizes the pool to its slow-start ramp target so the pool never itself
/// becomes the bottleneck ahead of `current_workers`.
fn pool_capacity(strategy: &StrategyConfig) -> usize {
    match strategy {
        StrategyConfig::Concurrent { concurrency, .. } => *concurrency,
        StrategyConfig::Poisson { max_concurrency, .. } | StrategyConfig::LinearIncrease { max_concurrency, .. } => {
            max_concurrency.unwrap_or(UNBOUNDED_CONCURRENCY) as usize
        }
        StrategyConfig::Sustained { .. } => MAX_WORKERS as usize,
    }
}

fn concurrency_label(strategy: &StrategyConfig) -> String {
    match strategy {
        StrategyConfig::Concurrent { concurrency, .. } => concurrency.to_string(),
        StrategyConfig::Poisson { max_concurrency, .. } | StrategyConfig::LinearIncrease { max_concurrency, .. } => {
            max_concurrency.map(|n| n.to_string()).unwrap_or_else(|| "unbounded".to_string())
        }
        StrategyConfig::Sustained { .. } => MAX_WORKERS.to_string(),
    }
}

fn build_scheduler(
    run_config: &RunConfig,
    run: Arc<Run>,
    pool: WorkerPool,
    client: reqwest::Client,
    request_cfg: Arc<RequestConfig>,
    sink: SinkHandle,
    results: ResultsBuffer,
) -> Box<dyn Scheduler> {
    let bodies = Arc::new(run_config.bodies.clone());
    let experiment_id = run_config.experiment_id.clone();

    match &run_config.strategy {
        StrategyConfig::Concurrent { concurrency, delay } => {
            let base_seed = seed_for(0, &run_config.runner_id, SALT_CONCURRENT);
            Box::new(ConcurrentScheduler {
                run,
                pool,
                client,
                request_cfg,
                sink,
                results,
                bodies,
                experiment_id,
                runner_id: run_config.runner_id.clone(),
                base_seed,
                concurrency: *concurrency,
                delay: *delay,
            })
        }
        StrategyConfig::Poisson {
            seed,
            max_throughput,
            max_concurrency,
        } => Box::new(PoissonScheduler {
            run,
            pool,
            client,
            request_cfg,
            sink,
            results,
            bodies,
            experiment_id,
            seed: seed_for(*seed, &run_config.runner_id, SALT_POISSON),
            max_throughput: *max_throughput,
            max_concurrency: *max_concurrency,
        }),
        StrategyConfig::Sustained {
            seed,
            max_throughput,
            max_concurrency,
        } => Box::new(SustainedPoissonScheduler {
            run,
            pool,
            client,
            request_cfg,
            sink,
            results,
            bodies,
            experiment_id,
            seed: seed_for(*seed, &run_config.runner_id, SALT_POISSON),
            max_throughput: *max_throughput,
            max_concurrency: *max_concurrency,
        }),
        StrategyConfig::LinearIncrease {
            seed,
            min_throughput,
            max_throughput,
            max_concurrency,
            t_start,
            t_end,
        } => Box::new(LinearIncreaseScheduler {
            run,
            pool,
            client,
            request_cfg,
            sink,
            results,
            bodies,
            experiment_id,
            seed: seed_for(*seed, &run_config.runner_id, SALT_POISSON),
            min_throughput: *min_throughput,
            max_throughput: *max_throughput,
            max_concurrency: *max_concurrency,
            t_start: *t_start,
            t_end: *t_end,
            termination: run_config.termination,
        }),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let run_config = match RunConfig::try_from(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    info!(runner_id = %run_config.runner_id, experiment_id = %run_config.experiment_id, "starting run");

    let client = match client::build_client(&PoolConfig::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to build HTTP client: {e}");
            return ExitCode::from(2);
        }
    };

    let request_cfg = Arc::new(RequestConfig {
        target_url: run_config.target_url.clone(),
        method: run_config.method.clone(),
        override_host: run_config.override_host.clone(),
        body_type: run_config.body_type.clone(),
        gzip_enabled: run_config.gzip_enabled,
    });

    let run = Arc::new(Run::new(run_config.termination.request_cap()));
    let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel();
    let pool = WorkerPool::new(pool_capacity(&run_config.strategy), status_tx);
    let results = ResultsBuffer::new();

    let (sink_handle, sink_join) = sink::spawn(
        client.clone(),
        SinkConfig {
            elastic_host: run_config.elastic_host.clone(),
            elastic_user: run_config.elastic_user.clone(),
            elastic_password: run_config.elastic_password.clone(),
            experiment_id: run_config.experiment_id.clone(),
        },
    );

    let timeout_handle = timeout::spawn(run.clone(), run_config.termination.duration());

    let ctrl_c_run = run.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping and draining");
            ctrl_c_run.stop.assert();
        }
    });

    let heartbeat_task = tokio::spawn(async move {
        while let Some(StatusEvent::Heartbeat) = status_rx.recv().await {
            print!(".");
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
    });

    let scheduler = build_scheduler(&run_config, run.clone(), pool, client, request_cfg, sink_handle.clone(), results.clone());
    let run_result = scheduler.run().await;

    if let Some(h) = timeout_handle {
        h.abort();
    }
    heartbeat_task.abort();

    sink_handle.stop();
    let sink_outcome = sink_join.await;

    let snapshot = results.snapshot();
    let summary = report::summarize(&snapshot, run_result.total_start_time, run_result.total_end_time);
    report::print_summary(&summary, &concurrency_label(&run_config.strategy));
    if run_config.graph {
        report::print_graphs(&snapshot, run_config.graph_width, run_config.graph_height);
    }
    report::print_last_response(&run, run_config.output_response);

    match sink_outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "sink failed after retries, run's observations may be incomplete");
            ExitCode::FAILURE
        }
        Err(join_err) => {
            error!(error = %join_err, "sink task panicked");
            ExitCode::FAILURE
        }
    }
}
