//! Asynchronous batching, retrying Sink.
//!
//! Runs as its own task, isolated from the scheduler/worker hot path, and
//! communicates only through an unbounded channel — the Sink never shares a
//! mutex with the hot path.

use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::errors::SinkError;
use crate::observation::Observation;

const BATCH_RECORD_LIMIT: usize = 32;
const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const INDEX_NAME: &str = "experiments";

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub elastic_host: String,
    pub elastic_user: Option<String>,
    pub elastic_password: Option<String>,
    pub experiment_id: String,
}

enum SinkMessage {
    Observation(Box<Observation>),
    Flush,
    Stop,
}

/// Cheaply-cloneable handle for producers to hand observations to the Sink.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl SinkHandle {
    pub fn add(&self, o: Observation) {
        let _ = self.tx.send(SinkMessage::Observation(Box::new(o)));
    }

    pub fn flush(&self) {
        let _ = self.tx.send(SinkMessage::Flush);
    }

    pub fn stop(&self) {
        let _ = self.tx.send(SinkMessage::Stop);
    }
}

/// Spawns the Sink task and returns a handle plus its join handle. The task
/// exits (and the join handle resolves to `Err(SinkError)`) if a flush fails
/// after retries — the caller should treat that as fatal.
pub fn spawn(client: reqwest::Client, config: SinkConfig) -> (SinkHandle, tokio::task::JoinHandle<Result<(), SinkError>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SinkHandle { tx };
    let join = tokio::spawn(run(client, config, rx));
    (handle, join)
}

async fn run(
    client: reqwest::Client,
    config: SinkConfig,
    mut rx: mpsc::UnboundedReceiver<SinkMessage>,
) -> Result<(), SinkError> {
    let mut batch: Vec<Value> = Vec::with_capacity(BATCH_RECORD_LIMIT);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => {
                match msg {
                    Some(SinkMessage::Observation(o)) => {
                        push(&mut batch, &o, &config.experiment_id);
                        if batch.len() >= BATCH_RECORD_LIMIT {
                            flush(&client, &config, &mut batch).await?;
                        }
                    }
                    Some(SinkMessage::Flush) => {
                        flush(&client, &config, &mut batch).await?;
                    }
                    Some(SinkMessage::Stop) | None => {
                        flush(&client, &config, &mut batch).await?;
                        return Ok(());
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&client, &config, &mut batch).await?;
            }
        }
    }
}

fn push(batch: &mut Vec<Value>, o: &Observation, experiment_id: &str) {
    let id = uuid::Uuid::new_v4().to_string();
    batch.push(json!({ "index": { "_id": id, "_index": INDEX_NAME } }));
    batch.push(document(o, experiment_id));
}

fn document(o: &Observation, experiment_id: &str) -> Value {
    let timestamp = chrono::DateTime::from_timestamp(
        o.start_time.trunc() as i64,
        (o.start_time.fract() * 1e9) as u32,
    )
    .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    .unwrap_or_default();

    json!({
        "@timestamp": timestamp,
        "experiment": {
            "id": experiment_id,
            "type": "request",
            "worker": o.scheduler_options,
        },
        "server": {
            "name": o.server_name,
            "proxied": o.edge_proxy,
        },
        "response": {
            "status_code": o.status_code,
            "duration": (o.duration_secs() * 1_000_000.0).round() as i64,
            "content_length": o.content_length,
            "headers": o.response_headers,
        },
        "request": {
            "url": o.request_url,
            "port": o.request_port,
            "scheme": o.request_scheme,
            "headers": o.request_headers,
        },
    })
}

async fn flush(client: &reqwest::Client, config: &SinkConfig, batch: &mut Vec<Value>) -> Result<(), SinkError> {
    if batch.is_empty() {
        return Ok(());
    }

    let url = format!("{}/_bulk", config.elastic_host.trim_end_matches('/'));
    let mut body = String::new();
    for line in batch.iter() {
        body.push_str(&line.to_string());
        body.push('\n');
    }

    let mut last_error: Option<SinkError> = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let mut req = client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body.clone());
        if let Some(user) = &config.elastic_user {
            req = req.basic_auth(user, config.elastic_password.as_deref());
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(records = batch.len(), attempt, "flushed batch to sink");
                batch.clear();
                return Ok(());
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body_text = resp.text().await.unwrap_or_default();
                warn!(attempt, status, "bulk write rejected");
                last_error = Some(SinkError::BulkWriteRejected {
                    url: url.clone(),
                    status,
                    body: body_text,
                });
            }
            Err(e) => {
                warn!(attempt, error = %e, "bulk write failed");
                last_error = Some(SinkError::BulkWriteFailed {
                    url: url.clone(),
                    message: e.to_string(),
                });
            }
        }

        if attempt < MAX_ATTEMPTS {
            let backoff_s: f64 = rand::thread_rng().gen_range(0.0..1.0);
            tokio::time::sleep(Duration::from_secs_f64(backoff_s)).await;
        }
    }

    let err = last_error.expect("loop ran at least once");
    error!(error = %err, "sink flush failed after retries, this run's observations would be lost");
    Err(err)
}
