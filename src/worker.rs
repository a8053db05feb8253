//! Per-request execution.
//!
//! One call to [`execute`] is exactly one worker-pool job: it builds the
//! request, issues it through the shared client, and publishes the resulting
//! [`Observation`] to the Sink and the in-memory result buffer before
//! signalling completion on `run`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::coordination::Run;
use crate::errors::{ErrorCategory, LastNon2xx, LastTransportError};
use crate::observation::{now_secs, Observation, STATUS_TRANSPORT_FAILURE};
use crate::results::ResultsBuffer;
use crate::sink::SinkHandle;

/// Static request shape, built once from `RunConfig` and shared by every job.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub target_url: reqwest::Url,
    pub method: reqwest::Method,
    pub override_host: Option<String>,
    pub body_type: Option<String>,
    pub gzip_enabled: bool,
}

fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory encoder cannot fail");
    encoder.finish().expect("finishing an in-memory encoder cannot fail")
}

/// The declared charset for a response, parsed out of its `Content-Type`
/// header (e.g. `text/html; charset=utf-8` -> `"utf-8"`). Empty when the
/// header is absent or carries no `charset` parameter — this mirrors a
/// client's `resp.encoding`, not the raw `Content-Encoding` header.
fn declared_charset(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| ct.split(';').skip(1).find_map(|param| {
            let param = param.trim();
            param.strip_prefix("charset=").map(|v| v.trim_matches('"').to_string())
        }))
        .unwrap_or_default()
}

/// Executes one request and returns its [`Observation`]. `body` is the
/// already-selected body (the scheduler's RNG picks it — the RNG is owned by
/// the scheduler, not the worker); `scheduler_options` is the submission-time
/// snapshot to attach to the Observation. The last transport error / non-2xx
/// response is recorded onto `run` for end-of-run surfacing.
pub async fn execute(
    client: &reqwest::Client,
    cfg: &RequestConfig,
    body: Option<Vec<u8>>,
    scheduler_options: serde_json::Value,
    run: &Run,
) -> Observation {
    let host = cfg
        .override_host
        .clone()
        .unwrap_or_else(|| cfg.target_url.host_str().unwrap_or("").to_string());

    let mut request_headers = HashMap::new();
    request_headers.insert("host".to_string(), host);
    if let Some(body_type) = &cfg.body_type {
        request_headers.insert("content-type".to_string(), body_type.clone());
    }
    if cfg.gzip_enabled {
        request_headers.insert("accept-encoding".to_string(), "gzip".to_string());
    }

    let payload = body.map(|b| {
        if cfg.gzip_enabled {
            request_headers.insert("content-encoding".to_string(), "gzip".to_string());
            gzip_compress(&b)
        } else {
            b
        }
    });

    let request_url = cfg.target_url.to_string();
    let request_port = cfg.target_url.port_or_known_default();
    let request_scheme = cfg.target_url.scheme().to_string();

    let mut builder = client.request(cfg.method.clone(), cfg.target_url.clone());
    for (name, value) in &request_headers {
        builder = builder.header(name, value);
    }
    if let Some(payload) = payload {
        builder = builder.body(payload);
    }

    let start_time = now_secs();
    let outcome = builder.send().await;

    match outcome {
        Ok(response) => {
            let status_code = response.status().as_u16() as i32;
            let response_headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            let server_name = response_headers
                .get("x-k-node-name")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let edge_proxy = response_headers
                .get("x-knative-edge-proxy")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            let content_encoding = declared_charset(response_headers.get("content-type").map(String::as_str));
            let body_bytes = response.bytes().await.unwrap_or_default();
            let content_length = body_bytes.len() as u64;
            let end_time = now_secs();

            if status_code >= 300 {
                let category = ErrorCategory::from_status_code(status_code as u16);
                tracing::debug!(status_code, category = ?category, url = %request_url, "non-2xx response");
                run.record_non2xx(LastNon2xx {
                    status_code: status_code as u16,
                    url: request_url.clone(),
                });
            }

            Observation {
                start_time,
                end_time,
                status_code,
                content_length,
                content_encoding,
                response_headers,
                server_name,
                edge_proxy,
                request_url,
                request_port,
                request_scheme,
                request_headers,
                scheduler_options,
            }
        }
        Err(e) => {
            let end_time = now_secs();
            run.record_transport_error(LastTransportError {
                category: ErrorCategory::from_reqwest_error(&e),
                message: e.to_string(),
            });

            Observation {
                start_time,
                end_time,
                status_code: STATUS_TRANSPORT_FAILURE,
                content_length: 0,
                content_encoding: String::new(),
                response_headers: HashMap::new(),
                server_name: "none/fail".to_string(),
                edge_proxy: false,
                request_url,
                request_port,
                request_scheme,
                request_headers,
                scheduler_options,
            }
        }
    }
}

/// Builds the future submitted to the worker pool: executes the request,
/// publishes the Observation to the Sink and result buffer, and signals
/// `run` that an observation completed.
pub fn run_job(
    client: reqwest::Client,
    cfg: Arc<RequestConfig>,
    run: Arc<Run>,
    sink: SinkHandle,
    results: ResultsBuffer,
    body: Option<Vec<u8>>,
    scheduler_options: serde_json::Value,
) -> impl std::future::Future<Output = ()> {
    async move {
        let observation = execute(&client, &cfg, body, scheduler_options, &run).await;
        sink.add(observation.clone());
        results.push(observation);
        run.record_observation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(gzip: bool) -> RequestConfig {
        RequestConfig {
            target_url: reqwest::Url::parse("http://example.test/path").unwrap(),
            method: reqwest::Method::GET,
            override_host: None,
            body_type: None,
            gzip_enabled: gzip,
        }
    }

    #[tokio::test]
    async fn transport_failure_against_unroutable_host_is_minus_one() {
        let client = reqwest::Client::new();
        let run = Run::new(None);
        let mut c = cfg(false);
        c.target_url = reqwest::Url::parse("http://127.0.0.1:1/").unwrap();
        let obs = execute(&client, &c, None, serde_json::json!({}), &run).await;
        assert!(obs.is_failure());
        assert_eq!(obs.server_name, "none/fail");
        assert_eq!(obs.content_length, 0);
        assert!(run.last_transport_error().is_some());
    }

    #[test]
    fn gzip_compress_round_trips() {
        let data = b"hello world";
        let compressed = gzip_compress(data);
        assert_ne!(compressed, data);
        assert!(compressed.len() > 2);
        // gzip magic bytes
        assert_eq!(&compressed[0..2], &[0x1f, 0x8b]);
    }
}
