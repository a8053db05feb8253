//! The observation record captured for every request attempt.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch.
///
/// Observations need both duration arithmetic (`end_time - start_time`) and a
/// faithful `@timestamp` for the Sink's wire protocol, so the clock source is
/// wall-clock (`SystemTime`) rather than an opaque monotonic `Instant`.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs_f64()
}

/// Sentinel status code for a transport-level failure.
pub const STATUS_TRANSPORT_FAILURE: i32 = -1;

/// One captured request attempt. Invariant: every submitted request
/// produces exactly one Observation.
#[derive(Debug, Clone)]
pub struct Observation {
    pub start_time: f64,
    pub end_time: f64,

    /// `-1` means transport-level failure.
    pub status_code: i32,
    pub content_length: u64,
    /// The response's declared charset, parsed from `Content-Type`; empty
    /// when absent. Not the raw `Content-Encoding` transport header.
    pub content_encoding: String,
    pub response_headers: HashMap<String, String>,

    /// From the `x-k-node-name` response header, or `"unknown"`; `"none/fail"`
    /// on transport failure.
    pub server_name: String,
    /// From `x-knative-edge-proxy: true`.
    pub edge_proxy: bool,

    pub request_url: String,
    pub request_port: Option<u16>,
    pub request_scheme: String,
    pub request_headers: HashMap<String, String>,

    /// Snapshot of scheduler state at submission time.
    pub scheduler_options: serde_json::Value,
}

impl Observation {
    pub fn is_failure(&self) -> bool {
        self.status_code == STATUS_TRANSPORT_FAILURE
    }

    pub fn is_non2xx(&self) -> bool {
        self.status_code >= 300
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: i32) -> Observation {
        Observation {
            start_time: 1.0,
            end_time: 1.25,
            status_code: status,
            content_length: 0,
            content_encoding: String::new(),
            response_headers: HashMap::new(),
            server_name: "unknown".into(),
            edge_proxy: false,
            request_url: "http://x/".into(),
            request_port: Some(80),
            request_scheme: "http".into(),
            request_headers: HashMap::new(),
            scheduler_options: serde_json::json!({}),
        }
    }

    #[test]
    fn duration_is_end_minus_start() {
        let o = sample(200);
        assert!((o.duration_secs() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn failure_flag_matches_sentinel() {
        assert!(sample(STATUS_TRANSPORT_FAILURE).is_failure());
        assert!(!sample(200).is_failure());
    }

    #[test]
    fn non2xx_flag() {
        assert!(sample(503).is_non2xx());
        assert!(sample(301).is_non2xx());
        assert!(!sample(200).is_non2xx());
    }

    #[test]
    fn now_secs_is_plausibly_recent() {
        let t = now_secs();
        assert!(t > 1_700_000_000.0);
    }
}
