//! Aggregator/reporter.
//!
//! Consumes the finalized observation buffer once the scheduler yields its
//! `RunResult` and prints a per-run summary plus, optionally, an ASCII
//! histogram of service times. Terminal pretty-printing is an external
//! collaborator, not part of the kernel proper.

use crate::coordination::Run;
use crate::observation::Observation;
use crate::percentiles::{percentile, REPORTED_PERCENTILES};

/// Computed once from a finished run's observation buffer.
pub struct Summary {
    pub count: usize,
    pub failed: usize,
    pub non2xx: usize,
    pub total_bytes: u64,
    /// Sum of non-failed service times divided by `count` (not the
    /// non-failed subset) — kept deliberately rather than "corrected", to
    /// match the behavior of the tool this was ported from.
    pub mean_service_time: f64,
    pub mean_wall_time: f64,
    pub requests_per_sec: f64,
    pub transfer_kbytes_per_sec: f64,
    pub percentiles: Vec<(f64, f64)>,
    pub top_servers: String,
    pub wall_time: f64,
}

fn top_servers_label(results: &[Observation]) -> String {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for r in results {
        *counts.entry(r.server_name.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(usize, &str)> = counts.into_iter().map(|(k, v)| (v, k)).collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));

    if ranked.len() > 5 {
        let shown: Vec<String> = ranked[..5].iter().map(|(n, name)| format!("{name} ({n})")).collect();
        format!("{}, +{} other", shown.join(", "), ranked.len() - 5)
    } else {
        ranked
            .iter()
            .map(|(n, name)| format!("{name} ({n})"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builds the summary from a finished run's observations. `total_start_time`
/// and `total_end_time` are the scheduler's `RunResult` fields.
pub fn summarize(results: &[Observation], total_start_time: f64, total_end_time: f64) -> Summary {
    let count = results.len();
    let failed = results.iter().filter(|r| r.is_failure()).count();
    let non2xx = results.iter().filter(|r| r.is_non2xx()).count();
    let total_bytes: u64 = results.iter().filter(|r| !r.is_failure()).map(|r| r.content_length).sum();

    let mut service_times: Vec<f64> = results.iter().filter(|r| !r.is_failure()).map(|r| r.duration_secs()).collect();
    service_times.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let wall_time = total_end_time - total_start_time;
    let total_service_time: f64 = service_times.iter().sum();
    let mean_service_time = if count > 0 { total_service_time / count as f64 } else { 0.0 };
    let mean_wall_time = if count > 0 { wall_time / count as f64 } else { 0.0 };
    let requests_per_sec = if wall_time > 0.0 { count as f64 / wall_time } else { 0.0 };
    let transfer_kbytes_per_sec = if wall_time > 0.0 { total_bytes as f64 / (1000.0 * wall_time) } else { 0.0 };

    let percentiles = REPORTED_PERCENTILES
        .iter()
        .map(|&p| (p, percentile(&service_times, p).unwrap_or(0.0)))
        .collect();

    Summary {
        count,
        failed,
        non2xx,
        total_bytes,
        mean_service_time,
        mean_wall_time,
        requests_per_sec,
        transfer_kbytes_per_sec,
        percentiles,
        top_servers: top_servers_label(results),
        wall_time,
    }
}

pub fn print_summary(summary: &Summary, concurrency_label: &str) {
    println!();
    println!("Server name(s):      {}", summary.top_servers);
    println!();
    println!("Concurrency level:   {concurrency_label}");
    println!("Time taken:          {:.2} seconds", summary.wall_time);
    println!("Completed requests:  {}", summary.count);
    println!("Failed requests:     {}", summary.failed);
    println!("Non-2xx responses:   {}", summary.non2xx);
    println!("Total transferred:   {}", summary.total_bytes);
    println!("Requests per second: {:.2} [#/sec] (mean)", summary.requests_per_sec);
    println!("Time per request:    {:.2} [ms] (mean)", summary.mean_service_time * 1000.0);
    println!(
        "Time per request:    {:.2} [ms] (mean, across all concurrent requests)",
        summary.mean_wall_time * 1000.0
    );
    println!("Transfer rate:       {:.2} [Kbytes/sec] received", summary.transfer_kbytes_per_sec);

    println!();
    println!("Percentage of the requests served within a certain time (ms)");
    for (p, v) in &summary.percentiles {
        let label = match *p {
            x if (x - 0.6667).abs() < 1e-6 => "66%".to_string(),
            x => format!("{:>3.0}%", x * 100.0),
        };
        println!(" {label}  {}", (v * 1000.0) as i64);
    }
}

pub fn print_last_response(run: &Run, output_response: bool) {
    if !output_response {
        return;
    }
    if let Some(err) = run.last_transport_error() {
        println!();
        println!("Last worker exception:");
        println!("{err}");
    }
    if let Some(non2xx) = run.last_non2xx() {
        println!();
        println!("Last non-2xx response:");
        println!("{non2xx}");
    }
}

/// Splits `values` into `min(bins, values.len())` contiguous runs of
/// as-equal-as-possible size (earlier bins absorb the remainder), averaging
/// each run. Matches the original's `nrun = (left-1)//(bins-b) + 1`
/// (equivalent to `ceil(left/(bins-b))`).
fn bucket_averages(values: &[f64], bins: usize) -> Vec<f64> {
    let bins = bins.min(values.len());
    let mut out = Vec::with_capacity(bins);
    let mut left = values.len();
    let mut offset = 0;
    for b in 0..bins {
        let remaining_bins = bins - b;
        let nrun = (left - 1) / remaining_bins + 1;
        let slice = &values[offset..offset + nrun];
        out.push(slice.iter().sum::<f64>() / nrun as f64);
        offset += nrun;
        left -= nrun;
    }
    out
}

/// Renders one ASCII histogram: `height` rows of dots, tallest bucket
/// scaled to `height`, one column per bucket.
pub fn render_ascii_graph(label: &str, values: &[f64], width: usize, height: usize) -> String {
    let mut out = String::new();
    out.push_str(label);
    out.push('\n');
    out.push('\n');

    if values.is_empty() {
        out.push_str("(no data)\n");
        return out;
    }

    let buckets = bucket_averages(values, width);
    let bmax = buckets.iter().cloned().fold(f64::MIN, f64::max);
    let scaled: Vec<usize> = if bmax > 0.0 {
        buckets.iter().map(|&v| (v * height as f64 / bmax) as usize).collect()
    } else {
        vec![0; buckets.len()]
    };

    out.push_str(&format!("time ({:.2} ms)\n", bmax * 1000.0));
    for row in (1..=height).rev() {
        out.push_str(" |");
        for &col in &scaled {
            out.push(if col >= row { '.' } else { ' ' });
        }
        out.push('\n');
    }
    out.push_str(&format!(" +{} request # ({})\n", "-".repeat(scaled.len()), values.len()));
    out
}

pub fn print_graphs(results: &[Observation], width: usize, height: usize) {
    let submission_order: Vec<f64> = results.iter().map(|r| r.duration_secs()).collect();
    let mut by_service_time: Vec<f64> = results.iter().filter(|r| !r.is_failure()).map(|r| r.duration_secs()).collect();
    by_service_time.sort_by(|a, b| a.partial_cmp(b).unwrap());

    println!();
    print!("{}", render_ascii_graph("Response time graph:", &submission_order, width, height));
    println!();
    print!("{}", render_ascii_graph("Response time graph (ordered):", &by_service_time, width, height));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn obs(status: i32, duration: f64, server: &str, bytes: u64) -> Observation {
        Observation {
            start_time: 0.0,
            end_time: duration,
            status_code: status,
            content_length: bytes,
            content_encoding: String::new(),
            response_headers: HashMap::new(),
            server_name: server.into(),
            edge_proxy: false,
            request_url: "http://x/".into(),
            request_port: Some(80),
            request_scheme: "http".into(),
            request_headers: HashMap::new(),
            scheduler_options: serde_json::json!({}),
        }
    }

    #[test]
    fn summarize_counts_failures_and_non2xx() {
        let results = vec![obs(200, 0.1, "a", 10), obs(-1, 0.0, "none/fail", 0), obs(503, 0.2, "a", 5)];
        let s = summarize(&results, 0.0, 1.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.failed, 1);
        assert_eq!(s.non2xx, 1);
        assert_eq!(s.total_bytes, 15);
    }

    #[test]
    fn summarize_percentiles_present_for_every_reported_point() {
        let results: Vec<Observation> = (0..10).map(|i| obs(200, i as f64 * 0.1, "a", 1)).collect();
        let s = summarize(&results, 0.0, 1.0);
        assert_eq!(s.percentiles.len(), REPORTED_PERCENTILES.len());
    }

    #[test]
    fn top_servers_label_lists_at_most_five_plus_other() {
        let results: Vec<Observation> = (0..7).map(|i| obs(200, 0.1, &format!("srv-{i}"), 1)).collect();
        let label = top_servers_label(&results);
        assert!(label.ends_with("+2 other"));
    }

    #[test]
    fn bucket_averages_splits_evenly_when_divisible() {
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let buckets = bucket_averages(&values, 5);
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets[0], 1.5); // mean of [1,2]
        assert_eq!(buckets[4], 9.5); // mean of [9,10]
    }

    #[test]
    fn bucket_averages_never_exceeds_value_count() {
        let values = vec![1.0, 2.0, 3.0];
        let buckets = bucket_averages(&values, 10);
        assert_eq!(buckets.len(), 3);
    }

    #[test]
    fn ascii_graph_scales_tallest_bucket_to_full_height() {
        let values = vec![1.0, 2.0, 10.0, 1.0];
        let rendered = render_ascii_graph("label", &values, 4, 5);
        assert!(rendered.contains("request # (4)"));
    }

    #[test]
    fn ascii_graph_on_empty_values_does_not_panic() {
        let rendered = render_ascii_graph("label", &[], 10, 5);
        assert!(rendered.contains("no data"));
    }
}
