//! CLI surface and `RunConfig`.
//!
//! `Cli` is what clap parses; `TryFrom<Cli>` validates the mutually
//! exclusive groups and produces the immutable `RunConfig` every other
//! module is built from. Validation failures are `ConfigError`s surfaced
//! before any request is sent — fail fast.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::coordination::Termination;
use crate::errors::ConfigError;
use crate::utils::{load_body, Threshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Raw CLI arguments. Mutual exclusivity between the
/// termination flags and between the strategy flags is enforced in
/// `RunConfig::try_from` rather than with clap's `ArgGroup`, since the
/// scheduler-specific option groups (Workers/Poisson/Linear) only make
/// sense once we know which strategy flag was given.
#[derive(Debug, Parser)]
#[command(name = "loadtest", version, about = "HTTP load-generation and measurement engine")]
pub struct Cli {
    /// Target URL.
    pub url: String,

    /// Terminate after this many requests.
    #[arg(short = 'n', long = "count")]
    pub count: Option<u64>,

    /// Terminate after this many seconds.
    #[arg(short = 't', long = "time")]
    pub time: Option<f64>,

    /// Fixed-concurrency scheduler.
    #[arg(long = "with-workers")]
    pub with_workers: bool,

    /// Poisson scheduler, base variant.
    #[arg(long = "with-poisson")]
    pub with_poisson: bool,

    /// Alias for `--with-poisson`, matching the original tool's flag name.
    #[arg(long = "with-poisson-variable")]
    pub with_poisson_variable: bool,

    /// Sustained Poisson, closed-loop controller.
    #[arg(long = "with-poisson-sustained")]
    pub with_poisson_sustained: bool,

    /// Linear-increase Poisson, open-loop rate ramp.
    #[arg(long = "with-poisson-linear-increase")]
    pub with_poisson_linear_increase: bool,

    #[arg(long, value_enum, default_value = "get")]
    pub method: HttpMethod,

    /// Request body: literal bytes, or `@path` to read from a file.
    #[arg(long = "body")]
    pub body: Vec<String>,

    #[arg(long = "body-type")]
    pub body_type: Option<String>,

    /// Overrides the `Host` header; defaults to the target URL's host.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub gzip: bool,

    /// Print an ASCII histogram of service times alongside the summary.
    #[arg(long)]
    pub graph: bool,

    #[arg(long = "graph-width", default_value_t = 80)]
    pub graph_width: usize,

    #[arg(long = "graph-height", default_value_t = 20)]
    pub graph_height: usize,

    /// Print each response body as it's received (debugging aid).
    #[arg(long = "output-response")]
    pub output_response: bool,

    #[arg(long = "experiment-id")]
    pub experiment_id: Option<String>,

    #[arg(long = "runner-id")]
    pub runner_id: Option<String>,

    // -- Workers group --
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<usize>,

    #[arg(short = 'd', long = "delay")]
    pub delay: Option<f64>,

    // -- Poisson group --
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    #[arg(long = "max-throughput")]
    pub max_throughput: Option<f64>,

    /// `-1` means unbounded.
    #[arg(long = "max-concurrency", allow_negative_numbers = true)]
    pub max_concurrency: Option<i64>,

    // -- Linear-increase group --
    #[arg(long = "min-throughput")]
    pub min_throughput: Option<f64>,

    #[arg(long = "t-start")]
    pub t_start: Option<String>,

    #[arg(long = "t-end")]
    pub t_end: Option<String>,

    // -- Sink --
    #[arg(long = "elastic-host")]
    pub elastic_host: String,

    #[arg(long = "elastic-user")]
    pub elastic_user: Option<String>,

    #[arg(long = "elastic-password")]
    pub elastic_password: Option<String>,
}

/// The scheduler-specific parameters for whichever strategy flag was given;
/// `RunConfig` carries exactly one variant (the CLI's mutual exclusivity,
/// resolved).
#[derive(Debug, Clone)]
pub enum StrategyConfig {
    Concurrent {
        concurrency: usize,
        delay: Option<Duration>,
    },
    Poisson {
        seed: u64,
        max_throughput: f64,
        max_concurrency: Option<u64>,
    },
    Sustained {
        seed: u64,
        max_throughput: f64,
        max_concurrency: Option<u64>,
    },
    LinearIncrease {
        seed: u64,
        min_throughput: f64,
        max_throughput: f64,
        max_concurrency: Option<u64>,
        t_start: Threshold,
        t_end: Threshold,
    },
}

/// Immutable per-run configuration, resolved from `Cli`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub runner_id: String,
    pub experiment_id: String,

    pub target_url: reqwest::Url,
    pub method: reqwest::Method,
    pub override_host: Option<String>,

    pub bodies: Vec<Vec<u8>>,
    pub body_type: Option<String>,
    pub gzip_enabled: bool,

    pub termination: Termination,
    pub strategy: StrategyConfig,

    pub elastic_host: String,
    pub elastic_user: Option<String>,
    pub elastic_password: Option<String>,

    pub graph: bool,
    pub graph_width: usize,
    pub graph_height: usize,
    pub output_response: bool,
}

fn parse_max_concurrency(raw: Option<i64>) -> Result<Option<u64>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(-1) => Ok(None),
        Some(n) if n > 0 => Ok(Some(n as u64)),
        Some(n) => Err(ConfigError::InvalidValue {
            field: "max-concurrency".into(),
            message: format!("expected a positive integer or -1 for unbounded, got {n}"),
        }),
    }
}

impl TryFrom<Cli> for RunConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, ConfigError> {
        let termination = match (cli.count, cli.time) {
            (Some(n), None) => Termination::ByCount(n),
            (None, Some(t)) => Termination::ByTime(Duration::from_secs_f64(t)),
            (Some(_), Some(_)) => {
                return Err(ConfigError::MutuallyExclusive {
                    flag_a: "-n/--count".into(),
                    flag_b: "-t/--time".into(),
                })
            }
            (None, None) => {
                return Err(ConfigError::MissingOneOf {
                    group: "termination".into(),
                    options: "-n/--count, -t/--time".into(),
                })
            }
        };

        let strategy_flags = [
            cli.with_workers,
            cli.with_poisson,
            cli.with_poisson_variable,
            cli.with_poisson_sustained,
            cli.with_poisson_linear_increase,
        ];
        if strategy_flags.iter().filter(|&&b| b).count() != 1 {
            return Err(ConfigError::MissingOneOf {
                group: "strategy".into(),
                options: "--with-workers, --with-poisson, --with-poisson-variable, \
                          --with-poisson-sustained, --with-poisson-linear-increase"
                    .into(),
            });
        }

        let runner_id = cli
            .runner_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let experiment_id = cli
            .experiment_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let seed = cli.seed.unwrap_or_else(|| {
            // No deterministic seed given: fall back to a fresh one rather
            // than a fixed constant, so unseeded runs don't silently share
            // an RNG stream across invocations.
            uuid::Uuid::new_v4().as_u128() as u64
        });
        let max_concurrency = parse_max_concurrency(cli.max_concurrency)?;

        let strategy = if cli.with_workers {
            StrategyConfig::Concurrent {
                concurrency: cli.concurrency.ok_or_else(|| ConfigError::MissingArg("-c/--concurrency".into()))?,
                delay: cli.delay.map(Duration::from_secs_f64),
            }
        } else if cli.with_poisson || cli.with_poisson_variable {
            StrategyConfig::Poisson {
                seed,
                max_throughput: cli
                    .max_throughput
                    .ok_or_else(|| ConfigError::MissingArg("--max-throughput".into()))?,
                max_concurrency,
            }
        } else if cli.with_poisson_sustained {
            StrategyConfig::Sustained {
                seed,
                max_throughput: cli
                    .max_throughput
                    .ok_or_else(|| ConfigError::MissingArg("--max-throughput".into()))?,
                max_concurrency,
            }
        } else {
            let budget_unit = match termination {
                Termination::ByCount(_) => "t-start/t-end",
                Termination::ByTime(_) => "t-start/t-end",
            };
            StrategyConfig::LinearIncrease {
                seed,
                min_throughput: cli
                    .min_throughput
                    .ok_or_else(|| ConfigError::MissingArg("--min-throughput".into()))?,
                max_throughput: cli
                    .max_throughput
                    .ok_or_else(|| ConfigError::MissingArg("--max-throughput".into()))?,
                max_concurrency,
                t_start: Threshold::parse(
                    budget_unit,
                    cli.t_start.as_deref().ok_or_else(|| ConfigError::MissingArg("--t-start".into()))?,
                )?,
                t_end: Threshold::parse(
                    budget_unit,
                    cli.t_end.as_deref().ok_or_else(|| ConfigError::MissingArg("--t-end".into()))?,
                )?,
            }
        };

        let target_url = reqwest::Url::parse(&cli.url).map_err(|e| ConfigError::InvalidValue {
            field: "url".into(),
            message: e.to_string(),
        })?;

        let bodies = cli
            .body
            .iter()
            .map(|raw| load_body(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RunConfig {
            runner_id,
            experiment_id,
            target_url,
            method: cli.method.as_reqwest(),
            override_host: cli.host,
            bodies,
            body_type: cli.body_type,
            gzip_enabled: cli.gzip,
            termination,
            strategy,
            elastic_host: cli.elastic_host,
            elastic_user: cli.elastic_user,
            elastic_password: cli.elastic_password,
            graph: cli.graph,
            graph_width: cli.graph_width,
            graph_height: cli.graph_height,
            output_response: cli.output_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(extra: &[&str]) -> Vec<String> {
        let mut args = vec!["loadtest".to_string(), "http://example.test/".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    fn parse(extra: &[&str]) -> Result<RunConfig, ConfigError> {
        let cli = Cli::parse_from(base_args(extra));
        RunConfig::try_from(cli)
    }

    #[test]
    fn requires_exactly_one_termination_flag() {
        let err = parse(&["--with-workers", "-c", "4", "--elastic-host", "http://x"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOneOf { .. }));
    }

    #[test]
    fn rejects_both_termination_flags() {
        let err = parse(&[
            "-n", "10", "-t", "5", "--with-workers", "-c", "4", "--elastic-host", "http://x",
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MutuallyExclusive { .. }));
    }

    #[test]
    fn requires_exactly_one_strategy_flag() {
        let err = parse(&["-n", "10", "--elastic-host", "http://x"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOneOf { .. }));
    }

    #[test]
    fn rejects_two_strategy_flags() {
        let err = parse(&[
            "-n",
            "10",
            "--with-workers",
            "--with-poisson",
            "-c",
            "4",
            "--max-throughput",
            "10",
            "--elastic-host",
            "http://x",
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingOneOf { .. }));
    }

    #[test]
    fn concurrent_strategy_requires_concurrency() {
        let err = parse(&["-n", "10", "--with-workers", "--elastic-host", "http://x"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingArg(_)));
    }

    #[test]
    fn builds_valid_concurrent_config() {
        let cfg = parse(&["-n", "100", "--with-workers", "-c", "4", "--elastic-host", "http://x"]).unwrap();
        assert!(matches!(cfg.termination, Termination::ByCount(100)));
        assert!(matches!(cfg.strategy, StrategyConfig::Concurrent { concurrency: 4, .. }));
    }

    #[test]
    fn max_concurrency_minus_one_is_unbounded() {
        assert_eq!(parse_max_concurrency(Some(-1)).unwrap(), None);
        assert_eq!(parse_max_concurrency(Some(16)).unwrap(), Some(16));
        assert!(parse_max_concurrency(Some(-5)).is_err());
    }

    #[test]
    fn builds_valid_linear_increase_config() {
        let cfg = parse(&[
            "-t",
            "100",
            "--with-poisson-linear-increase",
            "--min-throughput",
            "10",
            "--max-throughput",
            "110",
            "--t-start",
            "10%",
            "--t-end",
            "90%",
            "--elastic-host",
            "http://x",
        ])
        .unwrap();
        assert!(matches!(cfg.strategy, StrategyConfig::LinearIncrease { .. }));
    }

    #[test]
    fn runner_id_and_experiment_id_default_when_absent() {
        let cfg = parse(&["-n", "1", "--with-workers", "-c", "1", "--elastic-host", "http://x"]).unwrap();
        assert!(!cfg.runner_id.is_empty());
        assert!(!cfg.experiment_id.is_empty());
    }
}
