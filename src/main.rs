use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use certfetch::config::{Config, ConfigError, PrometheusConfig, DEFAULT_CONFIG_FILE};
use certfetch::output::{self, HostResult};
use certfetch::target::Target;
use certfetch::{CertificateFetcher, DEFAULT_PORT};

mod metrics;

/// Fetch and inspect the leaf TLS certificate of remote hosts.
///
/// Any certificate is accepted unless --verify is given: expired,
/// self-signed and mismatched certificates are reported, not rejected.
#[derive(Parser, Debug)]
#[command(name = "certfetch", version, author)]
struct Cli {
    /// Hosts to inspect: host, host:port or https://host:port
    hosts: Vec<String>,

    /// Port for hosts given without one [default: 443]
    #[arg(short, long)]
    port: Option<u16>,

    /// TCP connect timeout in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    connect_timeout: Option<u64>,

    /// TLS handshake timeout in milliseconds [default: 5000]
    #[arg(long, value_name = "MS")]
    handshake_timeout: Option<u64>,

    /// Verify the peer certificate and hostname instead of accepting any certificate
    #[arg(long)]
    verify: bool,

    /// Output format: text, json, table [default: text]
    #[arg(short, long)]
    output: Option<String>,

    /// Exit code to use when a certificate is expired [default: 0]
    #[arg(long)]
    exit_code: Option<i32>,

    /// Push metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address [default: http://localhost:9091]
    #[arg(long, value_name = "URL")]
    prometheus_address: Option<String>,

    /// Configuration file [default: ./certfetch.toml when present]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Log each connection step
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Only flags that were actually given are set, so merging keeps
    /// file and default values for the rest.
    fn to_config(&self) -> Config {
        Config {
            hosts: if self.hosts.is_empty() {
                None
            } else {
                Some(self.hosts.clone())
            },
            port: self.port,
            connect_timeout_ms: self.connect_timeout,
            handshake_timeout_ms: self.handshake_timeout,
            insecure_skip_verify: if self.verify { Some(false) } else { None },
            output: self.output.clone(),
            exit_code: self.exit_code,
            prometheus: Some(PrometheusConfig {
                enabled: if self.prometheus { Some(true) } else { None },
                address: self.prometheus_address.clone(),
            }),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let file_config = match &cli.config {
        Some(path) => Some(Config::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Some(Config::from_file(DEFAULT_CONFIG_FILE)?)
        }
        None => None,
    };

    let mut config = Config::default();
    if let Some(file_config) = file_config {
        config = config.merge_with(file_config);
    }
    Ok(config.merge_with(cli.to_config()))
}

fn check_host(fetcher: &CertificateFetcher, input: &str, default_port: u16) -> HostResult {
    match Target::parse(input, default_port) {
        Ok(target) => {
            let result = fetcher.fetch(&target.host, target.port);
            if let Err(e) = &result {
                warn!(host = %target, error = %e, "failed to fetch certificate");
            }
            HostResult::new(target, result)
        }
        Err(e) => {
            warn!(host = input, error = %e, "invalid host");
            let target = Target {
                host: input.to_string(),
                port: default_port,
            };
            HostResult::new(target, Err(e))
        }
    }
}

/// 1 when any host failed, `expired_exit_code` when a certificate is expired.
fn exit_status(results: &[HostResult], expired_exit_code: i32, now: DateTime<Utc>) -> i32 {
    if results.iter().any(|host| host.result.is_err()) {
        return 1;
    }
    let expired = results
        .iter()
        .any(|host| matches!(&host.result, Ok(report) if report.is_expired_at(now)));
    if expired {
        expired_exit_code
    } else {
        0
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };
    let (options, format) = match config
        .fetch_options()
        .and_then(|options| config.output_format().map(|format| (options, format)))
    {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let hosts = config.hosts.clone().unwrap_or_default();
    if hosts.is_empty() {
        eprintln!(
            "No hosts to check. Pass them as arguments or list them in {}",
            DEFAULT_CONFIG_FILE
        );
        exit(1);
    }

    let default_port = config.port.unwrap_or(DEFAULT_PORT);
    let fetcher = CertificateFetcher::new(options);
    let results: Vec<HostResult> = hosts
        .iter()
        .map(|input| check_host(&fetcher, input, default_port))
        .collect();

    println!("{}", output::render(&results, format));

    if let Some(address) = config.prometheus_address() {
        metrics::prom::prometheus_metrics(&results, address);
    }

    exit(exit_status(
        &results,
        config.exit_code.unwrap_or(0),
        Utc::now(),
    ));
}
