use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, Gauge};
use tracing::{debug, warn};

use certfetch::output::HostResult;

lazy_static! {
    static ref CERTFETCH_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("certfetch_days_before_expired", "days before expiration").unwrap();
    static ref CERTFETCH_FETCH_SUCCESS: Gauge = register_gauge!(
        "certfetch_fetch_success",
        "1 if the certificate was retrieved, 0 otherwise"
    )
    .unwrap();
}

/// Gauge values for one host: (fetch success, days before expiration).
fn gauge_values(host: &HostResult, now: DateTime<Utc>) -> (f64, f64) {
    match &host.result {
        Ok(report) => (1.0, report.days_until_expiry(now) as f64),
        Err(_) => (0.0, 0.0),
    }
}

/// Function to push metrics to prometheus
/// # Arguments
/// * `results` - fetch outcome per host
/// * `prometheus_address` - push gateway address
pub fn prometheus_metrics(results: &[HostResult], prometheus_address: &str) {
    let now = Utc::now();
    for host in results {
        let (success, days) = gauge_values(host, now);
        CERTFETCH_FETCH_SUCCESS.set(success);
        CERTFETCH_DAYS_BEFORE_EXPIRED.set(days);

        let (issuer, outcome) = match &host.result {
            Ok(report) => (report.issuer_name.clone(), "ok".to_string()),
            Err(err) => ("none".to_string(), err.kind().to_string()),
        };

        let metric_families = prometheus::gather();
        let pushed = prometheus::push_metrics(
            "certfetch",
            labels! {
                "instance".to_owned() => "certfetch".to_owned(),
                "host".to_owned() => host.target.to_string(),
                "issuer".to_owned() => issuer,
                "outcome".to_owned() => outcome,
            },
            prometheus_address,
            metric_families,
            None,
        );

        match pushed {
            Ok(_) => debug!(host = %host.target, "pushed metrics"),
            Err(e) => warn!(host = %host.target, error = %e, "failed to push metrics to prometheus"),
        }
    }
}
