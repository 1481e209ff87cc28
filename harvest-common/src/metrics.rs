use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder for the process. Panics on failure, which
/// only happens at startup when a recorder was already installed.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    const SECONDS_BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_owned()),
            SECONDS_BUCKETS,
        )
        .expect("failed to configure duration buckets")
        .install_recorder()
        .expect("failed to install metrics recorder")
}
