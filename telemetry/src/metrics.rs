use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Port of the Prometheus scrape endpoint.
pub const METRICS_PORT: u16 = 9000;

/// Installs the global metrics recorder and serves it on `[::]:9000/metrics`.
///
/// Every metric carries a `service` label holding `app_name`. Fails when a recorder is already
/// installed.
pub fn init_metrics(app_name: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            METRICS_PORT,
        ))
        .add_global_label("service", app_name)
        .install()?;

    Ok(())
}
