//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose a scrape endpoint. Controlled by the optional `metrics`
//! section of the configuration file:
//!
//! ```json
//! { "metrics": { "enabled": true, "listen_addr": "127.0.0.1", "port": 9100 } }
//! ```

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Should be called at most once per process, before workers start.
pub fn install_metrics_recorder(listen_addr: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{listen_addr}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {e}"))?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    signalpost_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Install the recorder if the loaded configuration enables it.
pub fn install_from_config(root: &Value) -> Result<()> {
    let Some(section) = root.get("metrics") else {
        return Ok(());
    };
    if !section
        .get("enabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Ok(());
    }

    let listen_addr = section
        .get("listen_addr")
        .and_then(Value::as_str)
        .unwrap_or("127.0.0.1");
    let port = section
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(9100);

    install_metrics_recorder(listen_addr, port)
}
