//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder; safe to call once at startup
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    match HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    }
}

/// Render the current metrics in Prometheus exposition format
pub async fn metrics_handler() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

pub fn record_session_started() {
    metrics::counter!("voice_shopper_sessions_started_total").increment(1);
    metrics::gauge!("voice_shopper_sessions_active").increment(1.0);
}

pub fn record_session_ended() {
    metrics::counter!("voice_shopper_sessions_ended_total").increment(1);
    metrics::gauge!("voice_shopper_sessions_active").decrement(1.0);
}
