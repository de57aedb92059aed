//! Prometheus metrics for the withdrawal pipeline.
//!
//! Without an installed recorder every call is a no-op, so tests and the
//! `step` CLI use [`Metrics`] freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use record::WithdrawalStatus;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Metrics {
    _private: (),
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Register all metric descriptions with the global registry.
    pub fn new() -> Self {
        describe_counter!(
            "withdrawal_step_success_total",
            "Pipeline steps that moved a record forward, by step"
        );
        describe_counter!(
            "withdrawal_step_failure_total",
            "Pipeline steps that failed, by step"
        );
        describe_counter!(
            "withdrawal_signature_rejections_total",
            "Signing prompts the wallet refused, by step"
        );
        describe_histogram!(
            "withdrawal_signed_step_duration_seconds",
            "Time from prompt to confirmed receipt of a signed step"
        );

        describe_counter!(
            "withdrawal_initiated_total",
            "Withdrawals initiated on L2"
        );
        describe_counter!("withdrawal_proven_total", "Withdrawals proven on L1");
        describe_counter!(
            "withdrawal_games_resolved_total",
            "Dispute games resolved by this orchestrator"
        );
        describe_counter!(
            "withdrawal_finalized_total",
            "Withdrawals finalized on L1"
        );
        describe_gauge!("withdrawal_records", "Tracked records by status");

        Self { _private: () }
    }

    pub fn record_step_success(&self, step: &str) {
        counter!("withdrawal_step_success_total", "step" => step.to_string()).increment(1);
    }

    pub fn record_step_failure(&self, step: &str) {
        counter!("withdrawal_step_failure_total", "step" => step.to_string()).increment(1);
    }

    pub fn record_rejection(&self, step: &str) {
        counter!("withdrawal_signature_rejections_total", "step" => step.to_string())
            .increment(1);
    }

    pub fn record_signed_step_duration(&self, step: &str, duration: Duration) {
        histogram!("withdrawal_signed_step_duration_seconds", "step" => step.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_withdrawal_initiated(&self) {
        counter!("withdrawal_initiated_total").increment(1);
    }

    pub fn record_withdrawal_proven(&self) {
        counter!("withdrawal_proven_total").increment(1);
    }

    pub fn record_game_resolved(&self) {
        counter!("withdrawal_games_resolved_total").increment(1);
    }

    pub fn record_withdrawal_finalized(&self) {
        counter!("withdrawal_finalized_total").increment(1);
    }

    /// Number of tracked records in `status`.
    pub fn set_withdrawals(&self, status: WithdrawalStatus, count: usize) {
        gauge!("withdrawal_records", "status" => status.as_str()).set(count as f64);
    }
}

/// Serve `/metrics` on `port`.
pub fn install_prometheus_exporter(port: u16) -> eyre::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| eyre::eyre!("Failed to install Prometheus exporter: {e}"))
}
