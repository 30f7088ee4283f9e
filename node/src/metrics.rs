//! # Prometheus Metrics
//!
//! Exposes operational metrics for the offtake node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use offtake_contracts::{ContractEvent, RegistryEvent, VaultEvent};
use offtake_protocol::error::ErrorKind;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    pub projects_proposed_total: IntCounter,
    pub projects_approved_total: IntCounter,
    pub projects_denied_total: IntCounter,
    pub vaults_deployed_total: IntCounter,
    pub redemptions_activated_total: IntCounter,
    pub swaps_total: IntCounter,
    /// Settlement units paid out by all vaults. Saturates at `u64::MAX`.
    pub settlement_paid_total: IntCounter,
    /// Rejected operations, labelled by error kind.
    pub rejected_operations_total: IntCounterVec,
    /// Number of projects currently held by the registry.
    pub projects: IntGauge,
    /// Histogram of JSON-RPC handling latency in seconds.
    pub rpc_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("offtake".into()), None)?;

        let projects_proposed_total = counter(
            &registry,
            "projects_proposed_total",
            "Total number of project proposals accepted",
        )?;
        let projects_approved_total =
            counter(&registry, "projects_approved_total", "Total number of projects approved")?;
        let projects_denied_total =
            counter(&registry, "projects_denied_total", "Total number of projects denied")?;
        let vaults_deployed_total =
            counter(&registry, "vaults_deployed_total", "Total number of redemption vaults deployed")?;
        let redemptions_activated_total = counter(
            &registry,
            "redemptions_activated_total",
            "Total number of vaults whose redemption rate was fixed",
        )?;
        let swaps_total = counter(&registry, "swaps_total", "Total number of completed redemptions")?;
        let settlement_paid_total = counter(
            &registry,
            "settlement_paid_total",
            "Settlement-asset base units paid out by redemption vaults",
        )?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Operations rejected by the ledger core, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let projects = IntGauge::new("projects", "Number of projects in the registry")?;
        registry.register(Box::new(projects.clone()))?;

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "JSON-RPC call handling latency in seconds")
                .buckets(vec![
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
        )?;
        registry.register(Box::new(rpc_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            projects_proposed_total,
            projects_approved_total,
            projects_denied_total,
            vaults_deployed_total,
            redemptions_activated_total,
            swaps_total,
            settlement_paid_total,
            rejected_operations_total,
            projects,
            rpc_latency_seconds,
        })
    }

    /// Bumps the counters an emitted contract event corresponds to.
    pub fn record_event(&self, event: &ContractEvent) {
        match event {
            ContractEvent::Registry(RegistryEvent::ProjectProposed { .. }) => {
                self.projects_proposed_total.inc()
            }
            ContractEvent::Registry(RegistryEvent::ProjectApproved { .. }) => {
                self.projects_approved_total.inc()
            }
            ContractEvent::Registry(RegistryEvent::ProjectDenied { .. }) => {
                self.projects_denied_total.inc()
            }
            ContractEvent::Registry(RegistryEvent::VaultDeployed { .. }) => {
                self.vaults_deployed_total.inc()
            }
            ContractEvent::Vault { event: VaultEvent::RedemptionActivated { .. }, .. } => {
                self.redemptions_activated_total.inc()
            }
            ContractEvent::Vault { event: VaultEvent::Redeemed { payout, .. }, .. } => {
                self.swaps_total.inc();
                self.settlement_paid_total
                    .inc_by(u64::try_from(*payout).unwrap_or(u64::MAX));
            }
            _ => {}
        }
    }

    /// Counts an operation rejected with `kind`.
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejected_operations_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offtake_contracts::TokenEvent;
    use offtake_protocol::identity::Address;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn events_drive_counters() {
        let m = NodeMetrics::new().unwrap();
        m.record_event(&ContractEvent::Registry(RegistryEvent::ProjectDenied { id: 1 }));
        m.record_event(&ContractEvent::Vault {
            vault: addr("vlt_1"),
            event: VaultEvent::Redeemed {
                holder: addr("alice"),
                token_amount: 10,
                payout: 1_250,
            },
        });
        m.record_event(&ContractEvent::Token {
            token: addr("tok_1"),
            event: TokenEvent::Paused { by: addr("admin") },
        });

        assert_eq!(m.projects_denied_total.get(), 1);
        assert_eq!(m.swaps_total.get(), 1);
        assert_eq!(m.settlement_paid_total.get(), 1_250);
        assert_eq!(m.projects_approved_total.get(), 0);
    }

    #[test]
    fn encode_contains_prefixed_names() {
        let m = NodeMetrics::new().unwrap();
        m.record_rejection(ErrorKind::Authorization);
        let text = m.encode().unwrap();
        assert!(text.contains("offtake_swaps_total"));
        assert!(text.contains("offtake_rejected_operations_total{kind=\"authorization\"} 1"));
    }
}
