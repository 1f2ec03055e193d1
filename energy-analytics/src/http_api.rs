//! Optional read-only HTTP surface over a finished run, plus the Prometheus
//! scrape endpoint.

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use energy_domain::domain::{AnalyticsOutput, Building};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder. Later calls are no-ops.
pub fn install_recorder() -> anyhow::Result<()> {
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))?;
    // Ignore error if the handle was already set by a concurrent caller.
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Health {
    pub status: &'static str,
    pub buildings: usize,
    pub model: bool,
    pub degraded: bool,
}

type SharedOutput = Arc<AnalyticsOutput>;

pub fn router(output: SharedOutput) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/buildings", get(buildings))
        .route("/analytics", get(analytics))
        .route("/metrics", get(metrics_handler))
        .with_state(output)
}

async fn health(State(output): State<SharedOutput>) -> Json<Health> {
    Json(Health {
        status: "ok",
        buildings: output.buildings.len(),
        model: output.weather_model.is_some(),
        degraded: output.source.degraded,
    })
}

async fn buildings(State(output): State<SharedOutput>) -> Json<Vec<Building>> {
    Json(output.buildings.clone())
}

async fn analytics(State(output): State<SharedOutput>) -> Json<AnalyticsOutput> {
    Json(output.as_ref().clone())
}

async fn metrics_handler() -> Result<String, StatusCode> {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}

/// Serve the finished output until Ctrl-C.
pub async fn serve(bind_addr: &str, output: AnalyticsOutput) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.bind_addr '{bind_addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving analytics");

    axum::serve(listener, router(Arc::new(output)).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_domain::domain::{BuildingType, CampusKpis, SourceProvenance, SourceRole};

    fn output() -> SharedOutput {
        Arc::new(AnalyticsOutput {
            source: SourceProvenance {
                role: SourceRole::Fallback,
                name: "meter_premerge".into(),
                path: "p.dat".into(),
                format: "dat".into(),
                degraded: true,
                rows: 1,
                electricity_rows: 1,
                rows_without_timestamp: 0,
                fingerprint: String::new(),
            },
            buildings: vec![Building {
                id: "12".into(),
                name: "Thompson Library".into(),
                code: Some("12".into()),
                area: 1000.0,
                building_type: BuildingType::Academic,
            }],
            hourly: Vec::new(),
            daily: Vec::new(),
            consumption: Vec::new(),
            building_months: Vec::new(),
            utility_months: Vec::new(),
            mom_changes: Vec::new(),
            forecasts: Vec::new(),
            kpis: CampusKpis {
                total_energy: 0.0,
                peak_demand: None,
                average_daily_energy: 0.0,
                building_count: 1,
                weather_correlation: None,
            },
            weather_model: None,
        })
    }

    #[tokio::test]
    async fn health_reports_run_state() {
        let Json(h) = health(State(output())).await;
        assert_eq!(
            h,
            Health {
                status: "ok",
                buildings: 1,
                model: false,
                degraded: true
            }
        );
    }

    #[tokio::test]
    async fn buildings_route_returns_registry() {
        let Json(list) = buildings(State(output())).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "Thompson Library");
    }

    #[test]
    fn router_builds() {
        let _ = router(output());
    }
}
