//! Robust next-month estimate per building.
//!
//! Months far below a building's recent level (meter outages, partial
//! exports) are treated as invalid and kept out of both the growth rate and
//! the baseline.

use energy_domain::domain::{BuildingMonthSeries, MomForecast, MonthPoint};

use crate::{config::ForecastConfig, stats};

fn validity_floor(points: &[MonthPoint], cfg: &ForecastConfig) -> f64 {
    let recent: Vec<f64> = points
        .iter()
        .rev()
        .take(cfg.window)
        .map(|p| p.energy)
        .collect();
    let median = stats::median(&recent).unwrap_or(0.0);
    cfg.floor_min.max(cfg.floor_ratio * median)
}

/// Forecast the month after the last valid month of a chronological series.
/// Returns `None` when fewer than two positive months exist.
pub fn forecast_next_month(series: &BuildingMonthSeries, cfg: &ForecastConfig) -> Option<MomForecast> {
    let positive: Vec<MonthPoint> = series.points.iter().copied().filter(|p| p.energy > 0.0).collect();

    let floor = validity_floor(&positive, cfg);
    let mut effective: Vec<MonthPoint> = positive.iter().copied().filter(|p| p.energy >= floor).collect();
    if effective.len() < 2 {
        effective = positive;
    }
    if effective.len() < 2 {
        return None;
    }

    let transition_floor = validity_floor(&effective, cfg);
    let changes: Vec<f64> = effective
        .windows(2)
        .filter(|w| w[0].energy >= transition_floor)
        .map(|w| (w[1].energy - w[0].energy) / w[0].energy)
        .filter(|c| c.is_finite() && c.abs() <= cfg.max_abs_change)
        .collect();
    let growth = stats::median(&changes).unwrap_or(0.0);

    let last = *effective.last()?;
    let recent: Vec<f64> = effective.iter().rev().take(cfg.window).map(|p| p.energy).collect();
    let recent_mean = stats::mean(&recent).unwrap_or(last.energy);
    let baseline = cfg.last_weight * last.energy + (1.0 - cfg.last_weight) * recent_mean;
    let predicted = (baseline * (1.0 + growth))
        .clamp(cfg.clamp_low * last.energy, cfg.clamp_high * last.energy);

    Some(MomForecast {
        building: series.building.clone(),
        last_month: last.month,
        last_value: last.energy,
        predicted_month: last.month.next(),
        predicted_value: predicted,
        growth_rate_pct: (growth * 10_000.0).round() / 100.0,
    })
}

pub fn forecast_all(series: &[BuildingMonthSeries], cfg: &ForecastConfig) -> Vec<MomForecast> {
    let forecasts: Vec<_> = series.iter().filter_map(|s| forecast_next_month(s, cfg)).collect();
    tracing::debug!(
        buildings = series.len(),
        forecasts = forecasts.len(),
        "month-over-month forecasts computed"
    );
    forecasts
}
