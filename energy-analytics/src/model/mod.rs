//! Daily campus demand as a linear function of weather.
//!
//! Building-day observations are cleaned in stages into a daily panel, then
//! `energy ≈ β0 + β1·temperature + β2·precipitation + β3·wind` is fitted on
//! standardized features with a ridge penalty on the slopes. Any stage that
//! leaves too few rows aborts the fit; the caller gets `None` and the run
//! continues without a model.

pub mod diagnostics;
pub mod linalg;

use std::collections::BTreeMap;

use energy_domain::domain::{BuildingType, WeatherRegressionModel, WeatherSample};
use time::Date;

use crate::{aggregate::bucket::RunningMean, config::ModelConfig, registry::is_utility_plant_name, stats};

/// One building-day with its joined weather.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub building: String,
    pub code: Option<String>,
    pub building_type: BuildingType,
    pub date: Date,
    pub weather: WeatherSample,
    pub energy: f64,
}

/// One date of the cleaned panel: summed energy, mean weather and the number
/// of building observations behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPanelRow {
    pub date: Date,
    pub energy: f64,
    pub weather: WeatherSample,
    pub coverage: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("only {rows} rows left after {stage}")]
    InsufficientData { stage: &'static str, rows: usize },
    #[error("normal equations are singular or a feature has no variance")]
    Singular,
}

/// Fitted coefficients in natural units plus the standardization used.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    pub intercept: f64,
    pub coefficients: [f64; 3],
    /// Slopes on the standardized features; comparable across features.
    pub standardized: [f64; 3],
    pub means: [f64; 3],
}

impl RidgeFit {
    pub fn predict_raw(&self, weather: &WeatherSample) -> f64 {
        let x = features(weather);
        self.intercept + (0..3).map(|j| self.coefficients[j] * x[j]).sum::<f64>()
    }
}

fn features(w: &WeatherSample) -> [f64; 3] {
    [w.temperature, w.precipitation, w.wind_speed]
}

fn ensure_rows(stage: &'static str, rows: usize, cfg: &ModelConfig) -> Result<(), ModelError> {
    tracing::debug!(stage, rows, "model stage");
    if rows < cfg.min_rows {
        return Err(ModelError::InsufficientData { stage, rows });
    }
    Ok(())
}

/// Drop non-positive energy, utility plants and explicitly excluded codes.
pub fn usable<'a>(observations: &'a [Observation], cfg: &ModelConfig) -> Vec<&'a Observation> {
    observations
        .iter()
        .filter(|o| o.energy.is_finite() && o.energy > 0.0)
        .filter(|o| o.building_type != BuildingType::Utility && !is_utility_plant_name(&o.building))
        .filter(|o| {
            o.code
                .as_deref()
                .map_or(true, |code| !cfg.excluded_building_codes.iter().any(|c| c == code))
        })
        .collect()
}

/// Narrow to benchmark buildings when they alone are well populated.
pub fn prefer_benchmarks<'a>(rows: Vec<&'a Observation>, cfg: &ModelConfig) -> Vec<&'a Observation> {
    if cfg.benchmark_buildings.is_empty() {
        return rows;
    }
    let needles: Vec<String> = cfg.benchmark_buildings.iter().map(|b| b.to_lowercase()).collect();
    let preferred: Vec<&Observation> = rows
        .iter()
        .copied()
        .filter(|o| {
            let name = o.building.to_lowercase();
            needles.iter().any(|n| name.contains(n.as_str()))
        })
        .collect();
    if preferred.len() >= cfg.min_preferred_rows {
        tracing::debug!(rows = preferred.len(), "using benchmark buildings only");
        preferred
    } else {
        rows
    }
}

pub fn daily_panel(rows: &[&Observation]) -> Vec<DailyPanelRow> {
    let mut days: BTreeMap<Date, (f64, [RunningMean; 3], usize)> = BTreeMap::new();
    for o in rows {
        let (energy, means, coverage) = days.entry(o.date).or_default();
        *energy += o.energy;
        *coverage += 1;
        for (mean, value) in means.iter_mut().zip(features(&o.weather)) {
            mean.push(value);
        }
    }
    days.into_iter()
        .filter_map(|(date, (energy, [t, p, w], coverage))| {
            Some(DailyPanelRow {
                date,
                energy,
                weather: WeatherSample {
                    temperature: t.mean()?,
                    precipitation: p.mean()?,
                    wind_speed: w.mean()?,
                },
                coverage,
            })
        })
        .collect()
}

/// Drop dates reported by too few buildings relative to a typical date.
pub fn filter_coverage(panel: Vec<DailyPanelRow>, cfg: &ModelConfig) -> Vec<DailyPanelRow> {
    let coverage: Vec<f64> = panel.iter().map(|r| r.coverage as f64).collect();
    let Some(median) = stats::median(&coverage) else {
        return panel;
    };
    let min = cfg.coverage_ratio * median;
    panel.into_iter().filter(|r| r.coverage as f64 >= min).collect()
}

/// Drop dates whose total is implausibly low for a complete campus day.
pub fn filter_completeness(panel: Vec<DailyPanelRow>, cfg: &ModelConfig) -> Vec<DailyPanelRow> {
    let totals: Vec<f64> = panel.iter().map(|r| r.energy).collect();
    let low = stats::quantile(&totals, cfg.completeness_percentile).unwrap_or(0.0);
    let threshold = cfg.completeness_floor.max(cfg.completeness_ratio * low);
    panel.into_iter().filter(|r| r.energy >= threshold).collect()
}

pub fn trim_outliers(panel: Vec<DailyPanelRow>, cfg: &ModelConfig) -> Vec<DailyPanelRow> {
    let totals: Vec<f64> = panel.iter().map(|r| r.energy).collect();
    let (Some(lo), Some(hi)) = (
        stats::quantile(&totals, cfg.trim_fraction),
        stats::quantile(&totals, 1.0 - cfg.trim_fraction),
    ) else {
        return panel;
    };
    panel.into_iter().filter(|r| r.energy >= lo && r.energy <= hi).collect()
}

/// Run the cleaning stages, failing at the first one that leaves fewer than
/// `min_rows` rows.
pub fn clean_panel(observations: &[Observation], cfg: &ModelConfig) -> Result<Vec<DailyPanelRow>, ModelError> {
    let rows = usable(observations, cfg);
    ensure_rows("usability filter", rows.len(), cfg)?;
    let rows = prefer_benchmarks(rows, cfg);
    ensure_rows("benchmark preference", rows.len(), cfg)?;

    let panel = daily_panel(&rows);
    ensure_rows("daily aggregation", panel.len(), cfg)?;
    let panel = filter_coverage(panel, cfg);
    ensure_rows("coverage filter", panel.len(), cfg)?;
    let panel = filter_completeness(panel, cfg);
    ensure_rows("completeness filter", panel.len(), cfg)?;
    let panel = trim_outliers(panel, cfg);
    ensure_rows("outlier trim", panel.len(), cfg)?;
    Ok(panel)
}

/// Ridge regression on standardized features; the intercept is not penalized.
pub fn fit_ridge(panel: &[DailyPanelRow], cfg: &ModelConfig) -> Result<RidgeFit, ModelError> {
    if panel.len() < 2 {
        return Err(ModelError::InsufficientData { stage: "fit", rows: panel.len() });
    }

    let mut means = [0.0; 3];
    let mut stds = [0.0; 3];
    for j in 0..3 {
        let column: Vec<f64> = panel.iter().map(|r| features(&r.weather)[j]).collect();
        means[j] = stats::mean(&column).unwrap_or(0.0);
        stds[j] = stats::std_dev(&column).unwrap_or(0.0);
        if stds[j] * stds[j] < cfg.pivot_epsilon {
            return Err(ModelError::Singular);
        }
    }

    let mut xtx = [[0.0; 4]; 4];
    let mut xty = [0.0; 4];
    for row in panel {
        let raw = features(&row.weather);
        let x = [
            1.0,
            (raw[0] - means[0]) / stds[0],
            (raw[1] - means[1]) / stds[1],
            (raw[2] - means[2]) / stds[2],
        ];
        for i in 0..4 {
            for k in 0..4 {
                xtx[i][k] += x[i] * x[k];
            }
            xty[i] += x[i] * row.energy;
        }
    }
    for (i, row) in xtx.iter_mut().enumerate().skip(1) {
        row[i] += cfg.ridge_alpha;
    }

    let beta = linalg::solve(xtx, xty, cfg.pivot_epsilon).ok_or(ModelError::Singular)?;

    let standardized = [beta[1], beta[2], beta[3]];
    let mut coefficients = [0.0; 3];
    let mut intercept = beta[0];
    for j in 0..3 {
        coefficients[j] = standardized[j] / stds[j];
        intercept -= coefficients[j] * means[j];
    }

    Ok(RidgeFit {
        intercept,
        coefficients,
        standardized,
        means,
    })
}

pub fn try_build_weather_model(
    observations: &[Observation],
    cfg: &ModelConfig,
) -> Result<WeatherRegressionModel, ModelError> {
    let panel = clean_panel(observations, cfg)?;
    let fit = fit_ridge(&panel, cfg)?;
    Ok(diagnostics::assemble(&fit, &panel, cfg))
}

/// Fit the weather model, or `None` when the data cannot support one.
pub fn build_weather_model(observations: &[Observation], cfg: &ModelConfig) -> Option<WeatherRegressionModel> {
    match try_build_weather_model(observations, cfg) {
        Ok(model) => {
            tracing::info!(
                panel_days = model.panel_days,
                r_squared = model.r_squared,
                temperature_coef = model.temperature_coef,
                "weather model fitted"
            );
            Some(model)
        }
        Err(e) => {
            tracing::warn!(error = %e, observations = observations.len(), "no weather model for this run");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::Duration;

    /// Three buildings over `days` days with a positive temperature response.
    pub(crate) fn synthetic_observations(days: usize) -> Vec<Observation> {
        let start = time::macros::date!(2024 - 06 - 01);
        let mut out = Vec::new();
        for i in 0..days {
            let weather = WeatherSample {
                temperature: 30.0 + ((i * 7) % 40) as f64,
                precipitation: ((i * 3) % 5) as f64 * 0.1,
                wind_speed: 2.0 + ((i * 5) % 9) as f64,
            };
            for (b, name) in ["Thompson Library", "Hall A", "Union"].iter().enumerate() {
                let wobble = ((i * 13 + b) % 7) as f64 * 10.0;
                out.push(Observation {
                    building: name.to_string(),
                    code: Some((b + 1).to_string()),
                    building_type: BuildingType::Academic,
                    date: start + Duration::days(i as i64),
                    weather,
                    energy: 20_000.0 + 500.0 * weather.temperature + 1_000.0 * weather.precipitation
                        - 200.0 * weather.wind_speed
                        + wobble,
                });
            }
        }
        out
    }

    #[test]
    fn recovers_positive_temperature_slope() {
        let cfg = ModelConfig::default();
        let model = build_weather_model(&synthetic_observations(60), &cfg).unwrap();
        assert!(model.temperature_coef > 0.0);
        assert!((model.temperature_coef - 1_500.0).abs() < 150.0);
        assert!(model.wind_speed_coef < 0.0);
        assert!((0.0..=1.0).contains(&model.r_squared));
        assert!(model.panel_days >= cfg.min_rows);
    }

    #[test]
    fn zero_precipitation_column_yields_no_model() {
        let mut obs = synthetic_observations(60);
        for o in &mut obs {
            o.weather.precipitation = 0.0;
        }
        let cfg = ModelConfig::default();
        assert_eq!(try_build_weather_model(&obs, &cfg).unwrap_err(), ModelError::Singular);
        assert!(build_weather_model(&obs, &cfg).is_none());
    }

    #[test]
    fn too_few_days_is_insufficient() {
        let cfg = ModelConfig::default();
        match try_build_weather_model(&synthetic_observations(5), &cfg) {
            Err(ModelError::InsufficientData { stage, rows }) => {
                assert_eq!(stage, "daily aggregation");
                assert_eq!(rows, 5);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn usability_drops_plants_and_excluded_codes() {
        let mut obs = synthetic_observations(1);
        obs[0].building = "Central Chiller Plant".to_string();
        obs[1].code = Some("79".to_string());
        obs[2].energy = f64::NAN;
        let cfg = ModelConfig {
            excluded_building_codes: vec!["79".to_string()],
            ..ModelConfig::default()
        };
        assert!(usable(&obs, &cfg).is_empty());
    }

    #[test]
    fn benchmarks_win_only_when_well_populated() {
        let obs = synthetic_observations(20);
        let rows = usable(&obs, &ModelConfig::default());
        let cfg = ModelConfig {
            benchmark_buildings: vec!["library".to_string()],
            min_preferred_rows: 20,
            ..ModelConfig::default()
        };
        let preferred = prefer_benchmarks(rows.clone(), &cfg);
        assert_eq!(preferred.len(), 20);
        assert!(preferred.iter().all(|o| o.building == "Thompson Library"));

        let strict = ModelConfig { min_preferred_rows: 50, ..cfg };
        assert_eq!(prefer_benchmarks(rows, &strict).len(), 60);
    }

    #[test]
    fn panel_stages_drop_thin_and_low_days() {
        let cfg = ModelConfig::default();
        let day = |d: u8, energy: f64, coverage: usize| DailyPanelRow {
            date: time::Date::from_calendar_date(2024, time::Month::June, d).unwrap(),
            energy,
            weather: WeatherSample::default(),
            coverage,
        };
        let panel = vec![day(1, 50_000.0, 10), day(2, 52_000.0, 10), day(3, 40_000.0, 5), day(4, 9_000.0, 10)];

        let covered = filter_coverage(panel, &cfg);
        assert_eq!(covered.len(), 3);
        let complete = filter_completeness(covered, &cfg);
        assert_eq!(complete.iter().map(|r| r.energy).collect::<Vec<_>>(), vec![50_000.0, 52_000.0]);
    }
}
