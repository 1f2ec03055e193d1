//! Everything reported alongside the coefficients: fit quality, feature
//! importance, response curves and the holdout check.

use energy_domain::domain::{
    EffectPoint, Feature, FeatureImportance, ModelEvaluation, ResponseGrid, ScenarioComparison,
    ScenarioPoint, WeatherRegressionModel, WeatherSample,
};

use super::{fit_ridge, DailyPanelRow, RidgeFit};
use crate::{config::ModelConfig, stats};

fn bounded(raw: f64, ceiling: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, ceiling.max(0.0))
    } else {
        0.0
    }
}

/// Upper prediction bound from the observed panel totals.
pub fn prediction_ceiling(panel: &[DailyPanelRow], cfg: &ModelConfig) -> f64 {
    let totals: Vec<f64> = panel.iter().map(|r| r.energy).collect();
    let high = stats::quantile(&totals, cfg.ceiling_percentile).unwrap_or(0.0);
    let max = totals.iter().copied().fold(0.0, f64::max);
    (high * cfg.ceiling_percentile_factor).max(max * cfg.ceiling_max_factor)
}

/// Coefficient of determination on the fitting panel, clamped to `[0, 1]`.
pub fn r_squared(fit: &RidgeFit, panel: &[DailyPanelRow]) -> f64 {
    let actual: Vec<f64> = panel.iter().map(|r| r.energy).collect();
    let Some(mean) = stats::mean(&actual) else {
        return 0.0;
    };
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    let ss_res: f64 = panel
        .iter()
        .map(|r| (r.energy - fit.predict_raw(&r.weather)).powi(2))
        .sum();
    let r2 = 1.0 - ss_res / ss_tot;
    if r2.is_finite() {
        r2.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Shares of absolute standardized coefficients, largest first.
pub fn feature_importance(standardized: &[f64; 3]) -> Vec<FeatureImportance> {
    let total: f64 = standardized.iter().map(|c| c.abs()).sum();
    let mut out: Vec<FeatureImportance> = Feature::ALL
        .iter()
        .zip(standardized)
        .map(|(feature, coef)| FeatureImportance {
            feature: *feature,
            standardized_coefficient: *coef,
            importance_pct: if total > 0.0 {
                coef.abs() / total * 100.0
            } else {
                100.0 / 3.0
            },
        })
        .collect();
    out.sort_by(|a, b| b.importance_pct.total_cmp(&a.importance_pct));
    out
}

fn range(panel: &[DailyPanelRow], pick: impl Fn(&WeatherSample) -> f64) -> (f64, f64) {
    panel.iter().map(|r| pick(&r.weather)).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn linspace(lo: f64, hi: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![lo],
        n => (0..n).map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64).collect(),
    }
}

pub fn marginal_effect<P>(predict: P, panel: &[DailyPanelRow], means: &WeatherSample, cfg: &ModelConfig) -> Vec<EffectPoint>
where
    P: Fn(&WeatherSample) -> f64,
{
    let (lo, hi) = range(panel, |w| w.temperature);
    if !lo.is_finite() || !hi.is_finite() {
        return Vec::new();
    }
    let (start, end) = (lo.floor(), hi.ceil());
    let span = end - start;
    if !span.is_finite() {
        return Vec::new();
    }
    // A stray weather value can stretch the range arbitrarily far; past
    // `marginal_max_points` the step widens instead of the curve growing.
    let max_points = cfg.marginal_max_points.max(2);
    let base = if cfg.marginal_step > 0.0 { cfg.marginal_step } else { 1.0 };
    let step = base.max(span / (max_points - 1) as f64);
    let count = ((span / step).floor() as usize + 1).min(max_points);
    (0..count)
        .map(|i| {
            let temperature = start + step * i as f64;
            EffectPoint {
                temperature,
                predicted: predict(&WeatherSample { temperature, ..*means }),
            }
        })
        .collect()
}

pub fn scenario<P>(predict: P, means: &WeatherSample, cfg: &ModelConfig) -> ScenarioComparison
where
    P: Fn(&WeatherSample) -> f64,
{
    let point = |label: &str, temperature: f64| ScenarioPoint {
        label: label.to_string(),
        temperature,
        predicted: predict(&WeatherSample { temperature, ..*means }),
    };
    let moderate = point("moderate", cfg.moderate_temperature);
    let extreme = point("extreme", cfg.extreme_temperature);
    let delta = extreme.predicted - moderate.predicted;
    ScenarioComparison {
        delta_pct: (moderate.predicted != 0.0).then(|| delta / moderate.predicted * 100.0),
        moderate,
        extreme,
        delta,
    }
}

pub fn response_grid<P>(predict: P, panel: &[DailyPanelRow], means: &WeatherSample, cfg: &ModelConfig) -> ResponseGrid
where
    P: Fn(&WeatherSample) -> f64,
{
    let (t_lo, t_hi) = range(panel, |w| w.temperature);
    let (w_lo, w_hi) = range(panel, |w| w.wind_speed);
    if panel.is_empty() {
        return ResponseGrid { temperatures: Vec::new(), wind_speeds: Vec::new(), predicted: Vec::new() };
    }
    let temperatures = linspace(t_lo, t_hi, cfg.grid_temperature_steps);
    let wind_speeds = linspace(w_lo, w_hi, cfg.grid_wind_steps);
    let predicted = wind_speeds
        .iter()
        .map(|&wind_speed| {
            temperatures
                .iter()
                .map(|&temperature| {
                    predict(&WeatherSample {
                        temperature,
                        wind_speed,
                        precipitation: means.precipitation,
                    })
                })
                .collect()
        })
        .collect();
    ResponseGrid {
        temperatures,
        wind_speeds,
        predicted,
    }
}

/// Refit without the most recent `holdout_days` dates and score those dates.
/// `None` when the panel is too short or the reduced fit fails.
pub fn holdout_evaluation(panel: &[DailyPanelRow], cfg: &ModelConfig) -> Option<ModelEvaluation> {
    let holdout = cfg.holdout_days;
    if holdout == 0 || panel.len() < cfg.min_rows + holdout {
        return None;
    }
    let (train, test) = panel.split_at(panel.len() - holdout);
    let fit = match fit_ridge(train, cfg) {
        Ok(fit) => fit,
        Err(e) => {
            tracing::debug!(error = %e, "holdout refit failed");
            return None;
        }
    };
    let ceiling = prediction_ceiling(train, cfg);

    let errors: Vec<f64> = test
        .iter()
        .map(|r| r.energy - bounded(fit.predict_raw(&r.weather), ceiling))
        .collect();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / holdout as f64;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / holdout as f64).sqrt();
    let actual_mean = test.iter().map(|r| r.energy).sum::<f64>() / holdout as f64;

    Some(ModelEvaluation {
        holdout_days: holdout,
        mae,
        rmse,
        mae_pct: (actual_mean > 0.0).then(|| mae / actual_mean * 100.0),
    })
}

/// Build the full model report from a fit on the cleaned panel.
pub fn assemble(fit: &RidgeFit, panel: &[DailyPanelRow], cfg: &ModelConfig) -> WeatherRegressionModel {
    let ceiling = prediction_ceiling(panel, cfg);
    let means = WeatherSample {
        temperature: fit.means[0],
        precipitation: fit.means[1],
        wind_speed: fit.means[2],
    };
    let predict = |w: &WeatherSample| bounded(fit.predict_raw(w), ceiling);

    WeatherRegressionModel {
        intercept: fit.intercept,
        temperature_coef: fit.coefficients[0],
        precipitation_coef: fit.coefficients[1],
        wind_speed_coef: fit.coefficients[2],
        r_squared: r_squared(fit, panel),
        panel_days: panel.len(),
        feature_means: means,
        prediction_ceiling: ceiling,
        feature_importance: feature_importance(&fit.standardized),
        marginal_effect: marginal_effect(predict, panel, &means, cfg),
        scenario: scenario(predict, &means, cfg),
        grid: response_grid(predict, panel, &means, cfg),
        evaluation: holdout_evaluation(panel, cfg),
    }
}
