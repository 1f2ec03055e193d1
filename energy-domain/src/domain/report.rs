//! Output contract handed to presentation code.
//!
//! Every type here serializes to camelCase JSON. The whole object is rebuilt
//! on every run; nothing in it is updated incrementally.

use serde::Serialize;

use super::{Building, BuildingType, WeatherSample, YearMonth};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOutput {
    pub source: SourceProvenance,
    pub buildings: Vec<Building>,
    pub hourly: Vec<HourPoint>,
    pub daily: Vec<DayPoint>,
    pub consumption: Vec<BuildingConsumptionSummary>,
    pub building_months: Vec<BuildingMonthSeries>,
    pub utility_months: Vec<UtilityMonthPoint>,
    pub mom_changes: Vec<MomChange>,
    pub forecasts: Vec<MomForecast>,
    pub kpis: CampusKpis,
    pub weather_model: Option<WeatherRegressionModel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Primary,
    Fallback,
}

/// Which source actually fed the aggregates, and what came out of it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceProvenance {
    pub role: SourceRole,
    pub name: String,
    pub path: String,
    pub format: String,
    pub degraded: bool,
    pub rows: u64,
    pub electricity_rows: u64,
    pub rows_without_timestamp: u64,
    /// blake3 digest over every normalized record, in stream order.
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourPoint {
    pub hour: String,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPoint {
    pub date: String,
    pub energy: f64,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub coverage: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingConsumptionSummary {
    pub building: String,
    pub building_type: BuildingType,
    pub area: f64,
    pub total_energy: f64,
    pub average_hourly: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPoint {
    pub month: YearMonth,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingMonthSeries {
    pub building: String,
    pub points: Vec<MonthPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilityMonthPoint {
    pub utility: String,
    pub month: YearMonth,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomChange {
    pub building: String,
    pub month: YearMonth,
    pub previous: f64,
    pub current: f64,
    pub change: f64,
    /// `None` when the previous month is zero.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomForecast {
    pub building: String,
    pub last_month: YearMonth,
    pub last_value: f64,
    pub predicted_month: YearMonth,
    pub predicted_value: f64,
    pub growth_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakDemand {
    pub hour: String,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampusKpis {
    pub total_energy: f64,
    pub peak_demand: Option<PeakDemand>,
    pub average_daily_energy: f64,
    pub building_count: usize,
    /// Pearson correlation of daily mean temperature against daily energy.
    pub weather_correlation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Temperature,
    Precipitation,
    WindSpeed,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Temperature, Feature::Precipitation, Feature::WindSpeed];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportance {
    pub feature: Feature,
    pub standardized_coefficient: f64,
    pub importance_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectPoint {
    pub temperature: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioPoint {
    pub label: String,
    pub temperature: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub moderate: ScenarioPoint,
    pub extreme: ScenarioPoint,
    pub delta: f64,
    pub delta_pct: Option<f64>,
}

/// Temperature × wind response surface; `predicted[w][t]` pairs
/// `wind_speeds[w]` with `temperatures[t]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseGrid {
    pub temperatures: Vec<f64>,
    pub wind_speeds: Vec<f64>,
    pub predicted: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEvaluation {
    pub holdout_days: usize,
    pub mae: f64,
    pub rmse: f64,
    pub mae_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRegressionModel {
    pub intercept: f64,
    pub temperature_coef: f64,
    pub precipitation_coef: f64,
    pub wind_speed_coef: f64,
    pub r_squared: f64,
    pub panel_days: usize,
    pub feature_means: WeatherSample,
    /// Upper bound applied to every point estimate; the lower bound is zero.
    pub prediction_ceiling: f64,
    pub feature_importance: Vec<FeatureImportance>,
    pub marginal_effect: Vec<EffectPoint>,
    pub scenario: ScenarioComparison,
    pub grid: ResponseGrid,
    pub evaluation: Option<ModelEvaluation>,
}

impl WeatherRegressionModel {
    /// Point estimate for one day of weather, clamped to `[0, prediction_ceiling]`.
    pub fn predict(&self, weather: &WeatherSample) -> f64 {
        let raw = self.intercept
            + self.temperature_coef * weather.temperature
            + self.precipitation_coef * weather.precipitation
            + self.wind_speed_coef * weather.wind_speed;
        if raw.is_finite() {
            raw.clamp(0.0, self.prediction_ceiling.max(0.0))
        } else {
            0.0
        }
    }
}
