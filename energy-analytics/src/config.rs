use serde::Deserialize;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Comma-delimited with a header row.
    #[default]
    Csv,
    /// Pipe-delimited (`.dat`) with a header row.
    Dat,
    /// One JSON object per line, keyed by column name.
    Ndjson,
}

impl SourceFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            Self::Dat => b'|',
            Self::Csv | Self::Ndjson => b',',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Dat => "dat",
            Self::Ndjson => "ndjson",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: SourceFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Wide meter+building+weather export; the primary source.
    pub merged: SourceConfig,
    /// Reduced meter export used when `merged` cannot be read.
    pub meter_premerge: SourceConfig,
    pub building_metadata: SourceConfig,
    pub weather_daily: SourceConfig,
    #[serde(default)]
    pub building_tags: Option<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("analytics-output.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Tunables for the robust month-over-month forecaster.
///
/// The floor ratio, change cutoff and baseline blend have no derivation
/// beyond "works on campus data"; calibrate them against real series.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub window: usize,
    pub floor_min: f64,
    pub floor_ratio: f64,
    pub max_abs_change: f64,
    pub last_weight: f64,
    pub clamp_low: f64,
    pub clamp_high: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: 6,
            floor_min: 10_000.0,
            floor_ratio: 0.2,
            max_abs_change: 0.4,
            last_weight: 0.65,
            clamp_low: 0.75,
            clamp_high: 1.25,
        }
    }
}

/// Tunables for the weather regression model and its cleaning stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Name substrings of benchmark buildings preferred when they are well populated.
    pub benchmark_buildings: Vec<String>,
    /// Normalized building codes never used for fitting (e.g. substations).
    pub excluded_building_codes: Vec<String>,
    pub min_rows: usize,
    pub min_preferred_rows: usize,
    pub coverage_ratio: f64,
    pub completeness_floor: f64,
    pub completeness_percentile: f64,
    pub completeness_ratio: f64,
    pub trim_fraction: f64,
    pub ridge_alpha: f64,
    pub pivot_epsilon: f64,
    pub ceiling_percentile: f64,
    pub ceiling_percentile_factor: f64,
    pub ceiling_max_factor: f64,
    pub marginal_step: f64,
    /// Upper bound on marginal-effect points; the step widens to stay under it.
    pub marginal_max_points: usize,
    pub moderate_temperature: f64,
    pub extreme_temperature: f64,
    pub grid_temperature_steps: usize,
    pub grid_wind_steps: usize,
    pub holdout_days: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            benchmark_buildings: Vec::new(),
            excluded_building_codes: Vec::new(),
            min_rows: 10,
            min_preferred_rows: 50,
            coverage_ratio: 0.6,
            completeness_floor: 10_000.0,
            completeness_percentile: 0.05,
            completeness_ratio: 0.5,
            trim_fraction: 0.01,
            ridge_alpha: 1.0,
            pivot_epsilon: 1e-10,
            ceiling_percentile: 0.99,
            ceiling_percentile_factor: 1.25,
            ceiling_max_factor: 1.1,
            marginal_step: 2.0,
            marginal_max_points: 200,
            moderate_temperature: 70.0,
            extreme_temperature: 90.0,
            grid_temperature_steps: 10,
            grid_wind_steps: 8,
            holdout_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub server: Option<ServerConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ANALYTICS_CONFIG").unwrap_or_else(|_| "analytics-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [sources]
            merged = { path = "data/merged.csv" }
            meter_premerge = { path = "data/premerge.dat", format = "dat" }
            building_metadata = { path = "data/buildings.csv" }
            weather_daily = { path = "data/weather.csv" }
            "#,
        )
        .unwrap();

        assert_eq!(cfg.sources.merged.format, SourceFormat::Csv);
        assert_eq!(cfg.sources.meter_premerge.format, SourceFormat::Dat);
        assert!(cfg.sources.building_tags.is_none());
        assert!(cfg.server.is_none());
        assert_eq!(cfg.output.path, PathBuf::from("analytics-output.json"));
        assert_eq!(cfg.forecast.window, 6);
        assert_eq!(cfg.model.ridge_alpha, 1.0);
        assert_eq!(cfg.model.min_rows, 10);
    }

    #[test]
    fn partial_model_section_keeps_other_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [sources]
            merged = { path = "m.ndjson", format = "ndjson" }
            meter_premerge = { path = "p.csv" }
            building_metadata = { path = "b.csv" }
            weather_daily = { path = "w.csv" }
            building_tags = { path = "t.csv" }

            [model]
            benchmark_buildings = ["Library", "Union"]
            ridge_alpha = 2.5

            [server]
            bind_addr = "127.0.0.1:8001"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.sources.merged.format, SourceFormat::Ndjson);
        assert!(cfg.sources.building_tags.is_some());
        assert_eq!(cfg.model.benchmark_buildings.len(), 2);
        assert_eq!(cfg.model.ridge_alpha, 2.5);
        assert_eq!(cfg.model.coverage_ratio, 0.6);
        assert_eq!(cfg.server.unwrap().bind_addr, "127.0.0.1:8001");
    }
}
