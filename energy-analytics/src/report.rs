//! Turns finished aggregates into the serialized `AnalyticsOutput`.

use std::{collections::BTreeMap, fs, path::Path};

use energy_domain::domain::{AnalyticsOutput, SourceProvenance, SourceRole, WeatherSample};
use time::Date;

use crate::{
    aggregate::Aggregates,
    config::{AppConfig, SourceConfig},
    forecast,
    model::{self, Observation},
    registry::BuildingRegistry,
    sources::reference_tables::ReferenceTables,
    summary,
};

/// The source that actually fed the aggregation pass.
#[derive(Debug, Clone)]
pub struct SelectedSource {
    pub role: SourceRole,
    pub name: String,
    pub config: SourceConfig,
}

impl SelectedSource {
    pub fn degraded(&self) -> bool {
        self.role == SourceRole::Fallback
    }
}

/// Building-day observations for the weather model. Days whose rows carried
/// no weather take it from the daily weather table; days with neither are
/// left out.
pub fn observations(
    agg: &Aggregates,
    registry: &BuildingRegistry,
    weather_daily: &BTreeMap<Date, WeatherSample>,
) -> Vec<Observation> {
    agg.building_daily
        .iter()
        .filter_map(|((building, date), bucket)| {
            let weather = bucket.weather().or_else(|| weather_daily.get(date).copied())?;
            let entry = registry.get(building);
            Some(Observation {
                building: building.clone(),
                code: entry.and_then(|b| b.code.clone()),
                building_type: entry.map(|b| b.building_type).unwrap_or_default(),
                date: *date,
                weather,
                energy: bucket.energy,
            })
        })
        .collect()
}

pub fn assemble(
    mut agg: Aggregates,
    selected: &SelectedSource,
    refs: &ReferenceTables,
    cfg: &AppConfig,
) -> AnalyticsOutput {
    let mut registry = std::mem::take(&mut agg.registry);
    let filled = registry.apply_metadata(&refs.metadata);
    registry.classify(&refs.tags);
    tracing::debug!(filled, buildings = registry.len(), "registry finalized");

    let building_months = summary::building_month_series(&agg.building_monthly);
    let daily = summary::daily_points(&agg.daily, &refs.weather);
    let observations = observations(&agg, &registry, &refs.weather);

    AnalyticsOutput {
        source: SourceProvenance {
            role: selected.role,
            name: selected.name.clone(),
            path: selected.config.path.display().to_string(),
            format: selected.config.format.as_str().to_string(),
            degraded: selected.degraded(),
            rows: agg.counters.rows,
            electricity_rows: agg.counters.electricity_rows,
            rows_without_timestamp: agg.counters.rows_without_timestamp,
            fingerprint: agg.fingerprint.clone(),
        },
        consumption: summary::consumption_summaries(&registry, &building_months, &agg.building_readings),
        hourly: summary::hourly_points(&agg.hourly),
        kpis: summary::campus_kpis(&agg.hourly, &daily, registry.len()),
        daily,
        utility_months: summary::utility_month_points(&agg.utility_monthly),
        mom_changes: summary::mom_changes(&building_months),
        forecasts: forecast::forecast_all(&building_months, &cfg.forecast),
        weather_model: model::build_weather_model(&observations, &cfg.model),
        building_months,
        buildings: registry.buildings().cloned().collect(),
    }
}

/// Write the output as pretty JSON, creating parent directories as needed.
pub fn write_json(path: &Path, output: &AnalyticsOutput) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("failed to create '{}': {e}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(output)?;
    fs::write(path, json).map_err(|e| anyhow::anyhow!("failed to write '{}': {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::Aggregator, config::SourceFormat, registry::BuildingTags, sources::reference_tables::BuildingMetadata};
    use energy_domain::domain::{BuildingType, RawRecord};
    use std::sync::Arc;
    use time::macros::{date, datetime};

    fn config() -> AppConfig {
        AppConfig::from_toml_str(
            r#"
            [sources]
            merged = { path = "m.csv" }
            meter_premerge = { path = "p.csv" }
            building_metadata = { path = "b.csv" }
            weather_daily = { path = "w.csv" }
            "#,
        )
        .unwrap()
    }

    #[test]
    fn assembles_output_with_metadata_and_weather_fallback() {
        let mut agg = Aggregator::new();
        for (i, ts) in [datetime!(2025-01-01 10:00), datetime!(2025-01-02 10:00), datetime!(2025-02-01 10:00)]
            .into_iter()
            .enumerate()
        {
            agg.observe(&RawRecord {
                utility: "ELECTRICITY".into(),
                ts: Some(ts),
                energy: 100.0 * (i + 1) as f64,
                building_code: Some("12".into()),
                building_name: Some("Stadium Annex".into()),
                area: 0.0,
                weather: None,
            });
        }
        let agg = agg.finish().unwrap();

        let mut tags = BuildingTags::default();
        tags.insert(Some("12"), None, BuildingType::Labs);
        let refs = ReferenceTables {
            metadata: vec![BuildingMetadata { code: Some("12".into()), name: None, area: 600.0 }],
            weather: Arc::new(BTreeMap::from([(
                date!(2025 - 01 - 01),
                WeatherSample { temperature: 10.0, precipitation: 0.0, wind_speed: 1.0 },
            )])),
            tags,
        };
        let selected = SelectedSource {
            role: SourceRole::Fallback,
            name: "meter_premerge".into(),
            config: SourceConfig { path: "p.csv".into(), format: SourceFormat::Csv },
        };

        let out = assemble(agg, &selected, &refs, &config());

        assert!(out.source.degraded);
        assert_eq!(out.source.rows, 3);
        assert_eq!(out.buildings.len(), 1);
        assert_eq!(out.buildings[0].area, 600.0);
        assert_eq!(out.buildings[0].building_type, BuildingType::Labs);
        assert_eq!(out.consumption[0].intensity, 1.0);
        assert_eq!(out.daily.len(), 3);
        assert_eq!(out.daily[0].temperature, Some(10.0));
        assert_eq!(out.daily[1].temperature, None);
        assert_eq!(out.mom_changes.len(), 1);
        assert!(out.weather_model.is_none());

        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("weatherModel").unwrap().is_null());
        assert_eq!(json["source"]["role"], "fallback");
        assert_eq!(json["buildingMonths"][0]["points"][0]["month"], "2025-01");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json(&path, &out).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["source"]["rows"], 3);
    }
}
