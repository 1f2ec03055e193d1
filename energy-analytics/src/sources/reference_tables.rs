//! Small lookup tables read in full: building metadata, daily weather and
//! the building tag table. Blocking; the runner calls these from
//! `spawn_blocking`.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use energy_domain::domain::{BuildingType, WeatherSample};
use time::Date;

use super::normalize::{
    coerce_number, normalize_building_code, optional_text, parse_date, ColumnIndex, AREA,
    BUILDING_NAME, BUILDING_NUMBER, BUILDING_TYPE, DATE, PRECIPITATION, TEMPERATURE, WIND_SPEED,
};
use super::delimited_file::open_reader;
use crate::{
    aggregate::bucket::RunningMean,
    config::{SourceConfig, SourcesConfig},
    pipeline::PipelineError,
    registry::BuildingTags,
};

/// One row of the building metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingMetadata {
    pub code: Option<String>,
    pub name: Option<String>,
    pub area: f64,
}

fn for_each_row<F>(name: &str, path: &Path, delimiter: u8, mut visit: F) -> Result<(), PipelineError>
where
    F: FnMut(&ColumnIndex, &csv::StringRecord),
{
    let (mut rdr, headers) = open_reader(name, path, delimiter)?;
    let index = ColumnIndex::from_headers(headers.iter());
    for result in rdr.byte_records() {
        let record = result.map_err(|e| PipelineError::source_csv(name, "failed to read record", &e))?;
        visit(&index, &csv::StringRecord::from_byte_record_lossy(record));
    }
    Ok(())
}

pub fn load_building_metadata(
    name: &str,
    source: &SourceConfig,
) -> Result<Vec<BuildingMetadata>, PipelineError> {
    let mut rows = Vec::new();
    for_each_row(name, &source.path, source.format.delimiter(), |index, record| {
        let field = |n: &str| index.field(record, n).unwrap_or("");
        let row = BuildingMetadata {
            code: normalize_building_code(field(BUILDING_NUMBER)),
            name: optional_text(field(BUILDING_NAME)),
            area: coerce_number(field(AREA)),
        };
        if row.code.is_some() || row.name.is_some() {
            rows.push(row);
        }
    })?;
    tracing::debug!(source = name, rows = rows.len(), "loaded building metadata");
    Ok(rows)
}

/// Daily weather keyed by date. Several rows for the same date (an hourly
/// export) are averaged.
pub fn load_weather_daily(
    name: &str,
    source: &SourceConfig,
) -> Result<BTreeMap<Date, WeatherSample>, PipelineError> {
    let mut sums: BTreeMap<Date, [RunningMean; 3]> = BTreeMap::new();
    let mut undated = 0u64;
    for_each_row(name, &source.path, source.format.delimiter(), |index, record| {
        let field = |n: &str| index.field(record, n).unwrap_or("");
        let Some(date) = parse_date(field(DATE)) else {
            undated += 1;
            return;
        };
        let means = sums.entry(date).or_default();
        means[0].push(coerce_number(field(TEMPERATURE)));
        means[1].push(coerce_number(field(PRECIPITATION)));
        means[2].push(coerce_number(field(WIND_SPEED)));
    })?;
    if undated > 0 {
        tracing::warn!(source = name, undated, "weather rows without a parseable date were skipped");
    }

    Ok(sums
        .into_iter()
        .filter_map(|(date, [t, p, w])| {
            Some((
                date,
                WeatherSample {
                    temperature: t.mean()?,
                    precipitation: p.mean()?,
                    wind_speed: w.mean()?,
                },
            ))
        })
        .collect())
}

/// Explicit building-type assignments. Rows with an unknown type are ignored.
pub fn load_building_tags(name: &str, source: &SourceConfig) -> Result<BuildingTags, PipelineError> {
    let mut tags = BuildingTags::default();
    let mut unknown = 0u64;
    for_each_row(name, &source.path, source.format.delimiter(), |index, record| {
        let field = |n: &str| index.field(record, n).unwrap_or("");
        let Some(building_type) = BuildingType::parse(field(BUILDING_TYPE)) else {
            unknown += 1;
            return;
        };
        tags.insert(
            normalize_building_code(field(BUILDING_NUMBER)).as_deref(),
            optional_text(field(BUILDING_NAME)).as_deref(),
            building_type,
        );
    })?;
    if unknown > 0 {
        tracing::warn!(source = name, unknown, "tag rows with an unrecognised building type were skipped");
    }
    Ok(tags)
}

/// Every lookup table a run needs, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub metadata: Vec<BuildingMetadata>,
    pub weather: Arc<BTreeMap<Date, WeatherSample>>,
    pub tags: BuildingTags,
}

impl ReferenceTables {
    pub fn load(sources: &SourcesConfig) -> Result<Self, PipelineError> {
        let metadata = load_building_metadata("building_metadata", &sources.building_metadata)?;
        let weather = load_weather_daily("weather_daily", &sources.weather_daily)?;
        let tags = match &sources.building_tags {
            Some(cfg) => load_building_tags("building_tags", cfg)?,
            None => BuildingTags::default(),
        };
        tracing::info!(
            buildings = metadata.len(),
            weather_days = weather.len(),
            tagged = !tags.is_empty(),
            "reference tables loaded"
        );
        Ok(Self {
            metadata,
            weather: Arc::new(weather),
            tags,
        })
    }
}

/// Weather rows for batch prediction, in file order, labelled by their date
/// column when present.
pub fn load_prediction_weather(
    name: &str,
    path: &Path,
    delimiter: u8,
) -> Result<Vec<(Option<String>, WeatherSample)>, PipelineError> {
    let mut rows = Vec::new();
    for_each_row(name, path, delimiter, |index, record| {
        let field = |n: &str| index.field(record, n).unwrap_or("");
        let label = optional_text(field(DATE));
        rows.push((
            label,
            WeatherSample {
                temperature: coerce_number(field(TEMPERATURE)),
                precipitation: coerce_number(field(PRECIPITATION)),
                wind_speed: coerce_number(field(WIND_SPEED)),
            },
        ));
    })?;
    Ok(rows)
}
