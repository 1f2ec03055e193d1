use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use energy_domain::domain::{RawRecord, WeatherSample};
use time::{macros::datetime, Date};

use crate::{
    pipeline::{Envelope, PipelineError, Transform},
    sources::reference_tables::BuildingMetadata,
};

/// Clear timestamps outside the sanity window [2000-01-01, 2100-01-01].
///
/// The row itself is kept: it still counts toward the totals but drops out of
/// every time-keyed aggregate. Returns whether the timestamp was cleared.
pub fn clear_out_of_range_timestamp(record: &mut RawRecord) -> bool {
    let min_ts = datetime!(2000-01-01 00:00:00);
    let max_ts = datetime!(2100-01-01 00:00:00);

    match record.ts {
        Some(ts) if ts < min_ts || ts > max_ts => {
            record.ts = None;
            true
        }
        _ => false,
    }
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<RawRecord, RawRecord> for ReadingValidation {
    async fn apply(&self, mut input: Envelope<RawRecord>) -> Result<Envelope<RawRecord>, PipelineError> {
        if clear_out_of_range_timestamp(&mut input.payload) {
            metrics::counter!("readings_timestamp_cleared_total").increment(1);
        }
        Ok(input)
    }
}

/// Completes reduced meter rows from the reference tables: name and area by
/// building code, weather by reading date.
#[derive(Clone, Default)]
pub struct ReferenceJoin {
    buildings: Arc<HashMap<String, BuildingMetadata>>,
    weather: Arc<BTreeMap<Date, WeatherSample>>,
}

impl ReferenceJoin {
    pub fn new(metadata: &[BuildingMetadata], weather: Arc<BTreeMap<Date, WeatherSample>>) -> Self {
        let mut buildings = HashMap::new();
        for row in metadata {
            if let Some(code) = &row.code {
                buildings.entry(code.clone()).or_insert_with(|| row.clone());
            }
        }
        Self {
            buildings: Arc::new(buildings),
            weather,
        }
    }

    pub fn complete(&self, record: &mut RawRecord) {
        if let Some(meta) = record.building_code.as_ref().and_then(|c| self.buildings.get(c)) {
            if record.building_name.is_none() {
                record.building_name = meta.name.clone();
            }
            if record.area <= 0.0 {
                record.area = meta.area;
            }
        }
        if record.weather.is_none() {
            record.weather = record.ts.and_then(|ts| self.weather.get(&ts.date()).copied());
        }
    }
}

#[async_trait::async_trait]
impl Transform<RawRecord, RawRecord> for ReferenceJoin {
    async fn apply(&self, mut input: Envelope<RawRecord>) -> Result<Envelope<RawRecord>, PipelineError> {
        self.complete(&mut input.payload);
        Ok(input)
    }
}
