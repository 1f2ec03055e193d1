//! Incremental aggregation of normalized readings into hour, day and month
//! buckets. Each reading is folded in as it arrives and then dropped.

pub mod bucket;
pub mod fingerprint;

use std::collections::{btree_map::Entry, BTreeMap, HashMap};

use energy_domain::domain::{hour_floor, RawRecord, YearMonth};
use futures::StreamExt;
use time::{Date, PrimitiveDateTime};

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    registry::BuildingRegistry,
};
use bucket::Bucket;
use fingerprint::DatasetFingerprint;

const MAX_UTILITY_SAMPLES: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounters {
    pub rows: u64,
    pub electricity_rows: u64,
    pub non_electricity_rows: u64,
    pub rows_without_timestamp: u64,
}

/// Sink that owns every aggregation map for one run.
#[derive(Default)]
pub struct Aggregator {
    registry: BuildingRegistry,
    hourly: BTreeMap<PrimitiveDateTime, Bucket>,
    daily: BTreeMap<Date, Bucket>,
    building_daily: BTreeMap<(String, Date), Bucket>,
    building_monthly: BTreeMap<(String, YearMonth), f64>,
    building_readings: HashMap<String, u64>,
    utility_monthly: BTreeMap<(String, YearMonth), f64>,
    utility_samples: Vec<String>,
    counters: RowCounters,
    fingerprint: DatasetFingerprint,
}

/// Finished aggregation state, read-only from here on.
pub struct Aggregates {
    pub registry: BuildingRegistry,
    /// Campus-wide, keyed by hour start.
    pub hourly: BTreeMap<PrimitiveDateTime, Bucket>,
    /// Campus-wide, keyed by date. Sparse: days without readings are absent.
    pub daily: BTreeMap<Date, Bucket>,
    /// Per building and date; the observation panel for the weather model.
    pub building_daily: BTreeMap<(String, Date), Bucket>,
    pub building_monthly: BTreeMap<(String, YearMonth), f64>,
    /// Time-keyed electricity readings per building.
    pub building_readings: HashMap<String, u64>,
    /// All utilities, not only electricity.
    pub utility_monthly: BTreeMap<(String, YearMonth), f64>,
    pub utility_samples: Vec<String>,
    pub counters: RowCounters,
    pub fingerprint: String,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> RowCounters {
        self.counters
    }

    pub fn observe(&mut self, record: &RawRecord) {
        self.counters.rows += 1;
        self.fingerprint.update(record);
        self.sample_utility(&record.utility);

        if record.ts.is_none() {
            self.counters.rows_without_timestamp += 1;
            metrics::counter!("readings_without_timestamp_total").increment(1);
        }

        if let Some(ts) = record.ts {
            let utility = if record.utility.is_empty() {
                "UNKNOWN".to_string()
            } else {
                record.utility.to_uppercase()
            };
            *self
                .utility_monthly
                .entry((utility, YearMonth::from_date(ts.date())))
                .or_default() += record.energy;
        }

        if !record.is_electricity() {
            self.counters.non_electricity_rows += 1;
            return;
        }
        self.counters.electricity_rows += 1;

        // Registration happens even for undated rows so that every building
        // seen in the export is listed.
        let building = self.registry.observe(record);
        let Some(ts) = record.ts else {
            return;
        };
        let date = ts.date();
        let weather = record.weather.as_ref();

        self.hourly.entry(hour_floor(ts)).or_default().add(record.energy, weather);
        self.daily.entry(date).or_default().add(record.energy, weather);

        if let Some(building) = building {
            *self
                .building_monthly
                .entry((building.clone(), YearMonth::from_date(date)))
                .or_default() += record.energy;
            *self.building_readings.entry(building.clone()).or_default() += 1;
            self.building_daily
                .entry((building, date))
                .or_default()
                .add(record.energy, weather);
        }
    }

    fn sample_utility(&mut self, utility: &str) {
        if self.utility_samples.len() >= MAX_UTILITY_SAMPLES
            || self.utility_samples.iter().any(|s| s == utility)
        {
            return;
        }
        self.utility_samples.push(utility.to_string());
    }

    /// Close the pass. Fails when no electricity rows were seen, since every
    /// downstream view is built on the electricity series.
    pub fn finish(self) -> Result<Aggregates, PipelineError> {
        if self.counters.electricity_rows == 0 {
            return Err(PipelineError::EmptyResult {
                samples: self.utility_samples,
            });
        }

        let registry = self.registry;
        let (building_daily, building_monthly, building_readings) = if registry.has_aliases() {
            let mut readings: HashMap<String, u64> = HashMap::new();
            for (building, n) in self.building_readings {
                *readings.entry(registry.resolve(&building).to_string()).or_default() += n;
            }
            (
                rekey(self.building_daily, &registry, |a, b| a.merge(&b)),
                rekey(self.building_monthly, &registry, |a, b| *a += b),
                readings,
            )
        } else {
            (self.building_daily, self.building_monthly, self.building_readings)
        };

        Ok(Aggregates {
            registry,
            hourly: self.hourly,
            daily: self.daily,
            building_daily,
            building_monthly,
            building_readings,
            utility_monthly: self.utility_monthly,
            utility_samples: self.utility_samples,
            counters: self.counters,
            fingerprint: self.fingerprint.finalize(),
        })
    }
}

/// Move building-keyed entries recorded under a since-merged key onto the
/// building's current key.
fn rekey<K: Ord, V>(
    map: BTreeMap<(String, K), V>,
    registry: &BuildingRegistry,
    merge: impl Fn(&mut V, V),
) -> BTreeMap<(String, K), V> {
    let mut out = BTreeMap::new();
    for ((building, k), v) in map {
        match out.entry((registry.resolve(&building).to_string(), k)) {
            Entry::Vacant(slot) => {
                slot.insert(v);
            }
            Entry::Occupied(mut slot) => merge(slot.get_mut(), v),
        }
    }
    out
}

#[async_trait::async_trait]
impl Sink<RawRecord> for Aggregator {
    async fn run<S>(&mut self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            // A malformed source ends the run; there is no partial result.
            let env = item?;
            self.observe(&env.payload);
        }

        metrics::counter!("readings_rows_total").increment(self.counters.rows);
        metrics::counter!("readings_electricity_rows_total").increment(self.counters.electricity_rows);
        metrics::counter!("readings_non_electricity_rows_total").increment(self.counters.non_electricity_rows);
        tracing::info!(
            rows = self.counters.rows,
            electricity_rows = self.counters.electricity_rows,
            rows_without_timestamp = self.counters.rows_without_timestamp,
            buildings = self.registry.len(),
            "aggregation pass complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_domain::domain::WeatherSample;
    use time::macros::{date, datetime};

    fn reading(utility: &str, ts: Option<PrimitiveDateTime>, name: &str, energy: f64) -> RawRecord {
        RawRecord {
            utility: utility.to_string(),
            ts,
            energy,
            building_code: None,
            building_name: Some(name.to_string()),
            area: 0.0,
            weather: Some(WeatherSample {
                temperature: 50.0,
                precipitation: 0.0,
                wind_speed: 5.0,
            }),
        }
    }

    #[test]
    fn hourly_totals_sum_to_daily_total() {
        let mut agg = Aggregator::new();
        for (hour, energy) in [(0u8, 10.0), (0, 2.5), (5, 7.0), (23, 1.5)] {
            let ts = PrimitiveDateTime::new(date!(2025 - 01 - 02), time::Time::from_hms(hour, 15, 0).unwrap());
            agg.observe(&reading("ELECTRICITY", Some(ts), "Hall A", energy));
            agg.observe(&reading("ELECTRICITY", Some(ts), "Lab B", energy * 2.0));
        }
        agg.observe(&reading("ELECTRICITY", Some(datetime!(2025-01-03 01:00:00)), "Hall A", 99.0));
        let out = agg.finish().unwrap();

        let day = date!(2025 - 01 - 02);
        let hourly_sum: f64 = out
            .hourly
            .iter()
            .filter(|(h, _)| h.date() == day)
            .map(|(_, b)| b.energy)
            .sum();
        assert_eq!(hourly_sum, out.daily[&day].energy);
        assert_eq!(out.daily[&day].energy, 63.0);
        assert_eq!(out.hourly.len(), 4);
    }

    #[test]
    fn undated_rows_count_but_skip_time_buckets() {
        let mut agg = Aggregator::new();
        agg.observe(&reading("ELECTRICITY", None, "Hall A", 10.0));
        agg.observe(&reading("ELECTRICITY", Some(datetime!(2025-01-01 00:00:00)), "Hall A", 4.0));
        let out = agg.finish().unwrap();

        assert_eq!(out.counters.rows, 2);
        assert_eq!(out.counters.rows_without_timestamp, 1);
        assert_eq!(out.daily.values().map(|b| b.energy).sum::<f64>(), 4.0);
        assert_eq!(out.building_readings["Hall A"], 1);
    }

    #[test]
    fn every_utility_feeds_utility_months_but_only_electricity_feeds_buildings() {
        let mut agg = Aggregator::new();
        let ts = Some(datetime!(2025-02-10 08:00:00));
        agg.observe(&reading("Electricity", ts, "Hall A", 10.0));
        agg.observe(&reading("STEAM", ts, "Hall A", 3.0));
        agg.observe(&reading("", ts, "Hall A", 1.0));
        let out = agg.finish().unwrap();

        let feb = YearMonth::new(2025, 2).unwrap();
        assert_eq!(out.utility_monthly[&("ELECTRICITY".to_string(), feb)], 10.0);
        assert_eq!(out.utility_monthly[&("STEAM".to_string(), feb)], 3.0);
        assert_eq!(out.utility_monthly[&("UNKNOWN".to_string(), feb)], 1.0);
        assert_eq!(out.building_monthly[&("Hall A".to_string(), feb)], 10.0);
        assert_eq!(out.counters.non_electricity_rows, 2);
    }

    #[test]
    fn code_only_readings_join_the_named_building() {
        let mut agg = Aggregator::new();
        let mut first = reading("ELECTRICITY", Some(datetime!(2025-01-01 00:00:00)), "unused", 10.0);
        first.building_name = None;
        first.building_code = Some("12".into());
        agg.observe(&first);

        let mut named = reading("ELECTRICITY", Some(datetime!(2025-01-01 05:00:00)), "Thompson Library", 5.0);
        named.building_code = Some("12".into());
        agg.observe(&named);

        let mut later = first.clone();
        later.ts = Some(datetime!(2025-02-01 00:00:00));
        agg.observe(&later);
        let out = agg.finish().unwrap();

        assert_eq!(out.registry.len(), 1);
        let jan = YearMonth::new(2025, 1).unwrap();
        let feb = YearMonth::new(2025, 2).unwrap();
        let library = "Thompson Library".to_string();
        assert_eq!(out.building_monthly.len(), 2);
        assert_eq!(out.building_monthly[&(library.clone(), jan)], 15.0);
        assert_eq!(out.building_monthly[&(library.clone(), feb)], 10.0);
        assert_eq!(out.building_readings.len(), 1);
        assert_eq!(out.building_readings["Thompson Library"], 3);
        let day = &out.building_daily[&(library, date!(2025 - 01 - 01))];
        assert_eq!(day.energy, 15.0);
        assert_eq!(day.rows, 2);
        assert!(out.building_daily.keys().all(|(b, _)| b == "Thompson Library"));
    }

    #[test]
    fn days_without_rows_are_absent() {
        let mut agg = Aggregator::new();
        agg.observe(&reading("ELECTRICITY", Some(datetime!(2025-01-01 00:00:00)), "Hall A", 1.0));
        agg.observe(&reading("ELECTRICITY", Some(datetime!(2025-01-04 00:00:00)), "Hall A", 1.0));
        let out = agg.finish().unwrap();
        assert_eq!(out.daily.len(), 2);
    }

    #[test]
    fn no_electricity_is_an_empty_result_with_samples() {
        let mut agg = Aggregator::new();
        let ts = Some(datetime!(2025-01-01 00:00:00));
        for utility in ["STEAM", "CHILLED WATER", "STEAM", "NATURAL GAS"] {
            agg.observe(&reading(utility, ts, "Plant", 1.0));
        }
        match agg.finish() {
            Err(PipelineError::EmptyResult { samples }) => {
                assert_eq!(samples, vec!["STEAM", "CHILLED WATER", "NATURAL GAS"]);
            }
            other => panic!("expected EmptyResult, got {:?}", other.err()),
        }
    }

    #[test]
    fn utility_samples_are_capped() {
        let mut agg = Aggregator::new();
        for i in 0..40 {
            agg.observe(&reading(&format!("METER-{i}"), None, "X", 1.0));
        }
        assert_eq!(agg.utility_samples.len(), MAX_UTILITY_SAMPLES);
        assert_eq!(agg.counters().rows, 40);
    }
}
