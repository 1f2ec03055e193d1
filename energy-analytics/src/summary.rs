//! Derived views over the finished aggregates: per-building consumption,
//! monthly series, month-over-month changes and the campus KPIs.

use std::collections::{BTreeMap, HashMap};

use energy_domain::domain::{
    date_label, hour_label, BuildingConsumptionSummary, BuildingMonthSeries, CampusKpis, DayPoint,
    HourPoint, MomChange, MonthPoint, PeakDemand, UtilityMonthPoint, WeatherSample, YearMonth,
};
use time::{Date, PrimitiveDateTime};

use crate::{aggregate::bucket::Bucket, registry::BuildingRegistry, stats};

/// Energy per unit floor area; zero when the area is unknown.
pub fn intensity(total_energy: f64, area: f64) -> f64 {
    if area > 0.0 {
        total_energy / area
    } else {
        0.0
    }
}

/// One summary per registered building, largest consumers first.
pub fn consumption_summaries(
    registry: &BuildingRegistry,
    series: &[BuildingMonthSeries],
    readings: &HashMap<String, u64>,
) -> Vec<BuildingConsumptionSummary> {
    let totals: HashMap<&str, f64> = series
        .iter()
        .map(|s| (s.building.as_str(), s.points.iter().map(|p| p.energy).sum()))
        .collect();

    let mut out: Vec<_> = registry
        .buildings()
        .map(|b| {
            let total_energy = totals.get(b.name.as_str()).copied().unwrap_or(0.0);
            let count = readings.get(&b.name).copied().unwrap_or(0);
            BuildingConsumptionSummary {
                building: b.name.clone(),
                building_type: b.building_type,
                area: b.area,
                total_energy,
                average_hourly: if count > 0 { total_energy / count as f64 } else { 0.0 },
                intensity: intensity(total_energy, b.area),
            }
        })
        .collect();
    out.sort_by(|a, b| b.total_energy.total_cmp(&a.total_energy).then_with(|| a.building.cmp(&b.building)));
    out
}

/// Group `(building, month)` totals into per-building chronological series.
pub fn building_month_series(monthly: &BTreeMap<(String, YearMonth), f64>) -> Vec<BuildingMonthSeries> {
    let mut out: Vec<BuildingMonthSeries> = Vec::new();
    // Map order is (building, month), so each building's months arrive sorted.
    for ((building, month), energy) in monthly {
        let point = MonthPoint { month: *month, energy: *energy };
        match out.last_mut() {
            Some(series) if series.building == *building => series.points.push(point),
            _ => out.push(BuildingMonthSeries {
                building: building.clone(),
                points: vec![point],
            }),
        }
    }
    out
}

pub fn utility_month_points(monthly: &BTreeMap<(String, YearMonth), f64>) -> Vec<UtilityMonthPoint> {
    monthly
        .iter()
        .map(|((utility, month), energy)| UtilityMonthPoint {
            utility: utility.clone(),
            month: *month,
            energy: *energy,
        })
        .collect()
}

/// Changes between consecutive months present in each series.
pub fn mom_changes(series: &[BuildingMonthSeries]) -> Vec<MomChange> {
    series
        .iter()
        .flat_map(|s| {
            s.points.windows(2).map(move |w| {
                let (prev, cur) = (w[0].energy, w[1].energy);
                let change = cur - prev;
                MomChange {
                    building: s.building.clone(),
                    month: w[1].month,
                    previous: prev,
                    current: cur,
                    change,
                    change_pct: (prev != 0.0).then(|| change / prev * 100.0),
                }
            })
        })
        .collect()
}

pub fn hourly_points(hourly: &BTreeMap<PrimitiveDateTime, Bucket>) -> Vec<HourPoint> {
    hourly
        .iter()
        .map(|(hour, bucket)| HourPoint {
            hour: hour_label(*hour),
            energy: bucket.energy,
        })
        .collect()
}

/// Daily series with mean weather; days whose rows carried no weather use the
/// daily weather table instead.
pub fn daily_points(
    daily: &BTreeMap<Date, Bucket>,
    weather_daily: &BTreeMap<Date, WeatherSample>,
) -> Vec<DayPoint> {
    daily
        .iter()
        .map(|(date, bucket)| {
            let weather = bucket.weather().or_else(|| weather_daily.get(date).copied());
            DayPoint {
                date: date_label(*date),
                energy: bucket.energy,
                temperature: weather.map(|w| w.temperature),
                precipitation: weather.map(|w| w.precipitation),
                wind_speed: weather.map(|w| w.wind_speed),
                coverage: bucket.rows,
            }
        })
        .collect()
}

pub fn campus_kpis(
    hourly: &BTreeMap<PrimitiveDateTime, Bucket>,
    days: &[DayPoint],
    building_count: usize,
) -> CampusKpis {
    let total_energy: f64 = days.iter().map(|d| d.energy).sum();
    let peak_demand = hourly
        .iter()
        .max_by(|a, b| a.1.energy.total_cmp(&b.1.energy))
        .map(|(hour, bucket)| PeakDemand {
            hour: hour_label(*hour),
            energy: bucket.energy,
        });

    let (temps, energies): (Vec<f64>, Vec<f64>) = days
        .iter()
        .filter_map(|d| Some((d.temperature?, d.energy)))
        .unzip();

    CampusKpis {
        total_energy,
        peak_demand,
        average_daily_energy: if days.is_empty() { 0.0 } else { total_energy / days.len() as f64 },
        building_count,
        weather_correlation: stats::pearson(&temps, &energies),
    }
}
