//! Field-level normalization shared by every tabular source.

use std::collections::HashMap;

use energy_domain::domain::{RawRecord, WeatherSample};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date,
    OffsetDateTime, PrimitiveDateTime, Time,
};

pub const UTILITY: &str = "utility";
pub const READING_TIME: &str = "readingtime";
pub const ENERGY: &str = "readingwindowsum";
pub const BUILDING_CODE: &str = "simscode";
pub const BUILDING_NAME: &str = "buildingname";
pub const BUILDING_NUMBER: &str = "buildingnumber";
pub const BUILDING_TYPE: &str = "buildingtype";
pub const AREA: &str = "grossarea";
pub const DATE: &str = "date";
pub const TEMPERATURE: &str = "temperature_2m";
pub const PRECIPITATION: &str = "precipitation";
pub const WIND_SPEED: &str = "wind_speed_10m";

pub const WEATHER_COLUMNS: [&str; 3] = [TEMPERATURE, PRECIPITATION, WIND_SPEED];

/// Canonical column name: BOM and whitespace trimmed, lowercased, spaces and
/// hyphens folded to `_`, known aliases mapped.
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");
    let canonical = match lowered.as_str() {
        "reading_time" => READING_TIME,
        "reading_window_sum" => ENERGY,
        "sims_code" => BUILDING_CODE,
        "building_number" => BUILDING_NUMBER,
        "building_name" => BUILDING_NAME,
        "building_type" => BUILDING_TYPE,
        "gross_area" => AREA,
        _ => return lowered,
    };
    canonical.to_string()
}

/// Positions of normalized column names within a header row.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut positions = HashMap::new();
        for (idx, header) in headers.into_iter().enumerate() {
            // First occurrence wins for duplicated columns.
            positions.entry(normalize_header(header)).or_insert(idx);
        }
        Self { positions }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn contains_all(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.contains(n))
    }

    pub fn field<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        self.positions.get(name).and_then(|&idx| record.get(idx))
    }
}

/// Numeric coercion: blank, invalid and non-finite input all become `0.0`.
pub fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let parsed = if trimmed.contains(',') {
        trimmed.replace(',', "").parse::<f64>()
    } else {
        trimmed.parse::<f64>()
    };
    match parsed {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Building codes compare by their digits with leading zeros stripped
/// ("079" and "79" are the same building). Codes without digits are kept as
/// trimmed text.
pub fn normalize_building_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Some(trimmed.to_string());
    }
    let stripped = digits.trim_start_matches('0');
    Some(if stripped.is_empty() { "0" } else { stripped }.to_string())
}

/// Parse a reading timestamp into wall-clock time.
///
/// Offsets are dropped rather than converted so buckets follow the local
/// clock the meter export was written in.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(PrimitiveDateTime::new(dt.date(), dt.time()));
    }

    let base = strip_fraction_and_offset(text);
    PrimitiveDateTime::parse(base, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(base, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        })
        .or_else(|_| PrimitiveDateTime::parse(base, format_description!("[year]-[month]-[day] [hour]:[minute]")))
        .or_else(|_| PrimitiveDateTime::parse(base, format_description!("[year]-[month]-[day]T[hour]:[minute]")))
        .or_else(|_| {
            PrimitiveDateTime::parse(
                base,
                format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"),
            )
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(
                base,
                format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"),
            )
        })
        .ok()
        .or_else(|| parse_date(base).map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT)))
}

pub fn parse_date(raw: &str) -> Option<Date> {
    let text = raw.trim();
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .or_else(|_| Date::parse(text, format_description!("[month padding:none]/[day padding:none]/[year]")))
        .ok()
        .or_else(|| {
            // "2025-01-03 00:00:00" style dates from spreadsheet exports.
            text.get(..10)
                .filter(|_| text.len() > 10)
                .and_then(|head| Date::parse(head, format_description!("[year]-[month]-[day]")).ok())
        })
}

/// Cut fractional seconds and a trailing offset from `YYYY-MM-DD HH:MM:SS...`.
fn strip_fraction_and_offset(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() > 19
        && matches!(bytes[10], b' ' | b'T')
        && matches!(bytes[19], b'.' | b'+' | b'-' | b'Z' | b' ')
        && text.is_char_boundary(19)
    {
        &text[..19]
    } else {
        text
    }
}

/// Build a normalized record from a field lookup over canonical column names.
///
/// `has_weather` says whether the source carries the weather columns; when it
/// does, blank weather values coerce to zero like every other number.
pub fn normalize_record<'a, F>(field: F, has_weather: bool) -> RawRecord
where
    F: Fn(&str) -> Option<&'a str>,
{
    let number = |name: &str| field(name).map(coerce_number).unwrap_or(0.0);

    let weather = has_weather.then(|| WeatherSample {
        temperature: number(TEMPERATURE),
        precipitation: number(PRECIPITATION),
        wind_speed: number(WIND_SPEED),
    });

    RawRecord {
        utility: field(UTILITY).map(str::trim).unwrap_or_default().to_string(),
        ts: field(READING_TIME).and_then(parse_timestamp),
        energy: number(ENERGY),
        building_code: field(BUILDING_CODE)
            .or_else(|| field(BUILDING_NUMBER))
            .and_then(normalize_building_code),
        building_name: field(BUILDING_NAME).and_then(optional_text),
        area: number(AREA),
        weather,
    }
}
