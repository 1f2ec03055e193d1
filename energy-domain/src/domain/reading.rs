use serde::Serialize;
use time::PrimitiveDateTime;

/// Daily or hourly weather observation attached to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSample {
    pub temperature: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
}

/// One source row after normalization.
///
/// Readings are consumed by the aggregator as they stream past and are never
/// collected into a full set.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub utility: String,
    /// Wall-clock reading time; `None` when the timestamp was blank or unparseable.
    pub ts: Option<PrimitiveDateTime>,
    pub energy: f64,
    pub building_code: Option<String>,
    pub building_name: Option<String>,
    pub area: f64,
    /// `None` only when the source carries no weather columns at all.
    pub weather: Option<WeatherSample>,
}

impl RawRecord {
    pub fn is_electricity(&self) -> bool {
        is_electricity_label(&self.utility)
    }
}

const ELECTRICITY_TOKENS: [&str; 3] = ["ELECTRICITY", "ELECTRIC", "ELEC"];

/// Case-insensitive substring match of a utility label against the electricity tokens.
pub fn is_electricity_label(label: &str) -> bool {
    let upper = label.to_uppercase();
    ELECTRICITY_TOKENS.iter().any(|token| upper.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electricity_labels_match_case_insensitively() {
        assert!(is_electricity_label("ELECTRICITY"));
        assert!(is_electricity_label("electric"));
        assert!(is_electricity_label("Elec Demand"));
        assert!(!is_electricity_label("STEAM"));
        assert!(!is_electricity_label("CHILLED WATER"));
        assert!(!is_electricity_label(""));
    }
}
