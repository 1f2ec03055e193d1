//! Required-column checks, run against headers before any source is streamed.

use crate::{pipeline::PipelineError, sources::normalize::normalize_header};

/// The named tables the pipeline knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Wide meter+building+weather export (primary).
    Merged,
    /// Meter-only export used as the fallback primary.
    MeterPremerge,
    BuildingMetadata,
    WeatherDaily,
    BuildingTags,
    /// Weather input for batch prediction.
    PredictionWeather,
}

impl TableKind {
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Merged => &[
                "utility",
                "readingtime",
                "readingwindowsum",
                "simscode",
                "buildingname",
                "grossarea",
                "temperature_2m",
                "precipitation",
                "wind_speed_10m",
            ],
            Self::MeterPremerge => &["simscode", "utility", "readingtime", "readingwindowsum"],
            Self::BuildingMetadata => &["buildingnumber", "buildingname", "grossarea"],
            Self::WeatherDaily => &["date", "temperature_2m", "precipitation", "wind_speed_10m"],
            Self::BuildingTags => &["buildingnumber", "buildingtype"],
            Self::PredictionWeather => &["temperature_2m", "precipitation", "wind_speed_10m"],
        }
    }
}

/// Required columns of `kind` absent from `columns`, in roster order.
///
/// Matching is case-insensitive and ignores a leading byte-order mark.
pub fn missing_columns<S: AsRef<str>>(kind: TableKind, columns: &[S]) -> Vec<String> {
    let found: Vec<String> = columns.iter().map(|c| normalize_header(c.as_ref())).collect();
    kind.required_columns()
        .iter()
        .filter(|required| !found.iter().any(|f| f == *required))
        .map(|required| required.to_string())
        .collect()
}

pub fn validate<S: AsRef<str>>(
    kind: TableKind,
    source_name: &str,
    columns: &[S],
) -> Result<(), PipelineError> {
    let missing = missing_columns(kind, columns);
    if missing.is_empty() {
        return Ok(());
    }

    metrics::counter!("schema_validation_failures_total", "source" => source_name.to_string())
        .increment(1);
    Err(PipelineError::Schema {
        source_name: source_name.to_string(),
        missing,
        found: columns.iter().map(|c| c.as_ref().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERGED_WITHOUT_AREA: [&str; 8] = [
        "utility",
        "readingtime",
        "readingwindowsum",
        "simscode",
        "buildingname",
        "temperature_2m",
        "precipitation",
        "wind_speed_10m",
    ];

    #[test]
    fn reports_exactly_the_missing_area_column() {
        assert_eq!(
            missing_columns(TableKind::Merged, &MERGED_WITHOUT_AREA),
            vec!["grossarea".to_string()]
        );
    }

    #[test]
    fn matches_case_insensitively_after_bom() {
        let cols = ["\u{feff}SIMSCODE", "Utility", " ReadingTime ", "Reading Window Sum"];
        assert!(missing_columns(TableKind::MeterPremerge, &cols).is_empty());
    }

    #[test]
    fn validate_returns_schema_error_with_found_columns() {
        let err = validate(TableKind::Merged, "merged", &MERGED_WITHOUT_AREA).unwrap_err();
        match err {
            PipelineError::Schema {
                source_name,
                missing,
                found,
            } => {
                assert_eq!(source_name, "merged");
                assert_eq!(missing, vec!["grossarea".to_string()]);
                assert_eq!(found.len(), MERGED_WITHOUT_AREA.len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_header_misses_everything() {
        let cols: [&str; 0] = [];
        assert_eq!(
            missing_columns(TableKind::WeatherDaily, &cols),
            vec!["date", "temperature_2m", "precipitation", "wind_speed_10m"]
        );
    }
}
