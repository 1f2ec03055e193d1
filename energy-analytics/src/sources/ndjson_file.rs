use std::{collections::HashMap, path::PathBuf};

use async_stream::try_stream;
use energy_domain::domain::RawRecord;
use futures::Stream;
use serde_json::{Map, Value};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::normalize::{normalize_header, normalize_record, WEATHER_COLUMNS};
use crate::pipeline::{Envelope, PipelineError, Source};

/// Consolidated single-file export: one JSON object per line, keyed by the
/// same column names as the wide CSV. Blank lines are skipped.
pub struct NdjsonFileSource {
    name: String,
    path: PathBuf,
}

impl NdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(name: &str, path: P) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }
}

/// Flatten one JSON object into normalized column name → text value.
pub(crate) fn object_fields(object: Map<String, Value>) -> HashMap<String, String> {
    object
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            (normalize_header(&key), text)
        })
        .collect()
}

pub(crate) fn parse_line(name: &str, line: &str) -> Result<Map<String, Value>, PipelineError> {
    serde_json::from_str::<Map<String, Value>>(line).map_err(|e| {
        metrics::counter!("readings_parse_errors_total", "format" => "ndjson").increment(1);
        PipelineError::source_message(name, format!("failed to parse json line: {e}"))
    })
}

#[async_trait::async_trait]
impl Source<RawRecord> for NdjsonFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        let name = self.name.clone();
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::source_io(&name, &format!("failed to open {}", path.display()), &e)
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::source_io(&name, "failed to read line", &e)
            })? {
                if line.trim().is_empty() {
                    continue;
                }
                let fields = object_fields(parse_line(&name, &line)?);
                let has_weather = WEATHER_COLUMNS.iter().all(|c| fields.contains_key(*c));
                let reading = normalize_record(|n| fields.get(n).map(String::as_str), has_weather);
                yield Envelope::new(reading);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[test]
    fn flattens_numbers_and_nulls() {
        let object = parse_line(
            "merged",
            r#"{"Utility":"ELECTRICITY","ReadingWindowSum":12.5,"GrossArea":null}"#,
        )
        .unwrap();
        let fields = object_fields(object);
        assert_eq!(fields["utility"], "ELECTRICITY");
        assert_eq!(fields["readingwindowsum"], "12.5");
        assert_eq!(fields["grossarea"], "");
    }

    #[test]
    fn rejects_non_object_lines() {
        assert!(matches!(
            parse_line("merged", "[1,2,3]"),
            Err(PipelineError::SourceRead { .. })
        ));
    }

    #[tokio::test]
    async fn streams_objects_and_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"utility":"ELECTRICITY","readingtime":"2025-01-01T00:00:00","readingwindowsum":"5","simscode":"7","buildingname":"Hall A","grossarea":100,"temperature_2m":30,"precipitation":0,"wind_speed_10m":4}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"utility":"GAS","readingtime":"2025-01-01T01:00:00","readingwindowsum":2}}"#).unwrap();

        let source = NdjsonFileSource::new("merged", file.path());
        let rows: Vec<_> = source.stream().await.collect().await;

        assert_eq!(rows.len(), 2);
        let first = &rows[0].as_ref().unwrap().payload;
        assert_eq!(first.area, 100.0);
        assert_eq!(first.weather.unwrap().wind_speed, 4.0);
        let second = &rows[1].as_ref().unwrap().payload;
        assert!(second.weather.is_none());
        assert_eq!(second.energy, 2.0);
    }
}
