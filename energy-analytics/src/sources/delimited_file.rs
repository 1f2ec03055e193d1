use std::{
    fs::File,
    path::{Path, PathBuf},
};

use csv::StringRecord;
use energy_domain::domain::RawRecord;
use futures::Stream;

use super::normalize::{normalize_record, ColumnIndex, WEATHER_COLUMNS};
use crate::pipeline::{Envelope, PipelineError, Source};

/// Delimited-text source for meter readings (comma `.csv` or pipe `.dat`).
///
/// Columns are located by normalized header name, so column order and
/// header casing may vary between exports. Rows are read lossily as UTF-8;
/// latin-1 building names survive with replacement characters instead of
/// aborting the run.
pub struct DelimitedFileSource {
    name: String,
    path: PathBuf,
    delimiter: u8,
}

impl DelimitedFileSource {
    pub fn new<P: Into<PathBuf>>(name: &str, path: P, delimiter: u8) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            delimiter,
        }
    }

    fn format_label(&self) -> &'static str {
        if self.delimiter == b'|' {
            "dat"
        } else {
            "csv"
        }
    }
}

/// Open a delimited file and return its reader plus the lossily decoded header row.
pub(crate) fn open_reader(
    name: &str,
    path: &Path,
    delimiter: u8,
) -> Result<(csv::Reader<File>, StringRecord), PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::source_io(name, &format!("failed to open {}", path.display()), &e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file);
    let headers = rdr
        .byte_headers()
        .map_err(|e| PipelineError::source_csv(name, "failed to read headers", &e))?
        .clone();
    Ok((rdr, StringRecord::from_byte_record_lossy(headers)))
}

#[async_trait::async_trait]
impl Source<RawRecord> for DelimitedFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        // Blocking csv reads inside one task: rows are pulled one at a time,
        // so the file is never materialized.
        let name = self.name.clone();
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let format = self.format_label();
        let s = async_stream::try_stream! {
            let (mut rdr, headers) = open_reader(&name, &path, delimiter)?;
            let index = ColumnIndex::from_headers(headers.iter());
            let has_weather = index.contains_all(&WEATHER_COLUMNS);
            tracing::debug!(source = %name, path = %path.display(), has_weather, "streaming delimited source");

            for result in rdr.byte_records() {
                let record = match result {
                    Ok(r) => StringRecord::from_byte_record_lossy(r),
                    Err(e) => {
                        metrics::counter!("readings_parse_errors_total", "format" => format).increment(1);
                        Err(PipelineError::source_csv(&name, "failed to read record", &e))?
                    }
                };

                let reading = normalize_record(|n| index.field(&record, n), has_weather);
                yield Envelope::new(reading);
            }
        };

        Box::pin(s)
    }
}
