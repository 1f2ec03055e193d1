pub mod delimited_file;
pub mod ndjson_file;
pub mod normalize;
pub mod reference_tables;

pub use delimited_file::DelimitedFileSource;
pub use ndjson_file::NdjsonFileSource;

use std::io::{BufRead, BufReader};

use energy_domain::domain::RawRecord;
use futures::Stream;

use crate::{
    config::{SourceConfig, SourceFormat},
    pipeline::{Envelope, PipelineError, Source},
};

/// Reading source selected from configuration.
pub enum RecordSource {
    Delimited(DelimitedFileSource),
    Ndjson(NdjsonFileSource),
}

impl RecordSource {
    pub fn open(name: &str, source: &SourceConfig) -> Self {
        match source.format {
            SourceFormat::Ndjson => Self::Ndjson(NdjsonFileSource::new(name, &source.path)),
            SourceFormat::Csv | SourceFormat::Dat => Self::Delimited(DelimitedFileSource::new(
                name,
                &source.path,
                source.format.delimiter(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl Source<RawRecord> for RecordSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        match self {
            Self::Delimited(s) => s.stream().await,
            Self::Ndjson(s) => s.stream().await,
        }
    }
}

/// Read only the column names of a source, without touching its rows.
///
/// For NDJSON the keys of the first non-blank object stand in for a header.
/// Any failure to open or decode the header is a `SourceRead` error.
pub fn read_columns(name: &str, source: &SourceConfig) -> Result<Vec<String>, PipelineError> {
    match source.format {
        SourceFormat::Csv | SourceFormat::Dat => {
            let (_, headers) =
                delimited_file::open_reader(name, &source.path, source.format.delimiter())?;
            Ok(headers.iter().map(str::to_string).collect())
        }
        SourceFormat::Ndjson => {
            let file = std::fs::File::open(&source.path).map_err(|e| {
                PipelineError::source_io(name, &format!("failed to open {}", source.path.display()), &e)
            })?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| PipelineError::source_io(name, "failed to read line", &e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let object = ndjson_file::parse_line(name, &line)?;
                return Ok(object.keys().cloned().collect());
            }
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_delimited_header_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\u{feff}Utility,ReadingTime\nELECTRICITY,2025-01-01\n").unwrap();
        let cfg = SourceConfig {
            path: file.path().to_path_buf(),
            format: SourceFormat::Csv,
        };
        let cols = read_columns("merged", &cfg).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(normalize::normalize_header(&cols[0]), "utility");
    }

    #[test]
    fn reads_ndjson_keys_from_first_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\n{{\"utility\":\"GAS\",\"readingtime\":\"2025-01-01\"}}\n").unwrap();
        let cfg = SourceConfig {
            path: file.path().to_path_buf(),
            format: SourceFormat::Ndjson,
        };
        let mut cols = read_columns("merged", &cfg).unwrap();
        cols.sort();
        assert_eq!(cols, vec!["readingtime".to_string(), "utility".to_string()]);
    }

    #[test]
    fn unreadable_source_is_source_read() {
        let cfg = SourceConfig {
            path: "/no/such/file.csv".into(),
            format: SourceFormat::Csv,
        };
        assert!(matches!(
            read_columns("merged", &cfg),
            Err(PipelineError::SourceRead { .. })
        ));
    }
}
