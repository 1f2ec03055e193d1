//! One analytics run: validate every header, pick the reading source, stream
//! it through the pipeline and assemble the report.

use std::{sync::Arc, time::Instant};

use energy_domain::domain::{AnalyticsOutput, RawRecord, SourceRole};
use tokio::task::{spawn_blocking, JoinError};

use crate::{
    aggregate::{Aggregates, Aggregator},
    config::{AppConfig, SourceConfig},
    pipeline::{Pipeline, PipelineError, Transform},
    report::{self, SelectedSource},
    schema::{self, TableKind},
    sources::{read_columns, reference_tables::ReferenceTables, RecordSource},
    transform::{ReadingValidation, ReferenceJoin},
};

fn join_failed(e: JoinError) -> PipelineError {
    PipelineError::Transform(format!("blocking task failed: {e}"))
}

async fn header(name: &'static str, source: SourceConfig) -> Result<Result<Vec<String>, PipelineError>, JoinError> {
    spawn_blocking(move || read_columns(name, &source)).await
}

/// Validate the reference headers and choose between the primary export and
/// the reduced fallback.
///
/// An unreadable primary triggers the fallback here; one that fails while
/// streaming falls back in [`run`]. A primary that opens but lacks required
/// columns is a schema error like any other.
pub async fn select_source(cfg: &AppConfig) -> Result<SelectedSource, PipelineError> {
    let sources = &cfg.sources;
    let tags = sources.building_tags.clone();
    let (merged, premerge, metadata, weather, tags) = tokio::try_join!(
        header("merged", sources.merged.clone()),
        header("meter_premerge", sources.meter_premerge.clone()),
        header("building_metadata", sources.building_metadata.clone()),
        header("weather_daily", sources.weather_daily.clone()),
        async move {
            match tags {
                Some(source) => header("building_tags", source).await.map(Some),
                None => Ok(None),
            }
        }
    )
    .map_err(join_failed)?;

    schema::validate(TableKind::BuildingMetadata, "building_metadata", &metadata?)?;
    schema::validate(TableKind::WeatherDaily, "weather_daily", &weather?)?;
    if let Some(columns) = tags {
        schema::validate(TableKind::BuildingTags, "building_tags", &columns?)?;
    }

    match merged {
        Ok(columns) => {
            schema::validate(TableKind::Merged, "merged", &columns)?;
            schema::validate(TableKind::MeterPremerge, "meter_premerge", &premerge?)?;
            Ok(SelectedSource {
                role: SourceRole::Primary,
                name: "merged".to_string(),
                config: sources.merged.clone(),
            })
        }
        Err(e) => {
            let columns = premerge?;
            schema::validate(TableKind::MeterPremerge, "meter_premerge", &columns)?;
            Ok(fall_back(cfg, &e))
        }
    }
}

fn fall_back(cfg: &AppConfig, cause: &PipelineError) -> SelectedSource {
    metrics::counter!("source_fallback_total").increment(1);
    tracing::warn!(
        error = %cause,
        fallback = %cfg.sources.meter_premerge.path.display(),
        "primary source unreadable; running degraded on the premerge export"
    );
    SelectedSource {
        role: SourceRole::Fallback,
        name: "meter_premerge".to_string(),
        config: cfg.sources.meter_premerge.clone(),
    }
}

/// Stream one source through validation (and the reference join when
/// degraded) into a fresh aggregator.
async fn aggregate(selected: &SelectedSource, refs: &ReferenceTables) -> Result<Aggregates, PipelineError> {
    let mut transforms: Vec<Arc<dyn Transform<RawRecord, RawRecord> + Send + Sync>> =
        vec![Arc::new(ReadingValidation)];
    if selected.degraded() {
        transforms.push(Arc::new(ReferenceJoin::new(&refs.metadata, refs.weather.clone())));
    }

    tracing::info!(
        source = %selected.name,
        path = %selected.config.path.display(),
        format = selected.config.format.as_str(),
        "streaming readings"
    );
    let pipeline: Pipeline<_, RawRecord, _> = Pipeline {
        source: RecordSource::open(&selected.name, &selected.config),
        transforms,
        sink: Aggregator::new(),
    };
    pipeline.run().await?.finish()
}

pub async fn run(cfg: &AppConfig) -> Result<AnalyticsOutput, PipelineError> {
    let started = Instant::now();

    let mut selected = select_source(cfg).await?;
    let sources = cfg.sources.clone();
    let refs = spawn_blocking(move || ReferenceTables::load(&sources))
        .await
        .map_err(join_failed)??;

    // A primary that breaks mid-stream gets the same single fallback as one
    // that cannot be opened; its partial aggregates are discarded.
    let first_pass = aggregate(&selected, &refs).await;
    let aggregates = match first_pass {
        Err(e @ PipelineError::SourceRead { .. }) if !selected.degraded() => {
            selected = fall_back(cfg, &e);
            aggregate(&selected, &refs).await?
        }
        result => result?,
    };

    let output = report::assemble(aggregates, &selected, &refs, cfg);

    let elapsed = started.elapsed().as_secs_f64();
    metrics::histogram!("analytics_run_seconds").record(elapsed);
    tracing::info!(
        elapsed_secs = elapsed,
        buildings = output.buildings.len(),
        degraded = output.source.degraded,
        model = output.weather_model.is_some(),
        "analytics run complete"
    );
    Ok(output)
}
