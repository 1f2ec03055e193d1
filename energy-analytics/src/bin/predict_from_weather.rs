use anyhow::{bail, Result};
use energy_analytics::{
    config::{AppConfig, SourceConfig, SourceFormat},
    observability, runner,
    schema::{self, TableKind},
    sources::{read_columns, reference_tables::load_prediction_weather},
};
use std::{env, fs, path::PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: predict_from_weather <weather_csv> [out_csv]");
    }
    let weather = SourceConfig {
        path: PathBuf::from(&args[1]),
        format: SourceFormat::Csv,
    };
    let out_path = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("data/predictions.csv"));

    // Validate the prediction input before paying for a full run.
    let columns = read_columns("prediction_weather", &weather)?;
    schema::validate(TableKind::PredictionWeather, "prediction_weather", &columns)?;
    let rows = load_prediction_weather("prediction_weather", &weather.path, weather.format.delimiter())?;

    let cfg = AppConfig::load()?;
    let output = runner::run(&cfg).await?;
    let Some(model) = output.weather_model else {
        bail!("no weather model could be fitted on the configured sources; nothing to predict with");
    };

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(&out_path)?;
    wtr.write_record(["date", "predicted_energy"])?;
    for (i, (label, sample)) in rows.iter().enumerate() {
        let label = label.clone().unwrap_or_else(|| (i + 1).to_string());
        wtr.write_record([label, format!("{:.3}", model.predict(sample))])?;
    }
    wtr.flush()?;

    tracing::info!(rows = rows.len(), path = %out_path.display(), "predictions written");
    Ok(())
}
