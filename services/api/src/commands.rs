use crate::infra::Services;
use clap::Args;
use fraud_sentinel::config::AppConfig;
use fraud_sentinel::error::AppError;
use fraud_sentinel::ingest::{IngestSummary, PipelineError, Preprocessor, RawTable};
use fraud_sentinel::scoring::{ModelState, ScoringError, TransactionStatus};
use fraud_sentinel::sink::{build_records, MemorySink, RecordSink};
use fraud_sentinel::telemetry;
use futures::stream::{self, Stream};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

#[derive(Args, Debug, Default)]
pub(crate) struct IngestArgs {
    /// File with one notification JSON per line (defaults to stdin)
    #[arg(long)]
    pub(crate) input: Option<PathBuf>,
    /// Override the number of files processed concurrently
    #[arg(long)]
    pub(crate) workers: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Transaction CSV with a header row
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

pub(crate) async fn run_ingest(args: IngestArgs) -> Result<(), AppError> {
    let IngestArgs { input, workers } = args;
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let services = Services::build(&config)?;
    if Services::needs_local_model(&config) {
        load_model(&services, &config).await?;
    }

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let workers = workers.unwrap_or(config.pipeline.workers);
    let summary = services
        .pipeline
        .clone()
        .run_stream(notification_lines(reader), workers)
        .await;

    render_summary(&summary, &config);
    Ok(())
}

pub(crate) async fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let services = Services::build(&config)?;
    load_model(&services, &config).await?;

    let bytes = tokio::fs::read(&args.csv).await?;
    let table = RawTable::from_reader(bytes.as_slice()).map_err(PipelineError::from)?;
    let batch = Preprocessor::new(config.model.input_dim)
        .transform(&table)
        .map_err(PipelineError::from)?;
    if batch.vectors.is_empty() {
        println!("{} has no rows to score", args.csv.display());
        return Ok(());
    }

    let engine = services.engine.clone();
    let vectors = batch.vectors.clone();
    let predictions = tokio::task::spawn_blocking(move || engine.score_batch(&vectors))
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;

    let filename = file_name(&args.csv);
    let records = build_records(&filename, chrono::Utc::now(), &batch.vectors, &predictions)
        .map_err(PipelineError::from)?;
    let sink = MemorySink::new();
    sink.append(&records).await.map_err(PipelineError::from)?;

    let flagged = records
        .iter()
        .filter(|record| record.status == TransactionStatus::FraudRisk)
        .count();
    println!("Scored {} with threshold {}", filename, config.model.threshold);
    for record in sink.records() {
        println!(
            "  {:<32} {:>12.6}  {}",
            record.transaction_id,
            record.autoencoder_error,
            record.status.label()
        );
    }
    println!("{} of {} transactions flagged", flagged, records.len());

    Ok(())
}

async fn load_model(services: &Services, config: &AppConfig) -> Result<(), AppError> {
    let cache = services.model_cache(config)?;
    match services.model.initialize(&cache).await {
        ModelState::Loaded => Ok(()),
        state => Err(ScoringError::ModelUnavailable { state }.into()),
    }
}

/// Non-empty lines of `reader`, one payload per line.
fn notification_lines<R>(reader: R) -> impl Stream<Item = Vec<u8>> + Send
where
    R: AsyncRead + Unpin + Send,
{
    let lines = BufReader::new(reader).lines();
    stream::unfold(lines, |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some((line.into_bytes(), lines)),
                Ok(None) => return None,
                Err(err) => {
                    warn!(error = %err, "stopped reading notifications");
                    return None;
                }
            }
        }
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn render_summary(summary: &IngestSummary, config: &AppConfig) {
    println!("Ingestion summary ({} notifications)", summary.total());
    println!(
        "- {} files written ({} records) to {}",
        summary.written,
        summary.records,
        config.sink.table_path.display()
    );
    println!("- {} ignored | {} not found | {} empty", summary.ignored, summary.not_found, summary.empty);
    println!("- {} dropped on inference failure | {} aborted", summary.dropped, summary.aborted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let input: &[u8] = b"{\"a\":1}\n\n   \n{\"b\":2}\n";
        let lines: Vec<Vec<u8>> = notification_lines(input).collect().await;

        assert_eq!(lines, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn file_name_drops_directories() {
        assert_eq!(file_name(Path::new("/data/in/tx.csv")), "tx.csv");
    }
}
