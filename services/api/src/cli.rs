use crate::commands::{run_ingest, run_score, IngestArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use fraud_sentinel::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "fraud-sentinel",
    about = "Score card transactions for fraud risk and ingest new transaction files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run the ingestion pipeline over newline-delimited notifications
    Ingest(IngestArgs),
    /// Preprocess and score a local CSV file in-process
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Ingest(args) => run_ingest(args).await,
        Command::Score(args) => run_score(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["fraud-sentinel"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn score_requires_a_csv_path() {
        assert!(Cli::try_parse_from(["fraud-sentinel", "score"]).is_err());

        let cli = Cli::try_parse_from(["fraud-sentinel", "score", "--csv", "tx.csv"]).expect("parses");
        match cli.command {
            Some(Command::Score(args)) => assert_eq!(args.csv.to_str(), Some("tx.csv")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn serve_accepts_bind_overrides() {
        let cli = Cli::try_parse_from(["fraud-sentinel", "serve", "--port", "9000"]).expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(9000));
                assert!(args.host.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
