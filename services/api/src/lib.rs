mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use fraud_sentinel::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
