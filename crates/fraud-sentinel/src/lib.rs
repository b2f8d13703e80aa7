//! Fraud detection core: ingestion of transaction files from object storage
//! and autoencoder-based anomaly scoring.

pub mod config;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod scoring;
pub mod sink;
pub mod storage;
pub mod telemetry;

pub use config::AppConfig;
pub use error::AppError;
