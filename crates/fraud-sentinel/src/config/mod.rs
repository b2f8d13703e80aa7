use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub project_name: String,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub sink: SinkConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));
        let project_name = var_or("PROJECT_NAME", "Credit Card Fraud Detector API");

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "8000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");
        let log_format = LogFormat::from_str(&var_or("APP_LOG_FORMAT", "compact"));

        let input_dim = optional_var("MODEL_INPUT_DIM").or_else(|| optional_var("NUMBER_FEATURES"));
        let input_dim = match input_dim {
            Some(raw) => parse_number::<usize>("MODEL_INPUT_DIM", &raw)?,
            None => 29,
        };
        if input_dim == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "MODEL_INPUT_DIM",
                value: "0".to_string(),
            });
        }

        let threshold_raw =
            optional_var("MODEL_THRESHOLD").ok_or(ConfigError::MissingVar("MODEL_THRESHOLD"))?;
        let threshold = parse_number::<f64>("MODEL_THRESHOLD", &threshold_raw)?;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold_raw));
        }

        let model = ModelConfig {
            input_dim,
            threshold,
            filename: var_or("MODEL_FILENAME", "autoencoder.json"),
            base_dir: var_or("APP_BASE_DIR", "fraudapp"),
            dir_path: var_or("MODEL_DIR_PATH", "models"),
            cache_root: PathBuf::from(var_or("LOCAL_FILE_STORAGE", "/tmp")),
            bucket: optional_var("GCS_BUCKET_NAME"),
        };

        let timeout_secs =
            parse_number::<u64>("INFERENCE_TIMEOUT_SECS", &var_or("INFERENCE_TIMEOUT_SECS", "60"))?;
        let storage_timeout_secs = match optional_var("STORAGE_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("STORAGE_TIMEOUT_SECS", &raw)?,
            None => timeout_secs,
        };

        let backend = StorageBackend::parse(&var_or("STORAGE_BACKEND", "gcs"))?;
        let storage = StorageConfig {
            backend,
            endpoint: var_or("STORAGE_ENDPOINT", "https://storage.googleapis.com"),
            access_token: optional_var("STORAGE_ACCESS_TOKEN"),
            local_root: PathBuf::from(var_or("LOCAL_STORAGE_ROOT", "./storage")),
            timeout: Duration::from_secs(storage_timeout_secs),
        };

        let workers = parse_number::<usize>("PIPELINE_WORKERS", &var_or("PIPELINE_WORKERS", "4"))?;
        let pipeline = PipelineConfig {
            api_url: optional_var("API_URL"),
            inference_timeout: Duration::from_secs(timeout_secs),
            workers: workers.max(1),
        };

        let sink = SinkConfig {
            table_path: PathBuf::from(var_or("SINK_TABLE_PATH", "output/predictions.jsonl")),
        };

        Ok(Self {
            environment,
            project_name,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            model,
            storage,
            pipeline,
            sink,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Scoring model artifact, its location and decision threshold.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub threshold: f64,
    pub filename: String,
    pub base_dir: String,
    pub dir_path: String,
    pub cache_root: PathBuf,
    pub bucket: Option<String>,
}

impl ModelConfig {
    /// Object path of the artifact inside its bucket.
    pub fn remote_path(&self) -> String {
        [
            self.base_dir.as_str(),
            self.dir_path.as_str(),
            self.filename.as_str(),
        ]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
    }

    /// Where the artifact lives once cached on local disk.
    pub fn local_path(&self) -> PathBuf {
        self.cache_root.join(self.remote_path())
    }

    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.bucket
            .as_deref()
            .ok_or(ConfigError::MissingVar("GCS_BUCKET_NAME"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gcs" | "http" => Ok(Self::Gcs),
            "local" | "fs" => Ok(Self::Local),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: String,
    pub access_token: Option<String>,
    pub local_root: PathBuf,
    /// Upper bound on a single storage request, body included.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Remote batch scoring endpoint; scoring runs in-process when unset.
    pub api_url: Option<String>,
    pub inference_timeout: Duration,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub table_path: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingVar(&'static str),
    InvalidNumber { name: &'static str, value: String },
    InvalidThreshold(String),
    UnknownBackend(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingVar(name) => write!(f, "{name} must be set"),
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} has an invalid numeric value '{value}'")
            }
            ConfigError::InvalidThreshold(value) => write!(
                f,
                "MODEL_THRESHOLD must be a finite, non-negative number (got '{value}')"
            ),
            ConfigError::UnknownBackend(value) => write!(
                f,
                "STORAGE_BACKEND must be 'gcs' or 'local' (got '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
