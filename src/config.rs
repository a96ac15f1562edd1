use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

const ENV_PREFIX: &str = "BUCKET_GATEWAY_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub public_url: String,
    pub presign_secret: String,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub env: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File and bucket API over an object store")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides BUCKET_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides BUCKET_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL used in object locators (overrides BUCKET_GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret for signing download URLs (overrides BUCKET_GATEWAY_PRESIGN_SECRET)
    #[arg(long)]
    pub presign_secret: Option<String>,

    /// Per-request deadline in seconds (overrides BUCKET_GATEWAY_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Largest accepted request body (overrides BUCKET_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Deployment environment name (overrides BUCKET_GATEWAY_ENV)
    #[arg(long)]
    pub env: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args, |name| env::var(name))?, migrate))
    }

    /// Merge `args` over the variables returned by `lookup`.
    fn from_args(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let port = match args.port {
            Some(port) => port,
            None => parse_var(&var, "PORT", 8080)?,
        };
        let request_timeout_secs = match args.request_timeout_secs {
            Some(secs) => secs,
            None => parse_var(&var, "REQUEST_TIMEOUT_SECS", 30)?,
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => parse_var(&var, "MAX_UPLOAD_BYTES", 32 * 1024 * 1024)?,
        };

        let presign_secret = match args.presign_secret.or_else(|| var("PRESIGN_SECRET").ok()) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "{ENV_PREFIX}PRESIGN_SECRET not set; presigned URLs will not survive a restart"
                );
                Uuid::new_v4().simple().to_string()
            }
        };

        Ok(Self {
            host: args
                .host
                .unwrap_or_else(|| var("HOST").unwrap_or_else(|_| "0.0.0.0".into())),
            port,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| var("STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into())),
            database_url: args.database_url.unwrap_or_else(|| {
                var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://./data/meta/bucket_gateway.db".into())
            }),
            public_url: args.public_url.unwrap_or_else(|| {
                var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{}", port))
            }),
            presign_secret,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_upload_bytes,
            env: args
                .env
                .unwrap_or_else(|| var("ENV").unwrap_or_else(|_| "development".into())),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(
    var: impl Fn(&str) -> Result<String, env::VarError>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {ENV_PREFIX}{name} value `{}`", value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {ENV_PREFIX}{name}")),
    }
}
