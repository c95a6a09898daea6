use crate::services::TransferLimits;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

const MIB: u64 = 1024 * 1024;

/// Which remote backend stores chunk bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Telegram,
    Filesystem,
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <BackendKind as ValueEnum>::from_str(s, true)
            .map_err(|_| anyhow::anyhow!("unknown backend `{}`", s))
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_url: String,
    pub max_chunk_size: u64,
    pub max_object_size: u64,
    pub max_file_size: u64,
    pub temp_chunk_max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "<redacted>"),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("max_chunk_size", &self.max_chunk_size)
            .field("max_object_size", &self.max_object_size)
            .field("max_file_size", &self.max_file_size)
            .field("temp_chunk_max_age_secs", &self.temp_chunk_max_age_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Chunked cloud drive over a document-messaging backend")]
pub struct Args {
    /// Host to bind to (overrides CHUNKDRIVE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNKDRIVE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CHUNKDRIVE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Chunk backend (overrides CHUNKDRIVE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory for the filesystem backend (overrides CHUNKDRIVE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Largest chunk in bytes (overrides CHUNKDRIVE_MAX_CHUNK_SIZE)
    #[arg(long)]
    pub max_chunk_size: Option<u64>,

    /// Largest accepted file in bytes (overrides CHUNKDRIVE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read an optional variable, failing only if it is present but unusable.
fn env_opt(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env_opt(name)? {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_env_with(args)?;
        cfg.validate()?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over environment variables over defaults.
    pub fn from_env_with(args: Args) -> Result<Self> {
        let env_host = env_opt("CHUNKDRIVE_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = env_parse("CHUNKDRIVE_PORT", 3000u16)?;
        let env_db = env_opt("CHUNKDRIVE_DATABASE_URL")?
            .unwrap_or_else(|| "sqlite://./data/meta/chunkdrive.db".into());
        let env_backend = env_parse("CHUNKDRIVE_BACKEND", BackendKind::Filesystem)?;
        let env_storage =
            env_opt("CHUNKDRIVE_STORAGE_DIR")?.unwrap_or_else(|| "./data/chunks".into());
        let env_chunk = env_parse("CHUNKDRIVE_MAX_CHUNK_SIZE", 5 * MIB)?;
        let env_file = env_parse("CHUNKDRIVE_MAX_FILE_SIZE", 100 * MIB)?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            telegram_bot_token: env_opt("CHUNKDRIVE_TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: env_opt("CHUNKDRIVE_TELEGRAM_CHAT_ID")?,
            telegram_api_url: env_opt("CHUNKDRIVE_TELEGRAM_API_URL")?
                .unwrap_or_else(|| crate::blob::telegram::DEFAULT_API_URL.into()),
            max_chunk_size: args.max_chunk_size.unwrap_or(env_chunk),
            max_object_size: env_parse("CHUNKDRIVE_MAX_OBJECT_SIZE", 20 * MIB)?,
            max_file_size: args.max_file_size.unwrap_or(env_file),
            temp_chunk_max_age_secs: env_parse("CHUNKDRIVE_TEMP_CHUNK_MAX_AGE_SECS", 86_400)?,
            sweep_interval_secs: env_parse("CHUNKDRIVE_SWEEP_INTERVAL_SECS", 3_600)?,
        })
    }

    /// Reject combinations the transfer core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            bail!("max_chunk_size must be positive");
        }
        if self.max_chunk_size > self.max_object_size {
            bail!(
                "max_chunk_size ({}) exceeds the backend object limit ({})",
                self.max_chunk_size,
                self.max_object_size
            );
        }
        if self.backend == BackendKind::Telegram
            && (self.telegram_bot_token.is_none() || self.telegram_chat_id.is_none())
        {
            bail!(
                "telegram backend requires CHUNKDRIVE_TELEGRAM_BOT_TOKEN and CHUNKDRIVE_TELEGRAM_CHAT_ID"
            );
        }
        Ok(())
    }

    pub fn limits(&self) -> TransferLimits {
        TransferLimits {
            max_chunk_size: self.max_chunk_size,
            max_file_size: self.max_file_size,
        }
    }

    pub fn temp_chunk_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_chunk_max_age_secs)
    }

    /// `None` disables the periodic sweep.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
