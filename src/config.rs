use crate::currency::{DEFAULT_RATE_BACKOFF, DEFAULT_REFERENCE_CURRENCY};
use crate::epoch::GENESIS;
use crate::table::TableFormat;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

pub const DEFAULT_DATASET_NAME: &str = "vtuber-livechat";

/// Run-scoped options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub dataset_dir: PathBuf,          // monthly tables + stats
    pub complete_dir: PathBuf,         // postprocessed (compressed) copies
    pub source_dir: PathBuf,           // collection dumps
    pub channels_path: Option<PathBuf>, // None -> <dataset_dir>/channels.csv
    pub salt: String,
    pub now: OffsetDateTime,           // injected clock
    pub genesis: OffsetDateTime,       // full-history start
    pub recent_months: Option<u32>,    // None/0 -> full history
    pub ignore_halfway: bool,          // drop the current, unfinished month
    pub start: Option<OffsetDateTime>, // explicit range start (overrides recent/genesis)
    pub end: Option<OffsetDateTime>,   // explicit range end (exclusive)
    pub format: TableFormat,
    pub matcher: Option<String>,       // glob over table file names for stats/postprocess
    pub reference_currency: String,
    pub rate_cache_dir: PathBuf,
    pub currency_api_key: Option<String>,
    pub rate_backoff: Duration,
    pub progress: bool,
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let root = PathBuf::from("./data");
        Self {
            dataset_dir: root.join(DEFAULT_DATASET_NAME),
            complete_dir: root.join(format!("{}-full", DEFAULT_DATASET_NAME)),
            source_dir: root.join("source"),
            channels_path: None,
            salt: String::new(),
            now: OffsetDateTime::now_utc(),
            genesis: GENESIS,
            recent_months: None,
            ignore_halfway: false,
            start: None,
            end: None,
            format: TableFormat::Csv,
            matcher: None,
            reference_currency: DEFAULT_REFERENCE_CURRENCY.to_string(),
            rate_cache_dir: root.join("currency_snapshot"),
            currency_api_key: None,
            rate_backoff: DEFAULT_RATE_BACKOFF,
            progress: true,
            progress_label: None,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PipelineOptions {
    /// Build from the process environment:
    ///   - `ANONYMIZATION_SALT` (required by `generate`; stats and postprocess run without it)
    ///   - `DATASET_ROOT`, `DATASET_NAME`, `DATASET_NAME_FULL`
    ///   - `VTLC_SOURCE_DIR` (collection dumps; defaults to `<root>/source`)
    ///   - `CURRENCY_API_KEY`, `VTLC_RATE_CACHE_DIR`
    pub fn from_env() -> Result<Self> {
        let salt = env_nonempty("ANONYMIZATION_SALT").unwrap_or_default();
        let root = PathBuf::from(env_nonempty("DATASET_ROOT").unwrap_or_else(|| "./data".to_string()));
        let name = env_nonempty("DATASET_NAME").unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string());
        let name_full = env_nonempty("DATASET_NAME_FULL").unwrap_or_else(|| format!("{}-full", name));
        if name_full == name {
            bail!("DATASET_NAME_FULL must differ from DATASET_NAME ({})", name);
        }

        let mut opts = Self::default()
            .with_dataset_dir(root.join(&name))
            .with_complete_dir(root.join(&name_full))
            .with_source_dir(env_nonempty("VTLC_SOURCE_DIR").map(PathBuf::from).unwrap_or_else(|| root.join("source")))
            .with_rate_cache_dir(
                env_nonempty("VTLC_RATE_CACHE_DIR").map(PathBuf::from).unwrap_or_else(|| root.join("currency_snapshot")),
            )
            .with_salt(salt);
        opts.currency_api_key = env_nonempty("CURRENCY_API_KEY");
        Ok(opts)
    }

    pub fn with_dataset_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dataset_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_complete_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.complete_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_source_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.source_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_channels_path(mut self, path: impl AsRef<Path>) -> Self {
        self.channels_path = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }
    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }
    pub fn with_genesis(mut self, genesis: OffsetDateTime) -> Self {
        self.genesis = genesis;
        self
    }
    pub fn with_recent(mut self, months: Option<u32>) -> Self {
        self.recent_months = months;
        self
    }
    pub fn with_ignore_halfway(mut self, yes: bool) -> Self {
        self.ignore_halfway = yes;
        self
    }
    pub fn with_range(mut self, start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
    pub fn with_format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }
    pub fn with_matcher(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = Some(pattern.into());
        self
    }
    pub fn with_reference_currency(mut self, code: impl Into<String>) -> Self {
        self.reference_currency = code.into();
        self
    }
    pub fn with_rate_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.rate_cache_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_currency_api_key(mut self, key: impl Into<String>) -> Self {
        self.currency_api_key = Some(key.into());
        self
    }
    pub fn with_rate_backoff(mut self, backoff: Duration) -> Self {
        self.rate_backoff = backoff;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    pub fn channels_file(&self) -> PathBuf {
        self.channels_path.clone().unwrap_or_else(|| self.dataset_dir.join("channels.csv"))
    }
}
