use crate::anonymize::Anonymizer;
use crate::channels::ChannelRegistry;
use crate::config::PipelineOptions;
use crate::date::YearMonth;
use crate::epoch::EpochTable;
use crate::error::RecordError;
use crate::mem::{window_checkpoint, LOW_MEMORY_THRESHOLD};
use crate::paths::{TableKind, BAN_EVENTS, DELETION_EVENTS};
use crate::progress::maybe_progress;
use crate::rows::{BanRow, ChatRow, DeletionRow, SuperchatRow};
use crate::source::{DocumentSource, BAN_ACTIONS, CHATS, DELETE_ACTIONS};
use crate::table::{Table, TableFormat, TableWriter};
use crate::transform::{SkipReason, Transformed, Transformer};
use crate::util::init_tracing_once;
use crate::window::{MonthWindow, Windows};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

/// Entry point of the dataset pipeline. Cheap to clone; every run reads its
/// settings from the wrapped `PipelineOptions`.
#[derive(Clone, Default)]
pub struct Vtlc {
    pub(crate) opts: PipelineOptions,
}

/// Counters reported by `generate`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub windows: u64,
    pub chats: u64,
    pub superchats: u64,
    pub empty_bodies: u64,
    pub untrusted_superchats: u64,
    pub malformed: u64,
    pub bans: u64,
    pub deletions: u64,
    pub files: Vec<PathBuf>,
}

/// Per-window counters (also folded into `GenerateSummary`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowSummary {
    pub chats: u64,
    pub superchats: u64,
    pub empty_bodies: u64,
    pub untrusted_superchats: u64,
    pub malformed: u64,
}

impl Vtlc {
    pub fn new() -> Self {
        Self { opts: PipelineOptions::default() }
    }

    pub fn from_options(opts: PipelineOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn dataset_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_dataset_dir(dir); self }
    pub fn complete_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_complete_dir(dir); self }
    pub fn source_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_source_dir(dir); self }
    pub fn channels_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_channels_path(path); self }
    pub fn salt(mut self, salt: impl Into<String>) -> Self { self.opts = self.opts.with_salt(salt); self }
    pub fn now(mut self, now: OffsetDateTime) -> Self { self.opts = self.opts.with_now(now); self }
    pub fn genesis(mut self, genesis: OffsetDateTime) -> Self { self.opts = self.opts.with_genesis(genesis); self }
    pub fn recent(mut self, months: Option<u32>) -> Self { self.opts = self.opts.with_recent(months); self }
    pub fn ignore_halfway(mut self, yes: bool) -> Self { self.opts = self.opts.with_ignore_halfway(yes); self }
    pub fn range(mut self, start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self { self.opts = self.opts.with_range(start, end); self }
    pub fn format(mut self, format: TableFormat) -> Self { self.opts = self.opts.with_format(format); self }
    pub fn matcher(mut self, pattern: impl Into<String>) -> Self { self.opts = self.opts.with_matcher(pattern); self }
    pub fn reference_currency(mut self, code: impl Into<String>) -> Self { self.opts = self.opts.with_reference_currency(code); self }
    pub fn rate_cache_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_rate_cache_dir(dir); self }
    pub fn currency_api_key(mut self, key: impl Into<String>) -> Self { self.opts = self.opts.with_currency_api_key(key); self }
    pub fn rate_backoff(mut self, backoff: Duration) -> Self { self.opts = self.opts.with_rate_backoff(backoff); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    // -------- Windows --------

    /// Month windows for this run. An explicit `range` start wins over `recent`/genesis;
    /// an explicit end wins over `now`/`ignore_halfway`.
    pub fn windows(&self) -> Windows {
        let o = &self.opts;
        let planned = Windows::plan(o.genesis, o.now, o.recent_months, o.ignore_halfway);
        let planned = match o.start {
            Some(start) => Windows::new(start, planned.limit()),
            None => planned,
        };
        match o.end {
            Some(end) => planned.until(end),
            None => planned,
        }
    }

    /// Inclusive month bounds of this run's windows (None when the range is empty).
    pub fn period_bounds(&self) -> Option<(YearMonth, YearMonth)> {
        let mut it = self.windows();
        let first = it.next()?;
        let last = it.last().unwrap_or(first);
        Some((first.period, last.period))
    }

    fn check_salt(&self) -> Result<()> {
        if self.opts.salt.is_empty() {
            bail!("anonymization salt is empty; set ANONYMIZATION_SALT or call .salt(..)");
        }
        Ok(())
    }

    // -------- Generate --------

    /// Full extraction: monthly chat/superchat tables, then the moderation tables.
    pub fn generate(&self, source: &dyn DocumentSource) -> Result<GenerateSummary> {
        init_tracing_once();
        self.check_salt()?;
        fs::create_dir_all(&self.opts.dataset_dir)
            .with_context(|| format!("create {}", self.opts.dataset_dir.display()))?;

        let mut summary = self.accumulate_chats(source)?;
        let (bans, ban_path) = self.accumulate_bans(source)?;
        let (deletions, deletion_path) = self.accumulate_deletions(source)?;
        summary.bans = bans;
        summary.deletions = deletions;
        summary.files.push(ban_path);
        summary.files.push(deletion_path);

        tracing::info!(
            windows = summary.windows,
            chats = summary.chats,
            superchats = summary.superchats,
            malformed = summary.malformed,
            bans,
            deletions,
            "generate finished"
        );
        Ok(summary)
    }

    /// Sweep the chat collection window by window.
    pub fn accumulate_chats(&self, source: &dyn DocumentSource) -> Result<GenerateSummary> {
        init_tracing_once();
        self.check_salt()?;
        fs::create_dir_all(&self.opts.dataset_dir)?;

        tracing::info!(estimated = ?source.estimated_count(CHATS)?, "# of chats");
        if let Some(n) = self.opts.recent_months.filter(|n| *n > 0) {
            tracing::info!(months = n, "only processing recent history");
        }

        let channels = ChannelRegistry::load(&self.opts.channels_file())?;
        let anonymizer = Anonymizer::new(self.opts.salt.clone());
        let epochs = EpochTable::default();
        let transformer = Transformer::new(&anonymizer, &epochs, &channels);

        let total = self.windows().count() as u64;
        let label = self.opts.progress_label.as_deref().unwrap_or("Chats: windows");
        let pb = maybe_progress(self.opts.progress, total, label);

        let mut summary = GenerateSummary::default();
        for window in self.windows() {
            let (ws, files) = self.process_window(source, &transformer, &window)?;
            summary.windows += 1;
            summary.chats += ws.chats;
            summary.superchats += ws.superchats;
            summary.empty_bodies += ws.empty_bodies;
            summary.untrusted_superchats += ws.untrusted_superchats;
            summary.malformed += ws.malformed;
            summary.files.extend(files);
            if let Some(pb) = &pb { pb.inc(1); }
            window_checkpoint(&window.period.to_string(), LOW_MEMORY_THRESHOLD);
        }
        if let Some(pb) = pb { pb.finish_with_message("chats done"); }
        Ok(summary)
    }

    /// One query `timestamp in [start, end)` over `chats`, split into `chats_<period>` and
    /// `superchats_<period>`. Superchats are recognised by their embedded `purchase`.
    pub fn process_window(
        &self,
        source: &dyn DocumentSource,
        transformer: &Transformer<'_>,
        window: &MonthWindow,
    ) -> Result<(WindowSummary, Vec<PathBuf>)> {
        let dir = &self.opts.dataset_dir;
        let format = self.opts.format;
        let write_buf = self.opts.write_buffer_bytes;
        tracing::info!(period = %window.period, start = %window.start, end = %window.end, "processing window");

        let chat_path = TableKind::Chats.path(dir, window.period, format);
        let superchat_path = TableKind::Superchats.path(dir, window.period, format);
        let mut chats = TableWriter::<ChatRow>::create(&chat_path, format, write_buf)?;
        let mut superchats = TableWriter::<SuperchatRow>::create(&superchat_path, format, write_buf)?;
        let mut ws = WindowSummary::default();

        let mut on_doc = |doc: Value| -> Result<()> {
            match transformer.chat(&doc) {
                Ok(Transformed::Chat(row)) => chats.write(&row)?,
                Ok(Transformed::Superchat(row)) => superchats.write(&row)?,
                Ok(Transformed::Skipped(SkipReason::EmptyBody)) => ws.empty_bodies += 1,
                Ok(Transformed::Skipped(SkipReason::UntrustedSuperchat)) => ws.untrusted_superchats += 1,
                Err(e) if e.is_recoverable() => {
                    ws.malformed += 1;
                    tracing::warn!(period = %window.period, id = ?doc.get("id"), error = %e, "skipping malformed chat document");
                }
                Err(e) => {
                    let ctx = format!("chat document {:?} in {}", doc.get("id"), window.period);
                    return Err(anyhow::Error::new(e).context(ctx));
                }
            }
            Ok(())
        };

        let range = Some(window.range());
        source.find(CHATS, range, &mut on_doc)?;

        ws.chats = chats.finish()?;
        ws.superchats = superchats.finish()?;
        tracing::info!(
            period = %window.period,
            chats = ws.chats,
            superchats = ws.superchats,
            empty = ws.empty_bodies,
            untrusted = ws.untrusted_superchats,
            malformed = ws.malformed,
            "window written"
        );
        Ok((ws, vec![chat_path, superchat_path]))
    }

    /// Every ban action into `ban_events`.
    pub fn accumulate_bans(&self, source: &dyn DocumentSource) -> Result<(u64, PathBuf)> {
        init_tracing_once();
        self.check_salt()?;
        tracing::info!(estimated = ?source.estimated_count(BAN_ACTIONS)?, "# of ban");
        let anonymizer = Anonymizer::new(self.opts.salt.clone());
        let (epochs, channels) = (EpochTable::default(), ChannelRegistry::default());
        let transformer = Transformer::new(&anonymizer, &epochs, &channels);
        self.accumulate_events::<BanRow>(source, BAN_ACTIONS, BAN_EVENTS, |doc| transformer.ban(doc))
    }

    /// Every delete action into `deletion_events`.
    pub fn accumulate_deletions(&self, source: &dyn DocumentSource) -> Result<(u64, PathBuf)> {
        init_tracing_once();
        self.check_salt()?;
        tracing::info!(estimated = ?source.estimated_count(DELETE_ACTIONS)?, "# of deletion");
        let anonymizer = Anonymizer::new(self.opts.salt.clone());
        let (epochs, channels) = (EpochTable::default(), ChannelRegistry::default());
        let transformer = Transformer::new(&anonymizer, &epochs, &channels);
        self.accumulate_events::<DeletionRow>(source, DELETE_ACTIONS, DELETION_EVENTS, |doc| transformer.deletion(doc))
    }

    fn accumulate_events<R: Table>(
        &self,
        source: &dyn DocumentSource,
        collection: &str,
        stem: &str,
        project: impl Fn(&Value) -> Result<R, RecordError>,
    ) -> Result<(u64, PathBuf)> {
        fs::create_dir_all(&self.opts.dataset_dir)?;
        let path = self.opts.dataset_dir.join(self.opts.format.file_name(stem));
        let mut writer = TableWriter::<R>::create(&path, self.opts.format, self.opts.write_buffer_bytes)?;
        let mut skipped = 0u64;

        source.find(collection, None, &mut |doc: Value| -> Result<()> {
            match project(&doc) {
                Ok(row) => writer.write(&row),
                Err(e) if e.is_recoverable() => {
                    skipped += 1;
                    tracing::warn!(collection, error = %e, "skipping malformed document");
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e).context(format!("{} document", collection))),
            }
        })?;

        let rows = writer.finish()?;
        tracing::info!(collection, rows, skipped, path = %path.display(), "events written");
        Ok((rows, path))
    }
}
