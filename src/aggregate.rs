//! Per-channel-per-month statistics over the monthly tables.
//! Implement `Aggregator` for a row type and run it over one month with `aggregate_table`.

use crate::currency::{CurrencyNormalizer, HttpRateProvider, RateCache, RateProvider};
use crate::date::{parse_rfc3339, YearMonth};
use crate::paths::{find_table, plan_tables, MonthlyTable, TableKind, BAN_EVENTS, CHAT_STATS, DELETION_EVENTS, SUPERCHAT_STATS};
use crate::pipeline::Vtlc;
use crate::progress::maybe_progress;
use crate::rows::{BanRow, ChatRow, ChatStatRow, DeletionRow, SuperchatRow, SuperchatStatRow};
use crate::table::{read_rows, TableFormat, TableWriter};
use crate::util::init_tracing_once;
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Group-by reduction over the rows of one monthly table.
pub trait Aggregator<R>: Default {
    type Output;
    fn ingest(&mut self, row: &R);
    /// Fold another partial result for the same period into `self`.
    fn merge(&mut self, other: Self);
    /// One output row per channel, stamped with `period`.
    fn finish(self, period: YearMonth) -> Vec<Self::Output>;
}

/// Feed every row of `path` into a fresh `A`.
pub fn aggregate_table<R, A>(path: &Path) -> Result<A>
where
    R: DeserializeOwned,
    A: Aggregator<R>,
{
    let mut agg = A::default();
    read_rows::<R>(path, |row| {
        agg.ingest(&row);
        Ok(())
    })?;
    Ok(agg)
}

/// Aggregate several tables of one period (e.g. split exports) into one result.
pub fn aggregate_tables<R, A>(paths: &[PathBuf]) -> Result<A>
where
    R: DeserializeOwned,
    A: Aggregator<R>,
{
    let mut total = A::default();
    for path in paths {
        let part = aggregate_table::<R, A>(path).with_context(|| format!("aggregate {}", path.display()))?;
        total.merge(part);
    }
    Ok(total)
}

fn merge_sets(into: &mut AHashSet<String>, from: AHashSet<String>) {
    if into.len() < from.len() {
        let small = std::mem::replace(into, from);
        into.extend(small);
    } else {
        into.extend(from);
    }
}

#[derive(Default)]
struct ChatTally {
    chats: u64,
    member_chats: u64,
    chatters: AHashSet<String>,
    members: AHashSet<String>,
}

/// Chat counts keyed by origin channel.
#[derive(Default)]
pub struct ChatAggregator {
    by_channel: AHashMap<String, ChatTally>,
}

impl Aggregator<ChatRow> for ChatAggregator {
    type Output = ChatStatRow;

    fn ingest(&mut self, row: &ChatRow) {
        let t = self.by_channel.entry(row.origin_channel_id.clone()).or_default();
        t.chats += 1;
        if !t.chatters.contains(&row.channel_id) {
            t.chatters.insert(row.channel_id.clone());
        }
        if row.is_member() {
            t.member_chats += 1;
            if !t.members.contains(&row.channel_id) {
                t.members.insert(row.channel_id.clone());
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (channel, t) in other.by_channel {
            let into = self.by_channel.entry(channel).or_default();
            into.chats += t.chats;
            into.member_chats += t.member_chats;
            merge_sets(&mut into.chatters, t.chatters);
            merge_sets(&mut into.members, t.members);
        }
    }

    fn finish(self, period: YearMonth) -> Vec<ChatStatRow> {
        let period = period.to_string();
        self.by_channel
            .into_iter()
            .map(|(channel_id, t)| ChatStatRow {
                channel_id,
                period: period.clone(),
                chats: t.chats,
                member_chats: t.member_chats,
                unique_chatters: t.chatters.len() as u64,
                unique_members: t.members.len() as u64,
                banned_chatters: 0,
                deleted_chats: 0,
            })
            .collect()
    }
}

/// A superchat with its amount already converted to the reference currency.
#[derive(Clone, Debug, PartialEq)]
pub struct PricedSuperchat {
    pub origin_channel_id: String,
    pub channel_id: String,
    pub amount: i64,
}

#[derive(Default)]
struct SuperchatTally {
    count: u64,
    total: i64,
    supporters: AHashSet<String>,
}

#[derive(Default)]
pub struct SuperchatAggregator {
    by_channel: AHashMap<String, SuperchatTally>,
}

impl Aggregator<PricedSuperchat> for SuperchatAggregator {
    type Output = SuperchatStatRow;

    fn ingest(&mut self, sc: &PricedSuperchat) {
        let t = self.by_channel.entry(sc.origin_channel_id.clone()).or_default();
        t.count += 1;
        t.total += sc.amount;
        if !t.supporters.contains(&sc.channel_id) {
            t.supporters.insert(sc.channel_id.clone());
        }
    }

    fn merge(&mut self, other: Self) {
        for (channel, t) in other.by_channel {
            let into = self.by_channel.entry(channel).or_default();
            into.count += t.count;
            into.total += t.total;
            merge_sets(&mut into.supporters, t.supporters);
        }
    }

    fn finish(self, period: YearMonth) -> Vec<SuperchatStatRow> {
        let period = period.to_string();
        self.by_channel
            .into_iter()
            .map(|(channel_id, t)| SuperchatStatRow {
                channel_id,
                period: period.clone(),
                super_chats: t.count,
                unique_super_chatters: t.supporters.len() as u64,
                total_sc: t.total,
                average_sc: if t.count == 0 { 0 } else { (t.total as f64 / t.count as f64).round() as i64 },
            })
            .collect()
    }
}

#[derive(Default)]
struct ModerationTally {
    banned: AHashSet<String>,
    deleted: u64,
}

/// Ban/deletion counts keyed by `(originChannelId, period)`, joined onto chat stats.
#[derive(Default)]
pub struct ModerationIndex {
    by_key: AHashMap<(String, YearMonth), ModerationTally>,
    undated: u64,
}

impl ModerationIndex {
    /// Read `ban_events` and `deletion_events` from `dir` (either may be absent).
    pub fn load(dir: &Path) -> Result<Self> {
        let mut idx = Self::default();
        if let Some(path) = find_table(dir, BAN_EVENTS) {
            read_rows::<BanRow>(&path, |row| {
                idx.ingest_ban(&row);
                Ok(())
            })?;
        }
        if let Some(path) = find_table(dir, DELETION_EVENTS) {
            read_rows::<DeletionRow>(&path, |row| {
                idx.ingest_deletion(&row);
                Ok(())
            })?;
        }
        if idx.undated > 0 {
            tracing::info!(undated = idx.undated, "moderation events without timestamp are not joined");
        }
        Ok(idx)
    }

    fn tally(&mut self, channel: &str, timestamp: &str) -> Option<&mut ModerationTally> {
        let Some(ts) = parse_rfc3339(timestamp) else {
            self.undated += 1;
            return None;
        };
        Some(self.by_key.entry((channel.to_string(), YearMonth::containing(ts))).or_default())
    }

    pub fn ingest_ban(&mut self, row: &BanRow) {
        if let Some(t) = self.tally(&row.origin_channel_id, &row.timestamp) {
            t.banned.insert(row.channel_id.clone());
        }
    }

    /// Retracted deletions (the author took the message back) are not counted.
    pub fn ingest_deletion(&mut self, row: &DeletionRow) {
        if row.retracted != 0 {
            return;
        }
        if let Some(t) = self.tally(&row.origin_channel_id, &row.timestamp) {
            t.deleted += 1;
        }
    }

    /// `(bannedChatters, deletedChats)`; zero when nothing was recorded.
    pub fn get(&self, channel: &str, period: YearMonth) -> (u64, u64) {
        self.by_key
            .get(&(channel.to_string(), period))
            .map(|t| (t.banned.len() as u64, t.deleted))
            .unwrap_or((0, 0))
    }

    pub fn undated(&self) -> u64 {
        self.undated
    }
}

/// Counters reported by `stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub chat_months: u64,
    pub superchat_months: u64,
    pub chat_rows: u64,
    pub superchat_rows: u64,
    pub rate_fetches: u64,
    pub files: Vec<PathBuf>,
}

impl Vtlc {
    fn table_matcher(&self) -> Result<Option<glob::Pattern>> {
        self.opts
            .matcher
            .as_deref()
            .map(|p| glob::Pattern::new(p).with_context(|| format!("invalid matcher `{}`", p)))
            .transpose()
    }

    /// Build `chat_stats.csv` and `superchat_stats.csv` with the HTTP rate provider
    /// and the on-disk rate cache from the options.
    pub fn stats(&self) -> Result<StatsSummary> {
        let provider = HttpRateProvider::new(self.opts.currency_api_key.clone().unwrap_or_default())?;
        let cache = RateCache::load(&self.opts.rate_cache_dir)?;
        let mut normalizer = CurrencyNormalizer::new(provider, cache, self.opts.reference_currency.clone())
            .backoff(self.opts.rate_backoff);
        self.stats_with(&mut normalizer)
    }

    /// Same as `stats`, with a caller-provided normalizer. The rate cache is flushed
    /// after the superchat tables are converted, even when a conversion fails.
    pub fn stats_with<P: RateProvider>(&self, normalizer: &mut CurrencyNormalizer<P>) -> Result<StatsSummary> {
        init_tracing_once();
        let dir = &self.opts.dataset_dir;
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

        let matcher = self.table_matcher()?;
        let (start, end) = match self.period_bounds() {
            Some((s, e)) => (Some(s), Some(e)),
            None => {
                tracing::warn!("empty window range; no monthly tables to aggregate");
                return Ok(StatsSummary::default());
            }
        };
        let mut summary = StatsSummary::default();

        // chats + moderation
        let moderation = ModerationIndex::load(dir)?;
        let chat_tables = plan_tables(dir, TableKind::Chats, start, end, matcher.as_ref())?;
        let pb = maybe_progress(self.opts.progress, chat_tables.len() as u64, "Stats: chats");
        let mut chat_rows: Vec<ChatStatRow> = Vec::new();
        for table in &chat_tables {
            let agg = aggregate_tables::<ChatRow, ChatAggregator>(std::slice::from_ref(&table.path))?;
            for mut row in agg.finish(table.ym) {
                let (banned, deleted) = moderation.get(&row.channel_id, table.ym);
                row.banned_chatters = banned;
                row.deleted_chats = deleted;
                chat_rows.push(row);
            }
            summary.chat_months += 1;
            if let Some(pb) = &pb { pb.inc(1); }
        }
        if let Some(pb) = pb { pb.finish_with_message("chat stats done"); }
        chat_rows.sort_by(|a, b| (&a.channel_id, &a.period).cmp(&(&b.channel_id, &b.period)));

        let chat_path = dir.join(CHAT_STATS);
        let mut w = TableWriter::<ChatStatRow>::create(&chat_path, TableFormat::Csv, self.opts.write_buffer_bytes)?;
        for row in &chat_rows {
            w.write(row)?;
        }
        summary.chat_rows = w.finish()?;
        summary.files.push(chat_path);

        // superchats
        let sc_tables = plan_tables(dir, TableKind::Superchats, start, end, matcher.as_ref())?;
        // rates fetched before a failing conversion are still persisted
        let converted = self.superchat_stat_rows(&sc_tables, normalizer);
        let flushed = normalizer.flush();
        let mut sc_rows = match (converted, flushed) {
            (Ok(rows), Ok(flushed)) => {
                tracing::debug!(flushed, "rate cache flushed");
                rows
            }
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    tracing::warn!(error = %flush_err, "rate cache flush failed after conversion error");
                }
                return Err(e);
            }
        };
        summary.superchat_months = sc_tables.len() as u64;
        sc_rows.sort_by(|a, b| (&a.channel_id, &a.period).cmp(&(&b.channel_id, &b.period)));

        let sc_path = dir.join(SUPERCHAT_STATS);
        let mut w = TableWriter::<SuperchatStatRow>::create(&sc_path, TableFormat::Csv, self.opts.write_buffer_bytes)?;
        for row in &sc_rows {
            w.write(row)?;
        }
        summary.superchat_rows = w.finish()?;
        summary.files.push(sc_path);
        summary.rate_fetches = normalizer.fetches();

        tracing::info!(
            chat_months = summary.chat_months,
            superchat_months = summary.superchat_months,
            chat_rows = summary.chat_rows,
            superchat_rows = summary.superchat_rows,
            "stats written"
        );
        Ok(summary)
    }

    fn superchat_stat_rows<P: RateProvider>(
        &self,
        tables: &[MonthlyTable],
        normalizer: &mut CurrencyNormalizer<P>,
    ) -> Result<Vec<SuperchatStatRow>> {
        let pb = maybe_progress(self.opts.progress, tables.len() as u64, "Stats: superchats");
        let mut rows: Vec<SuperchatStatRow> = Vec::new();
        for table in tables {
            let mut agg = SuperchatAggregator::default();
            read_rows::<SuperchatRow>(&table.path, |row| {
                let amount = normalizer
                    .convert(row.amount, &row.currency)
                    .with_context(|| format!("convert {} {} in {}", row.amount, row.currency, table.path.display()))?;
                agg.ingest(&PricedSuperchat {
                    origin_channel_id: row.origin_channel_id,
                    channel_id: row.channel_id,
                    amount: amount as i64,
                });
                Ok(())
            })?;
            rows.extend(agg.finish(table.ym));
            if let Some(pb) = &pb { pb.inc(1); }
        }
        if let Some(pb) = pb { pb.finish_with_message("superchat stats done"); }
        Ok(rows)
    }
}
