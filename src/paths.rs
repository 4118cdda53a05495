use crate::date::{iter_year_months, YearMonth};
use crate::table::TableFormat;
use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const BAN_EVENTS: &str = "ban_events";
pub const DELETION_EVENTS: &str = "deletion_events";
pub const CHAT_STATS: &str = "chat_stats.csv";
pub const SUPERCHAT_STATS: &str = "superchat_stats.csv";

/// Type of monthly table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Chats,      // chats_YYYY-MM.csv[.zst]
    Superchats, // superchats_YYYY-MM.csv[.zst]
}

impl TableKind {
    pub fn prefix(self) -> &'static str {
        match self {
            TableKind::Chats => "chats",
            TableKind::Superchats => "superchats",
        }
    }

    /// File stem for a month, e.g. `chats_2021-04`.
    pub fn stem(self, ym: YearMonth) -> String {
        format!("{}_{}", self.prefix(), ym)
    }

    pub fn path(self, dir: &Path, ym: YearMonth, format: TableFormat) -> PathBuf {
        dir.join(format.file_name(&self.stem(ym)))
    }
}

#[derive(Clone, Debug)]
pub struct MonthlyTable {
    pub kind: TableKind,
    pub ym: YearMonth,
    pub path: PathBuf,
}

/// Map month -> table file for `kind` directly under `dir`. When a month exists both
/// plain and compressed, the plain file wins. `matcher` filters on the file name.
pub fn discover_monthly(dir: &Path, kind: TableKind, matcher: Option<&glob::Pattern>) -> Result<BTreeMap<YearMonth, PathBuf>> {
    let re = Regex::new(&format!(r"^{}_(\d{{4}})-(\d{{2}})\.csv(\.zst)?$", kind.prefix()))?;
    let mut map: BTreeMap<YearMonth, PathBuf> = BTreeMap::new();
    if !dir.exists() {
        return Ok(map);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let ent = entry?;
        let Some(name) = ent.file_name().to_str() else { continue };
        let Some(caps) = re.captures(name) else { continue };
        if let Some(m) = matcher {
            if !m.matches(name) {
                continue;
            }
        }
        let (Ok(year), Ok(month)) = (caps[1].parse::<u16>(), caps[2].parse::<u8>()) else { continue };
        if !(1..=12).contains(&month) {
            continue;
        }
        let ym = YearMonth { year, month };
        let compressed = caps.get(3).is_some();
        if !map.contains_key(&ym) || !compressed {
            map.insert(ym, ent.path().to_path_buf());
        }
    }
    Ok(map)
}

/// Monthly tables of `kind` within the optional inclusive month bounds.
pub fn plan_tables(
    dir: &Path,
    kind: TableKind,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
    matcher: Option<&glob::Pattern>,
) -> Result<Vec<MonthlyTable>> {
    let map = discover_monthly(dir, kind, matcher)?;
    let (Some(first), Some(last)) = (map.keys().next().copied(), map.keys().next_back().copied()) else {
        return Ok(Vec::new());
    };
    let lo = start.map_or(first, |s| s.max(first));
    let hi = end.map_or(last, |e| e.min(last));
    Ok(iter_year_months(lo, hi)
        .filter_map(|ym| map.get(&ym).map(|p| MonthlyTable { kind, ym, path: p.clone() }))
        .collect())
}

/// `<dir>/<stem>.csv` or `<dir>/<stem>.csv.zst`, whichever exists (plain first).
pub fn find_table(dir: &Path, stem: &str) -> Option<PathBuf> {
    [TableFormat::Csv, TableFormat::CsvZst]
        .into_iter()
        .map(|f| dir.join(f.file_name(stem)))
        .find(|p| p.is_file())
}
