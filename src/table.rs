//! Flat table files: CSV, optionally zstd-compressed.
//!
//! Writers stage into `<dir>/_staging/<name>.inprogress` and rename over the
//! destination on `finish()`, so a failed run never clobbers a finished table with a
//! partial one. Promoting a table removes its copy in the other format.

use crate::util::{create_with_backoff, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub(crate) const ZSTD_LEVEL: i32 = 19;

/// A row type with a fixed column layout.
pub trait Table: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// On-disk encoding of a table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TableFormat {
    #[default]
    Csv,
    CsvZst,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::CsvZst => "csv.zst",
        }
    }

    /// `<stem>.<ext>`
    pub fn file_name(self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }

    pub fn of_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("zst") => TableFormat::CsvZst,
            _ => TableFormat::Csv,
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Csv => f.write_str("csv"),
            TableFormat::CsvZst => f.write_str("csv-zst"),
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(TableFormat::Csv),
            "csv-zst" | "csv.zst" | "zst" => Ok(TableFormat::CsvZst),
            other => Err(format!("unknown table format `{}` (expected csv or csv-zst)", other)),
        }
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Zst(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Zst(w) => w.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Zst(w) => w.flush(),
        }
    }
}

impl Sink {
    fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            Sink::Plain(w) => w,
            Sink::Zst(enc) => enc.finish()?,
        };
        inner.flush()
    }
}

pub struct TableWriter<R> {
    staging: PathBuf,
    dest: PathBuf,
    csv: csv::Writer<Sink>,
    rows: u64,
    _row: PhantomData<fn(&R)>,
}

impl<R: Table> TableWriter<R> {
    /// Open a staged writer for `dest` and emit the header row.
    pub fn create(dest: &Path, format: TableFormat, write_buf: usize) -> Result<Self> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let staging_dir = dir.join("_staging");
        fs::create_dir_all(&staging_dir).with_context(|| format!("create {}", staging_dir.display()))?;
        let name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid table path {}", dest.display()))?;
        let staging = staging_dir.join(format!("{}.inprogress", name));

        let file = create_with_backoff(&staging, 16, 50).with_context(|| format!("create {}", staging.display()))?;
        let buffered = BufWriter::with_capacity(write_buf.max(8 * 1024), file);
        let sink = match format {
            TableFormat::Csv => Sink::Plain(buffered),
            TableFormat::CsvZst => Sink::Zst(zstd::stream::write::Encoder::new(buffered, ZSTD_LEVEL)?),
        };

        let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
        csv.write_record(R::COLUMNS)?;
        Ok(Self { staging, dest: dest.to_path_buf(), csv, rows: 0, _row: PhantomData })
    }

    #[inline]
    pub fn write(&mut self, row: &R) -> Result<()> {
        self.csv.serialize(row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Flush, close and promote the staged file. Returns the number of data rows.
    pub fn finish(self) -> Result<u64> {
        let sink = self
            .csv
            .into_inner()
            .map_err(|e| anyhow!("flush {}: {}", self.staging.display(), e.error()))?;
        sink.finish().with_context(|| format!("finish {}", self.staging.display()))?;
        replace_file_atomic_backoff(&self.staging, &self.dest)?;
        if let Some(stale) = other_format_sibling(&self.dest).filter(|p| p.exists()) {
            remove_with_backoff(&stale, 20, 50)?;
            tracing::debug!(path = %stale.display(), "removed table left by a run in the other format");
        }
        tracing::debug!(path = %self.dest.display(), rows = self.rows, "table written");
        Ok(self.rows)
    }
}

/// The same table in the other format: `x.csv` <-> `x.csv.zst`.
fn other_format_sibling(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let other = match name.strip_suffix(".zst") {
        Some(plain) => plain.to_string(),
        None => format!("{}.zst", name),
    };
    Some(path.with_file_name(other))
}

/// Raw bytes of a table, decompressing `.zst` files transparently.
pub fn open_decoded(path: &Path) -> Result<Box<dyn Read>> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    Ok(match TableFormat::of_path(path) {
        TableFormat::CsvZst => Box::new(BufReader::new(zstd::stream::read::Decoder::new(file)?)),
        TableFormat::Csv => Box::new(BufReader::new(file)),
    })
}

pub fn open_table(path: &Path) -> Result<csv::Reader<Box<dyn Read>>> {
    Ok(csv::Reader::from_reader(open_decoded(path)?))
}

/// Deserialize every data row of `path` into `R` and hand it to `on_row`.
pub fn read_rows<R: DeserializeOwned>(path: &Path, mut on_row: impl FnMut(R) -> Result<()>) -> Result<u64> {
    let mut rdr = open_table(path)?;
    let mut n = 0u64;
    for rec in rdr.deserialize::<R>() {
        let row = rec.with_context(|| format!("parse row {} of {}", n + 1, path.display()))?;
        on_row(row)?;
        n += 1;
    }
    Ok(n)
}
