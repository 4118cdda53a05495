//! Document sources: the seam between the pipeline and the document database.

use crate::date::document_timestamp;
use crate::window::TimeRange;
use crate::util::open_with_backoff;
use crate::zstd_jsonl::for_each_line;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const CHATS: &str = "chats";
pub const BAN_ACTIONS: &str = "banactions";
pub const DELETE_ACTIONS: &str = "deleteactions";

const ESTIMATE_SAMPLE_LINES: u64 = 64;

/// Read access to the event collections.
pub trait DocumentSource {
    /// Size hint for logs, without scanning the collection. `None` when unknown.
    fn estimated_count(&self, collection: &str) -> Result<Option<u64>>;

    /// Visit documents of `collection` in source order. With `range`, only documents
    /// whose timestamp lies in `[start, end)` are visited (documents without one are not).
    /// Returns the number of documents visited.
    fn find(&self, collection: &str, range: Option<TimeRange>, on_doc: &mut dyn FnMut(Value) -> Result<()>) -> Result<u64>;
}

#[inline]
fn in_range(doc: &Value, range: Option<TimeRange>) -> bool {
    match range {
        None => true,
        Some(r) => document_timestamp(doc).map(|ts| r.contains(ts)).unwrap_or(false),
    }
}

/// Collections exported as newline-delimited JSON, one file per collection:
/// `<dir>/<collection>.jsonl` or `<dir>/<collection>.jsonl.zst` (mongoexport style).
///
/// A dump has no index, so every ranged `find` streams the whole file and filters.
/// Generating N month windows reads the `chats` dump N times.
#[derive(Clone, Debug)]
pub struct DumpSource {
    dir: PathBuf,
    read_buffer_bytes: usize,
}

impl DumpSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), read_buffer_bytes: 256 * 1024 }
    }

    pub fn read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    /// Dump file for `collection`, preferring the compressed one.
    pub fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        [format!("{}.jsonl.zst", collection), format!("{}.jsonl", collection)]
            .into_iter()
            .map(|name| self.dir.join(name))
            .find(|p| p.is_file())
    }
}

impl DocumentSource for DumpSource {
    /// Plain dumps: file size over the mean length of the first lines.
    /// Compressed dumps are not decoded for a hint, so their count is unknown.
    fn estimated_count(&self, collection: &str) -> Result<Option<u64>> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(Some(0));
        };
        if path.extension().and_then(|e| e.to_str()) == Some("zst") {
            return Ok(None);
        }
        let size = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?.len();
        let file = open_with_backoff(&path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let (mut sampled, mut bytes) = (0u64, 0u64);
        let mut buf = Vec::new();
        while sampled < ESTIMATE_SAMPLE_LINES {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            sampled += 1;
            bytes += n as u64;
        }
        if sampled == 0 {
            return Ok(Some(0));
        }
        Ok(Some(size * sampled / bytes.max(1)))
    }

    fn find(&self, collection: &str, range: Option<TimeRange>, on_doc: &mut dyn FnMut(Value) -> Result<()>) -> Result<u64> {
        let Some(path) = self.collection_path(collection) else {
            tracing::debug!(collection, dir = %self.dir.display(), "collection dump not found; treating as empty");
            return Ok(0);
        };
        let mut visited = 0u64;
        let mut line_no = 0u64;
        for_each_line(&path, self.read_buffer_bytes, |line| {
            line_no += 1;
            let doc: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(collection, line = line_no, error = %e, "skipping undecodable document");
                    return Ok(());
                }
            };
            if !in_range(&doc, range) {
                return Ok(());
            }
            visited += 1;
            on_doc(doc)
        })?;
        Ok(visited)
    }
}

/// In-memory collections, mostly for tests and fixtures.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    collections: BTreeMap<String, Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, docs: impl IntoIterator<Item = Value>) -> Self {
        self.collections.entry(name.to_string()).or_default().extend(docs);
        self
    }

    pub fn push(&mut self, name: &str, doc: Value) {
        self.collections.entry(name.to_string()).or_default().push(doc);
    }
}

impl DocumentSource for MemorySource {
    fn estimated_count(&self, collection: &str) -> Result<Option<u64>> {
        Ok(Some(self.collections.get(collection).map(|v| v.len() as u64).unwrap_or(0)))
    }

    fn find(&self, collection: &str, range: Option<TimeRange>, on_doc: &mut dyn FnMut(Value) -> Result<()>) -> Result<u64> {
        let mut visited = 0u64;
        for doc in self.collections.get(collection).into_iter().flatten() {
            if !in_range(doc, range) {
                continue;
            }
            visited += 1;
            on_doc(doc.clone())?;
        }
        Ok(visited)
    }
}
