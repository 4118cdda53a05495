//! Compressed copies of the dataset tables for the "complete" distribution.

use crate::pipeline::Vtlc;
use crate::progress::maybe_progress;
use crate::table::{open_decoded, ZSTD_LEVEL};
use crate::util::{create_with_backoff, init_tracing_once, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_POSTPROCESS_MATCHER: &str = "*.csv";

/// `chats_2021-04.csv` -> `chats_2021-04.csv.zst`; already compressed names are kept.
fn compressed_name(name: &str) -> String {
    if name.ends_with(".zst") { name.to_string() } else { format!("{}.zst", name) }
}

/// Re-encode `src` (plain or zstd) as a zstd stream at `dest`, staged then promoted.
fn compress_into(src: &Path, dest: &Path, write_buf: usize) -> Result<u64> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let staging_dir = dir.join("_staging");
    fs::create_dir_all(&staging_dir).with_context(|| format!("create {}", staging_dir.display()))?;
    let name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("table");
    let staging = staging_dir.join(format!("{}.inprogress", name));

    let mut reader = open_decoded(src)?;
    let file = create_with_backoff(&staging, 16, 50).with_context(|| format!("create {}", staging.display()))?;
    let mut enc = zstd::stream::write::Encoder::new(BufWriter::with_capacity(write_buf.max(8 * 1024), file), ZSTD_LEVEL)?;
    let bytes = io::copy(&mut reader, &mut enc).with_context(|| format!("compress {}", src.display()))?;
    enc.finish()?.flush()?;
    replace_file_atomic_backoff(&staging, dest)?;
    Ok(bytes)
}

impl Vtlc {
    /// Write a `.csv.zst` copy of every dataset table whose file name matches the
    /// matcher (default `*.csv`) into the complete directory. Returns the written paths
    /// in file-name order.
    pub fn postprocess(&self) -> Result<Vec<PathBuf>> {
        init_tracing_once();
        let pattern = self.opts.matcher.as_deref().unwrap_or(DEFAULT_POSTPROCESS_MATCHER);
        let matcher = glob::Pattern::new(pattern).with_context(|| format!("invalid matcher `{}`", pattern))?;

        let src_dir = &self.opts.dataset_dir;
        let dest_dir = &self.opts.complete_dir;
        fs::create_dir_all(dest_dir).with_context(|| format!("create {}", dest_dir.display()))?;

        let mut inputs: Vec<PathBuf> = Vec::new();
        if src_dir.exists() {
            for entry in WalkDir::new(src_dir).min_depth(1).max_depth(1).sort_by_file_name() {
                let ent = entry?;
                if !ent.file_type().is_file() {
                    continue;
                }
                if ent.file_name().to_str().map(|n| matcher.matches(n)).unwrap_or(false) {
                    inputs.push(ent.into_path());
                }
            }
        }
        if inputs.is_empty() {
            tracing::warn!(dir = %src_dir.display(), pattern, "no tables matched");
        }

        let pb = maybe_progress(self.opts.progress, inputs.len() as u64, "Postprocess");
        let mut written = Vec::with_capacity(inputs.len());
        for src in inputs {
            let Some(name) = src.file_name().and_then(|n| n.to_str()) else { continue };
            let dest = dest_dir.join(compressed_name(name));
            let bytes = compress_into(&src, &dest, self.opts.write_buffer_bytes)?;
            tracing::info!(src = %src.display(), dest = %dest.display(), bytes, "compressed");
            written.push(dest);
            if let Some(pb) = &pb { pb.inc(1); }
        }
        if let Some(pb) = pb { pb.finish_with_message("postprocess done"); }
        Ok(written)
    }
}
