use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use zstd::stream::read::Decoder;

use crate::mem::{maybe_throttle_low_memory, LOW_MEMORY_THRESHOLD};
use crate::util::open_with_backoff;

/// Stream a JSONL file line-by-line, decompressing when the name ends in `.zst`.
/// `on_line` receives each line without its terminator. Empty lines are skipped, and
/// lines that are not valid UTF-8 are skipped with a warning.
///
/// We request `window_log_max(31)` up front so long-window frames produced by
/// `zstd --long=31` dumps decode without "Frame requires too much memory".
pub fn for_each_line(path: &Path, read_buf_bytes: usize, mut on_line: impl FnMut(&str) -> Result<()>) -> Result<u64> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let inner: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("zst") {
        let mut decoder = Decoder::new(file)?;
        decoder.window_log_max(31)?;
        Box::new(decoder)
    } else {
        Box::new(file)
    };
    let mut reader = BufReader::with_capacity(read_buf_bytes.max(8 * 1024), inner);

    let mut buf: Vec<u8> = Vec::with_capacity(16 * 1024);
    let mut lines = 0u64;
    let mut line_no = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {} after {} lines", path.display(), lines))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        if buf.last() == Some(&b'\n') {
            let _ = buf.pop();
            if buf.last() == Some(&b'\r') {
                let _ = buf.pop();
            }
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), line = line_no, error = %e, "skipping line that is not valid UTF-8");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        on_line(line)?;
        lines += 1;
        // Cooperative memory backoff
        maybe_throttle_low_memory(LOW_MEMORY_THRESHOLD);
    }
    Ok(lines)
}
