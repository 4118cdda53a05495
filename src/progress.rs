//! Progress reporting: count-style bars for windows and documents.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
                        it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}";

/// Count-style progress bar (items processed out of total), with an optional label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = match ProgressStyle::with_template(TEMPLATE) {
        Ok(s) => s.progress_chars("█▉▊▋▌▍▎▏  "),
        Err(_) => ProgressStyle::default_bar(),
    };
    pb.set_style(style);
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// `Some(bar)` when progress is enabled, so call sites can stay `if let Some(pb)`.
pub fn maybe_progress(enabled: bool, total: u64, label: &str) -> Option<ProgressBar> {
    if enabled { Some(make_count_progress(total, label)) } else { None }
}
