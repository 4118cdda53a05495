#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use time::macros::datetime;
use time::OffsetDateTime;
use vtlc::{RateProvider, Vtlc};

pub const SALT: &str = "pepper";
pub const STREAMER: &str = "UC_streamer_a";
pub const OTHER_STREAMER: &str = "UC_streamer_b";

/// Fixed "now" for the fixtures: mid June 2021.
pub const NOW: OffsetDateTime = datetime!(2021-06-20 12:00 UTC);

/// Fresh scratch directory; the guard removes it on drop.
pub fn scratch() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

/// Pipeline rooted in `base` with deterministic clock and no progress bars.
pub fn vtlc_in(base: &Path) -> Vtlc {
    Vtlc::new()
        .dataset_dir(base.join("vtuber-livechat"))
        .complete_dir(base.join("vtuber-livechat-full"))
        .rate_cache_dir(base.join("currency_snapshot"))
        .salt(SALT)
        .now(NOW)
        .rate_backoff(Duration::ZERO)
        .progress(false)
}

pub fn text(s: &str) -> Value {
    json!([{ "text": s }])
}

/// A plain chat document in `chats`.
pub fn chat_doc(id: &str, author: &str, origin: &str, ts: &str, body: &str) -> Value {
    json!({
        "id": id,
        "timestamp": ts,
        "rawMessage": text(body),
        "authorChannelId": author,
        "originVideoId": "video_1",
        "originChannelId": origin,
        "isModerator": false,
        "isVerified": false,
    })
}

pub fn member_chat_doc(id: &str, author: &str, origin: &str, ts: &str, since: Option<&str>) -> Value {
    let mut doc = chat_doc(id, author, origin, ts, "hello members");
    doc["membership"] = match since {
        Some(s) => json!({ "thumbnail": "x", "since": s }),
        None => json!({ "thumbnail": "x" }),
    };
    doc
}

pub fn superchat_doc(id: &str, author: &str, origin: &str, ts: &str, amount: f64, currency: &str, color: &str) -> Value {
    let mut doc = chat_doc(id, author, origin, ts, "thanks!");
    doc["purchase"] = json!({
        "amount": amount,
        "currency": currency,
        "headerBackgroundColor": color,
    });
    doc
}

pub fn ban_doc(author: &str, origin: &str, ts: Option<&str>) -> Value {
    let mut doc = json!({ "channelId": author, "originVideoId": "video_1", "originChannelId": origin });
    if let Some(ts) = ts {
        doc["timestamp"] = json!(ts);
    }
    doc
}

pub fn deletion_doc(target: &str, origin: &str, ts: &str, retracted: bool) -> Value {
    json!({
        "targetId": target,
        "retracted": retracted,
        "originVideoId": "video_1",
        "originChannelId": origin,
        "timestamp": ts,
    })
}

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Whole table as text, decompressing `.zst`.
pub fn read_text(path: &Path) -> String {
    let mut s = String::new();
    if path.extension().map(|e| e == "zst").unwrap_or(false) {
        zstd::stream::read::Decoder::new(File::open(path).unwrap()).unwrap().read_to_string(&mut s).unwrap();
    } else {
        File::open(path).unwrap().read_to_string(&mut s).unwrap();
    }
    s
}

/// Rows of a table as `column -> value` maps.
pub fn read_records(path: &Path) -> Vec<BTreeMap<String, String>> {
    let text = read_text(path);
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let headers = rdr.headers().unwrap().clone();
    rdr.records()
        .map(|r| {
            let r = r.unwrap();
            headers.iter().zip(r.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect()
        })
        .collect()
}

pub fn header_of(path: &Path) -> Vec<String> {
    let text = read_text(path);
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    rdr.headers().unwrap().iter().map(|s| s.to_string()).collect()
}

pub fn dataset(base: &Path) -> PathBuf {
    base.join("vtuber-livechat")
}

/// Rate provider backed by a fixed table; counts calls and can fail the first N.
#[derive(Clone, Default)]
pub struct FakeRates {
    pub rates: BTreeMap<String, f64>,
    pub calls: Rc<RefCell<Vec<String>>>,
    pub fail_first: Rc<RefCell<u32>>,
}

impl FakeRates {
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self { rates: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(), ..Default::default() }
    }

    pub fn failing_first(self, n: u32) -> Self {
        *self.fail_first.borrow_mut() = n;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl RateProvider for FakeRates {
    fn fetch_rate(&self, from: &str, _to: &str) -> Result<f64> {
        self.calls.borrow_mut().push(from.to_string());
        {
            let mut left = self.fail_first.borrow_mut();
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("service unavailable"));
            }
        }
        self.rates.get(from).copied().ok_or_else(|| anyhow!("no rate for {}", from))
    }
}
