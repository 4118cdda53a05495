//! Currency canonicalization and conversion into the reference currency.
//!
//! Rates live in a `RateCache` (in memory, one file per currency code on disk).
//! Misses are filled from a `RateProvider` and persisted by an explicit `flush()`.

use crate::error::RecordError;
use crate::util::{create_with_backoff, open_with_backoff};
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use walkdir::WalkDir;

pub const DEFAULT_REFERENCE_CURRENCY: &str = "JPY";
pub const DEFAULT_RATE_BACKOFF: Duration = Duration::from_secs(5);

const SYMBOLS: &[(&str, &str)] = &[
    ("$", "USD"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₩", "KRW"),
    ("₪", "ILS"),
    ("€", "EUR"),
    ("₱", "PHP"),
    ("₹", "INR"),
    ("A$", "AUD"),
    ("CA$", "CAD"),
    ("HK$", "HKD"),
    ("MX$", "MXN"),
    ("NT$", "TWD"),
    ("NZ$", "NZD"),
    ("R$", "BRL"),
];

/// Map a currency symbol (or an already canonical ISO code) to its three-letter code.
pub fn canonical_code(symbol: &str) -> Result<String, RecordError> {
    let s = symbol.trim();
    if let Some((_, code)) = SYMBOLS.iter().find(|(sym, _)| *sym == s) {
        return Ok((*code).to_string());
    }
    if s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase()) {
        return Ok(s.to_string());
    }
    Err(RecordError::UnknownCurrency(s.to_string()))
}

/// Source of exchange rates (`1 from` = `rate to`).
pub trait RateProvider {
    fn fetch_rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Blocking client for the currency-exchange endpoint on RapidAPI.
pub struct HttpRateProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    host: String,
}

impl HttpRateProvider {
    pub const DEFAULT_HOST: &'static str = "currency-exchange.p.rapidapi.com";

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("build exchange-rate http client")?;
        Ok(Self { client, api_key: api_key.into(), host: Self::DEFAULT_HOST.to_string() })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

impl RateProvider for HttpRateProvider {
    fn fetch_rate(&self, from: &str, to: &str) -> Result<f64> {
        tracing::info!(from, to, "querying exchange rate");
        let url = format!("https://{}/exchange", self.host);
        let body = self
            .client
            .get(&url)
            .query(&[("from", from), ("to", to)])
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .send()
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .text()?;
        body.trim()
            .parse::<f64>()
            .map_err(|e| anyhow!("unparseable rate {:?}: {}", body.trim(), e))
    }
}

/// Rates to the reference currency keyed by currency code.
#[derive(Debug, Default)]
pub struct RateCache {
    dir: Option<PathBuf>,
    rates: BTreeMap<String, f64>,
    dirty: BTreeSet<String>,
}

impl RateCache {
    /// Cache with no backing directory; `flush()` is a no-op.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load every `<dir>/<CODE>` snapshot file. A missing directory is created.
    pub fn load(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create rate cache {}", dir.display()))?;
        let mut rates = BTreeMap::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let ent = entry?;
            if !ent.file_type().is_file() {
                continue;
            }
            let Some(code) = ent.file_name().to_str() else { continue };
            let mut s = String::new();
            open_with_backoff(ent.path(), 16, 50)?.read_to_string(&mut s)?;
            match s.trim().parse::<f64>() {
                Ok(rate) => {
                    rates.insert(code.to_string(), rate);
                }
                Err(_) => tracing::warn!(path = %ent.path().display(), "ignoring unreadable rate snapshot"),
            }
        }
        tracing::debug!(dir = %dir.display(), entries = rates.len(), "rate cache loaded");
        Ok(Self { dir: Some(dir.to_path_buf()), rates, dirty: BTreeSet::new() })
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn insert(&mut self, code: &str, rate: f64) {
        self.rates.insert(code.to_string(), rate);
        self.dirty.insert(code.to_string());
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Persist entries added since the last flush. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize> {
        let Some(dir) = self.dir.as_ref() else {
            self.dirty.clear();
            return Ok(0);
        };
        let mut written = 0;
        for code in std::mem::take(&mut self.dirty) {
            if let Some(rate) = self.rates.get(&code) {
                let path = dir.join(&code);
                let mut f = create_with_backoff(&path, 16, 50)
                    .with_context(|| format!("create {}", path.display()))?;
                write!(f, "{}", rate)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Converts amounts into the reference currency.
pub struct CurrencyNormalizer<P: RateProvider> {
    provider: P,
    cache: RateCache,
    reference: String,
    backoff: Duration,
    fetches: u64,
}

impl<P: RateProvider> CurrencyNormalizer<P> {
    pub fn new(provider: P, cache: RateCache, reference: impl Into<String>) -> Self {
        Self {
            provider,
            cache,
            reference: reference.into(),
            backoff: DEFAULT_RATE_BACKOFF,
            fetches: 0,
        }
    }

    /// Fixed delay before each rate lookup.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Number of provider round trips made so far.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Rate from `code` to the reference currency, consulting the cache first.
    /// A miss waits `backoff`, asks the provider, and on failure waits and asks once more.
    pub fn rate(&mut self, code: &str) -> Result<f64, RecordError> {
        if code == self.reference {
            return Ok(1.0);
        }
        if let Some(rate) = self.cache.get(code) {
            return Ok(rate);
        }

        sleep(self.backoff);
        self.fetches += 1;
        let rate = match self.provider.fetch_rate(code, &self.reference) {
            Ok(r) => r,
            Err(first) => {
                tracing::warn!(currency = code, error = %first, "rate lookup failed, retrying once");
                sleep(self.backoff);
                self.fetches += 1;
                self.provider.fetch_rate(code, &self.reference).map_err(|e| RecordError::RateService {
                    currency: code.to_string(),
                    message: e.to_string(),
                })?
            }
        };
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RecordError::InvalidRate { currency: code.to_string(), rate });
        }
        self.cache.insert(code, rate);
        Ok(rate)
    }

    /// `round(amount * rate)` in the reference currency. `currency` may be a symbol or a code.
    pub fn convert(&mut self, amount: f64, currency: &str) -> Result<f64, RecordError> {
        let code = canonical_code(currency)?;
        let rate = self.rate(&code)?;
        let converted = (amount * rate).round();
        if !converted.is_finite() {
            return Err(RecordError::InvalidRate { currency: code, rate });
        }
        Ok(converted)
    }

    pub fn flush(&mut self) -> Result<usize> {
        self.cache.flush()
    }
}
