use crate::table::read_rows;
use ahash::AHashMap;
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// One row of `channels.csv`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub english_name: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub subscription_count: Option<u64>,
    #[serde(default)]
    pub video_count: Option<u64>,
    #[serde(default)]
    pub photo: String,
}

impl Channel {
    /// English name when the registry has one, otherwise the native name.
    pub fn display_name(&self) -> &str {
        if self.english_name.is_empty() { &self.name } else { &self.english_name }
    }
}

/// Streamer channels keyed by channel id.
#[derive(Clone, Debug, Default)]
pub struct ChannelRegistry {
    by_id: AHashMap<String, Channel>,
}

impl ChannelRegistry {
    /// Read `channels.csv`. A missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "channel registry not found; origin channel columns will be blank");
            return Ok(Self::default());
        }
        let mut by_id = AHashMap::new();
        read_rows::<Channel>(path, |c| {
            by_id.insert(c.channel_id.clone(), c);
            Ok(())
        })?;
        tracing::info!(channels = by_id.len(), "channel registry loaded");
        Ok(Self { by_id })
    }

    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self { by_id: channels.into_iter().map(|c| (c.channel_id.clone(), c)).collect() }
    }

    pub fn get(&self, channel_id: &str) -> Option<&Channel> {
        self.by_id.get(channel_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
