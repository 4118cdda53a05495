//! Raw document -> flat row projection.

use crate::anonymize::Anonymizer;
use crate::channels::ChannelRegistry;
use crate::currency::canonical_code;
use crate::date::{document_timestamp, format_timestamp};
use crate::epoch::{EpochTable, MembershipInfo, SuperchatInfo};
use crate::error::RecordError;
use crate::message::flatten_runs;
use crate::rows::{BanRow, ChatRow, DeletionRow, SuperchatRow, MEMBERSHIP_NEW, MEMBERSHIP_NONE, MEMBERSHIP_UNKNOWN};
use crate::superchat::SuperchatColor;
use serde_json::Value;
use time::OffsetDateTime;

/// Outcome of projecting one `chats` document.
#[derive(Clone, Debug, PartialEq)]
pub enum Transformed {
    Chat(ChatRow),
    Superchat(SuperchatRow),
    Skipped(SkipReason),
}

/// Documents that are dropped on purpose (not errors).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    EmptyBody,
    UntrustedSuperchat,
}

pub struct Transformer<'a> {
    anonymizer: &'a Anonymizer,
    epochs: &'a EpochTable,
    channels: &'a ChannelRegistry,
}

fn str_field<'v>(doc: &'v Value, field: &'static str) -> Result<&'v str, RecordError> {
    doc.get(field).and_then(|v| v.as_str()).ok_or(RecordError::Malformed { field })
}

/// Truthy flag as 0/1. Missing counts as false.
fn flag(doc: &Value, field: &str) -> u8 {
    match doc.get(field) {
        Some(Value::Bool(b)) => *b as u8,
        Some(Value::Number(n)) => (n.as_f64().unwrap_or(0.0) != 0.0) as u8,
        _ => 0,
    }
}

fn timestamp(doc: &Value) -> Result<OffsetDateTime, RecordError> {
    document_timestamp(doc).ok_or(RecordError::Malformed { field: "timestamp" })
}

fn amount(purchase: &Value) -> Result<f64, RecordError> {
    let parsed = match purchase.get("amount") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or(RecordError::Malformed { field: "purchase.amount" })
}

impl<'a> Transformer<'a> {
    pub fn new(anonymizer: &'a Anonymizer, epochs: &'a EpochTable, channels: &'a ChannelRegistry) -> Self {
        Self { anonymizer, epochs, channels }
    }

    /// Project a `chats` document. Documents carrying `purchase` are superchats.
    pub fn chat(&self, doc: &Value) -> Result<Transformed, RecordError> {
        let ts = timestamp(doc)?;
        let policy = self.epochs.resolve(ts);

        if let Some(purchase) = doc.get("purchase") {
            if policy.superchat == SuperchatInfo::Untrusted {
                return Ok(Transformed::Skipped(SkipReason::UntrustedSuperchat));
            }
            return self.superchat(doc, purchase, ts).map(Transformed::Superchat);
        }

        let body = flatten_runs(doc.get("rawMessage").ok_or(RecordError::Malformed { field: "rawMessage" })?)?;
        let id = str_field(doc, "id")?;
        let author = str_field(doc, "authorChannelId")?;
        let origin_video_id = str_field(doc, "originVideoId")?;
        let origin_channel_id = str_field(doc, "originChannelId")?;

        if body.is_empty() {
            return Ok(Transformed::Skipped(SkipReason::EmptyBody));
        }

        let membership = match policy.membership {
            MembershipInfo::Unknown => MEMBERSHIP_UNKNOWN.to_string(),
            MembershipInfo::Known => match doc.get("membership") {
                Some(m) => match m.get("since").and_then(|s| s.as_str()) {
                    Some(since) => since.to_string(),
                    None => MEMBERSHIP_NEW.to_string(),
                },
                None => MEMBERSHIP_NONE.to_string(),
            },
        };

        Ok(Transformed::Chat(ChatRow {
            timestamp: format_timestamp(ts),
            body,
            membership,
            is_moderator: flag(doc, "isModerator"),
            is_verified: flag(doc, "isVerified"),
            id: self.anonymizer.hash(id),
            channel_id: self.anonymizer.hash(author),
            origin_video_id: origin_video_id.to_string(),
            origin_channel_id: origin_channel_id.to_string(),
        }))
    }

    fn superchat(&self, doc: &Value, purchase: &Value, ts: OffsetDateTime) -> Result<SuperchatRow, RecordError> {
        let id = str_field(doc, "id")?;
        let author = str_field(doc, "authorChannelId")?;
        let origin_video_id = str_field(doc, "originVideoId")?;
        let origin_channel_id = str_field(doc, "originChannelId")?;
        // superchats may come without a message
        let body = match doc.get("rawMessage") {
            Some(raw) => flatten_runs(raw)?,
            None => String::new(),
        };

        let amount = amount(purchase)?;
        let currency = canonical_code(str_field(purchase, "currency")?)?;
        let color = SuperchatColor::from_value(
            purchase
                .get("headerBackgroundColor")
                .ok_or(RecordError::Malformed { field: "purchase.headerBackgroundColor" })?,
        )?;

        let (origin_channel, origin_affiliation, origin_group) = match self.channels.get(origin_channel_id) {
            Some(c) => (c.display_name().to_string(), c.affiliation.clone(), c.group.clone()),
            None => {
                tracing::debug!(origin_channel_id, "origin channel not in registry");
                (String::new(), String::new(), String::new())
            }
        };

        Ok(SuperchatRow {
            timestamp: format_timestamp(ts),
            amount,
            currency,
            significance: color.significance(),
            color: color.name().to_string(),
            body,
            id: self.anonymizer.hash(id),
            channel_id: self.anonymizer.hash(author),
            origin_video_id: origin_video_id.to_string(),
            origin_channel_id: origin_channel_id.to_string(),
            origin_channel,
            origin_affiliation,
            origin_group,
        })
    }

    /// Project a `banactions` document.
    pub fn ban(&self, doc: &Value) -> Result<BanRow, RecordError> {
        Ok(BanRow {
            timestamp: document_timestamp(doc).map(format_timestamp).unwrap_or_default(),
            channel_id: self.anonymizer.hash(str_field(doc, "channelId")?),
            origin_video_id: str_field(doc, "originVideoId")?.to_string(),
            origin_channel_id: str_field(doc, "originChannelId")?.to_string(),
        })
    }

    /// Project a `deleteactions` document.
    pub fn deletion(&self, doc: &Value) -> Result<DeletionRow, RecordError> {
        Ok(DeletionRow {
            timestamp: document_timestamp(doc).map(format_timestamp).unwrap_or_default(),
            id: self.anonymizer.hash(str_field(doc, "targetId")?),
            retracted: flag(doc, "retracted"),
            origin_video_id: str_field(doc, "originVideoId")?.to_string(),
            origin_channel_id: str_field(doc, "originChannelId")?.to_string(),
        })
    }
}
