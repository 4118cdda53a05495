//! Output row layouts. Field order is the column order on disk.

use crate::table::Table;
use serde::{Deserialize, Serialize};

pub const MEMBERSHIP_UNKNOWN: &str = "unknown";
pub const MEMBERSHIP_NONE: &str = "non-member";
pub const MEMBERSHIP_NEW: &str = "less than 1 month";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRow {
    pub timestamp: String,
    pub body: String,
    pub membership: String,
    pub is_moderator: u8,
    pub is_verified: u8,
    pub id: String,
    pub channel_id: String,
    pub origin_video_id: String,
    pub origin_channel_id: String,
}

impl ChatRow {
    /// Member chat: the author holds a known membership tier.
    pub fn is_member(&self) -> bool {
        self.membership != MEMBERSHIP_NONE && self.membership != MEMBERSHIP_UNKNOWN
    }
}

impl Table for ChatRow {
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "body",
        "membership",
        "isModerator",
        "isVerified",
        "id",
        "channelId",
        "originVideoId",
        "originChannelId",
    ];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperchatRow {
    pub timestamp: String,
    pub amount: f64,
    pub currency: String,
    pub significance: u8,
    pub color: String,
    pub body: String,
    pub id: String,
    pub channel_id: String,
    pub origin_video_id: String,
    pub origin_channel_id: String,
    pub origin_channel: String,
    pub origin_affiliation: String,
    pub origin_group: String,
}

impl Table for SuperchatRow {
    const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "amount",
        "currency",
        "significance",
        "color",
        "body",
        "id",
        "channelId",
        "originVideoId",
        "originChannelId",
        "originChannel",
        "originAffiliation",
        "originGroup",
    ];
}

/// `timestamp` is blank for events recorded before timestamps were stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRow {
    pub timestamp: String,
    pub channel_id: String,
    pub origin_video_id: String,
    pub origin_channel_id: String,
}

impl Table for BanRow {
    const COLUMNS: &'static [&'static str] = &["timestamp", "channelId", "originVideoId", "originChannelId"];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRow {
    pub timestamp: String,
    pub id: String,
    pub retracted: u8,
    pub origin_video_id: String,
    pub origin_channel_id: String,
}

impl Table for DeletionRow {
    const COLUMNS: &'static [&'static str] = &["timestamp", "id", "retracted", "originVideoId", "originChannelId"];
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatRow {
    pub channel_id: String,
    pub period: String,
    pub chats: u64,
    pub member_chats: u64,
    pub unique_chatters: u64,
    pub unique_members: u64,
    pub banned_chatters: u64,
    pub deleted_chats: u64,
}

impl Table for ChatStatRow {
    const COLUMNS: &'static [&'static str] = &[
        "channelId",
        "period",
        "chats",
        "memberChats",
        "uniqueChatters",
        "uniqueMembers",
        "bannedChatters",
        "deletedChats",
    ];
}

/// Amounts are in the reference currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperchatStatRow {
    #[serde(rename = "channelId")]
    pub channel_id: String,
    pub period: String,
    #[serde(rename = "superChats")]
    pub super_chats: u64,
    #[serde(rename = "uniqueSuperChatters")]
    pub unique_super_chatters: u64,
    #[serde(rename = "totalSC")]
    pub total_sc: i64,
    #[serde(rename = "averageSC")]
    pub average_sc: i64,
}

impl Table for SuperchatStatRow {
    const COLUMNS: &'static [&'static str] =
        &["channelId", "period", "superChats", "uniqueSuperChatters", "totalSC", "averageSC"];
}
