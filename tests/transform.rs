#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use vtlc::{
    canonical_code, flatten_runs, parse_rfc3339, Anonymizer, Channel, ChannelRegistry, EpochTable, RecordError, SkipReason,
    SuperchatColor, Transformed, Transformer, CUSTOM_EMOJI_PLACEHOLDER, MEMBERSHIP_NEW, MEMBERSHIP_NONE,
    MEMBERSHIP_UNKNOWN,
};

fn registry() -> ChannelRegistry {
    ChannelRegistry::from_channels([Channel {
        channel_id: STREAMER.to_string(),
        name: "Streamer A Ch.".to_string(),
        english_name: "Streamer A".to_string(),
        affiliation: "Hololive".to_string(),
        group: "Gen 1".to_string(),
        ..Default::default()
    }])
}

fn expect_chat(t: Transformed) -> vtlc::ChatRow {
    match t {
        Transformed::Chat(row) => row,
        other => panic!("expected chat row, got {:?}", other),
    }
}

fn expect_superchat(t: Transformed) -> vtlc::SuperchatRow {
    match t {
        Transformed::Superchat(row) => row,
        other => panic!("expected superchat row, got {:?}", other),
    }
}

#[test]
fn anonymizer_is_deterministic_and_salted() {
    let a = Anonymizer::new("salt-1");
    let b = Anonymizer::new("salt-2");
    assert_eq!(a.hash("UCxyz"), a.hash("UCxyz"));
    assert_ne!(a.hash("UCxyz"), b.hash("UCxyz"));
    assert_ne!(a.hash("UCxyz"), a.hash("UCxy"));
    // sha1 hex
    assert_eq!(a.hash("UCxyz").len(), 40);
    assert!(a.hash("UCxyz").chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn runs_flatten_text_and_emoji() {
    let raw = json!([
        { "text": "hi " },
        { "emoji": { "emojiId": "👋", "shortcuts": [":wave:"] } },
        { "text": " " },
        { "emoji": { "emojiId": "UCxyz/abc", "isCustomEmoji": true } },
    ]);
    let expected = format!("hi 👋 {}", CUSTOM_EMOJI_PLACEHOLDER);
    assert_eq!(flatten_runs(&raw).unwrap(), expected);
    assert_eq!(flatten_runs(&json!([])).unwrap(), "");
    assert!(matches!(flatten_runs(&json!([{ "sticker": {} }])), Err(RecordError::UnknownRun(_))));
    assert!(matches!(flatten_runs(&json!("plain")), Err(RecordError::Malformed { .. })));
}

#[test]
fn membership_follows_epoch() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);

    // before the membership cutover nothing is known, even for member chats
    let early = member_chat_doc("m1", "UCfan", STREAMER, "2021-02-10T00:00:00Z", Some("6 months"));
    assert_eq!(expect_chat(t.chat(&early).unwrap()).membership, MEMBERSHIP_UNKNOWN);

    let tier = member_chat_doc("m2", "UCfan", STREAMER, "2021-04-10T00:00:00Z", Some("6 months"));
    assert_eq!(expect_chat(t.chat(&tier).unwrap()).membership, "6 months");

    let fresh = member_chat_doc("m3", "UCfan", STREAMER, "2021-04-10T00:00:00Z", None);
    assert_eq!(expect_chat(t.chat(&fresh).unwrap()).membership, MEMBERSHIP_NEW);

    let plain = chat_doc("m4", "UCfan", STREAMER, "2021-04-10T00:00:00Z", "hello");
    let row = expect_chat(t.chat(&plain).unwrap());
    assert_eq!(row.membership, MEMBERSHIP_NONE);
    assert!(!row.is_member());
}

#[test]
fn chat_row_is_anonymized_and_flattened() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);
    let mut doc = chat_doc("msg-1", "UCauthor", STREAMER, "2021-04-10T08:30:00.250Z", "hello");
    doc["isModerator"] = json!(true);

    let row = expect_chat(t.chat(&doc).unwrap());
    assert_eq!(row.id, anon.hash("msg-1"));
    assert_eq!(row.channel_id, anon.hash("UCauthor"));
    assert_ne!(row.channel_id, "UCauthor");
    assert_eq!(row.origin_channel_id, STREAMER);
    assert_eq!(row.origin_video_id, "video_1");
    assert_eq!(row.body, "hello");
    assert_eq!((row.is_moderator, row.is_verified), (1, 0));
    assert_eq!(parse_rfc3339(&row.timestamp), parse_rfc3339("2021-04-10T08:30:00.250Z"));
    assert!(row.timestamp.ends_with('Z'));
}

#[test]
fn empty_bodies_and_malformed_documents() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);

    let empty = chat_doc("e1", "UCa", STREAMER, "2021-04-10T00:00:00Z", "");
    assert_eq!(t.chat(&empty).unwrap(), Transformed::Skipped(SkipReason::EmptyBody));

    let mut no_author = chat_doc("e2", "UCa", STREAMER, "2021-04-10T00:00:00Z", "x");
    no_author.as_object_mut().unwrap().remove("authorChannelId");
    let err = t.chat(&no_author).unwrap_err();
    assert!(err.is_recoverable());

    let no_ts = json!({ "id": "e3", "rawMessage": text("x"), "authorChannelId": "UCa" });
    assert!(matches!(t.chat(&no_ts), Err(RecordError::Malformed { field: "timestamp" })));

    // legacy documents carry only timestampUsec
    let mut legacy = chat_doc("e4", "UCa", STREAMER, "", "x");
    legacy.as_object_mut().unwrap().remove("timestamp");
    legacy["timestampUsec"] = json!("1618041600000000");
    assert_eq!(expect_chat(t.chat(&legacy).unwrap()).timestamp, "2021-04-10T08:00:00Z");
}

#[test]
fn superchat_color_and_currency() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);

    let doc = superchat_doc("s1", "UCfan", STREAMER, "2021-04-10T00:00:00Z", 500.0, "¥", "4279592384");
    let row = expect_superchat(t.chat(&doc).unwrap());
    assert_eq!(row.color, "blue");
    assert_eq!(row.significance, 1);
    assert_eq!(row.currency, "JPY");
    assert_eq!(row.amount, 500.0);
    assert_eq!(row.origin_channel, "Streamer A");
    assert_eq!(row.origin_affiliation, "Hololive");
    assert_eq!(row.origin_group, "Gen 1");

    // numeric color code, code currency, unregistered streamer
    let mut doc = superchat_doc("s2", "UCfan", OTHER_STREAMER, "2021-04-10T00:00:00Z", 20.0, "CA$", "x");
    doc["purchase"]["headerBackgroundColor"] = json!(4291821568u64);
    let row = expect_superchat(t.chat(&doc).unwrap());
    assert_eq!((row.color.as_str(), row.significance), ("red", 7));
    assert_eq!(row.currency, "CAD");
    assert_eq!(row.origin_channel, "");
}

#[test]
fn superchats_before_fix_are_dropped() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);
    for ts in ["2021-02-01T00:00:00Z", "2021-03-14T00:00:00Z"] {
        let doc = superchat_doc("s", "UCfan", STREAMER, ts, 500.0, "¥", "4279592384");
        assert_eq!(t.chat(&doc).unwrap(), Transformed::Skipped(SkipReason::UntrustedSuperchat));
    }
}

#[test]
fn unknown_color_and_currency_are_fatal() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), registry());
    let t = Transformer::new(&anon, &epochs, &channels);

    let doc = superchat_doc("s1", "UCfan", STREAMER, "2021-04-10T00:00:00Z", 5.0, "$", "12345");
    let err = t.chat(&doc).unwrap_err();
    assert!(matches!(err, RecordError::UnknownColor(ref c) if c == "12345"));
    assert!(!err.is_recoverable());

    let doc = superchat_doc("s2", "UCfan", STREAMER, "2021-04-10T00:00:00Z", 5.0, "¤", "4279592384");
    let err = t.chat(&doc).unwrap_err();
    assert!(matches!(err, RecordError::UnknownCurrency(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn currency_symbols_map_to_codes() {
    for (sym, code) in [("$", "USD"), ("£", "GBP"), ("€", "EUR"), ("₩", "KRW"), ("A$", "AUD"), ("NT$", "TWD"), ("R$", "BRL")] {
        assert_eq!(canonical_code(sym).unwrap(), code, "symbol {}", sym);
    }
    assert_eq!(canonical_code("SGD").unwrap(), "SGD");
    assert!(canonical_code("sgd").is_err());
    assert!(SuperchatColor::from_header_color("4278237396").map(|c| c.significance()).unwrap() == 2);
}

#[test]
fn ban_and_deletion_projection() {
    let (anon, epochs, channels) = (Anonymizer::new(SALT), EpochTable::default(), ChannelRegistry::default());
    let t = Transformer::new(&anon, &epochs, &channels);

    let ban = t.ban(&ban_doc("UCtroll", STREAMER, Some("2021-04-02T00:00:00Z"))).unwrap();
    assert_eq!(ban.channel_id, anon.hash("UCtroll"));
    assert_eq!(ban.timestamp, "2021-04-02T00:00:00Z");

    let undated = t.ban(&ban_doc("UCtroll", STREAMER, None)).unwrap();
    assert_eq!(undated.timestamp, "");

    let del = t.deletion(&deletion_doc("msg-9", STREAMER, "2021-04-02T00:00:00Z", true)).unwrap();
    assert_eq!(del.id, anon.hash("msg-9"));
    assert_eq!(del.retracted, 1);

    assert!(t.deletion(&json!({ "targetId": "x" })).unwrap_err().is_recoverable());
}
