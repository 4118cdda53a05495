#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use time::macros::datetime;
use vtlc::{
    BanRow, ChatRow, DeletionRow, DocumentSource, DumpSource, MemorySource, SuperchatRow, Table, TableFormat,
    BAN_ACTIONS, CHATS, DELETE_ACTIONS,
};

fn april_only(base: &std::path::Path) -> vtlc::Vtlc {
    vtlc_in(base).range(Some(datetime!(2021-04-01 0:00 UTC)), Some(datetime!(2021-05-01 0:00 UTC)))
}

#[test]
fn april_window_writes_only_april_chats() {
    let base = scratch();
    let source = MemorySource::new().with_collection(
        CHATS,
        [
            chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "first"),
            chat_doc("c2", "UCb", STREAMER, "2021-04-15T12:00:00Z", "second"),
            chat_doc("c3", "UCa", STREAMER, "2021-05-02T00:00:00Z", "may"),
        ],
    );

    let summary = april_only(base.path()).generate(&source).unwrap();
    assert_eq!(summary.windows, 1);
    assert_eq!(summary.chats, 2);

    let ds = dataset(base.path());
    let april = ds.join("chats_2021-04.csv");
    let rows = read_records(&april);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["body"], "first");
    assert_eq!(rows[1]["body"], "second");
    assert!(!ds.join("chats_2021-05.csv").exists());
    // superchat table exists even when empty
    assert_eq!(read_records(&ds.join("superchats_2021-04.csv")).len(), 0);
    // staging directory holds nothing once the run finished
    assert_eq!(std::fs::read_dir(ds.join("_staging")).unwrap().count(), 0);
}

#[test]
fn tables_keep_fixed_column_order() {
    let base = scratch();
    let source = MemorySource::new()
        .with_collection(CHATS, [chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "hi")])
        .with_collection(BAN_ACTIONS, [ban_doc("UCa", STREAMER, Some("2021-04-02T00:00:00Z"))])
        .with_collection(DELETE_ACTIONS, [deletion_doc("c1", STREAMER, "2021-04-02T00:00:00Z", false)]);
    april_only(base.path()).generate(&source).unwrap();

    let ds = dataset(base.path());
    assert_eq!(header_of(&ds.join("chats_2021-04.csv")), ChatRow::COLUMNS);
    assert_eq!(header_of(&ds.join("superchats_2021-04.csv")), SuperchatRow::COLUMNS);
    assert_eq!(header_of(&ds.join("ban_events.csv")), BanRow::COLUMNS);
    assert_eq!(header_of(&ds.join("deletion_events.csv")), DeletionRow::COLUMNS);
    assert_eq!(
        ChatRow::COLUMNS,
        ["timestamp", "body", "membership", "isModerator", "isVerified", "id", "channelId", "originVideoId", "originChannelId"]
    );
}

#[test]
fn superchats_split_out_and_pre_fix_dropped() {
    let base = scratch();
    let source = MemorySource::new().with_collection(
        CHATS,
        [
            chat_doc("c1", "UCa", STREAMER, "2021-03-14T00:00:00Z", "hi"),
            superchat_doc("s0", "UCa", STREAMER, "2021-03-14T01:00:00Z", 500.0, "¥", "4279592384"),
            superchat_doc("s1", "UCa", STREAMER, "2021-03-20T00:00:00Z", 500.0, "¥", "4279592384"),
        ],
    );
    let summary = vtlc_in(base.path())
        .range(Some(datetime!(2021-03-01 0:00 UTC)), Some(datetime!(2021-04-01 0:00 UTC)))
        .generate(&source)
        .unwrap();
    assert_eq!(summary.untrusted_superchats, 1);
    assert_eq!(summary.superchats, 1);

    let ds = dataset(base.path());
    let chats = read_records(&ds.join("chats_2021-03.csv"));
    assert_eq!(chats.len(), 1, "superchats never land in the chat table");
    let scs = read_records(&ds.join("superchats_2021-03.csv"));
    assert_eq!(scs.len(), 1);
    assert_eq!(scs[0]["color"], "blue");
    assert_eq!(scs[0]["significance"], "1");
    assert_eq!(scs[0]["currency"], "JPY");
}

#[test]
fn superchats_collection_is_not_read() {
    let base = scratch();
    let source = MemorySource::new()
        .with_collection(CHATS, [chat_doc("c1", "UCa", STREAMER, "2021-04-03T00:00:00Z", "hi")])
        .with_collection(
            "superchats",
            [json!({ "id": "s1", "timestamp": "2021-04-04T00:00:00Z", "authorChannelId": "UCb",
                     "originVideoId": "v", "originChannelId": STREAMER, "rawMessage": text("split out"),
                     "amount": 5.0, "currency": "USD", "color": "green" })],
        );
    let summary = april_only(base.path()).generate(&source).unwrap();
    assert_eq!(summary.chats, 1);
    assert_eq!(summary.superchats, 0);

    let ds = dataset(base.path());
    let chats = read_records(&ds.join("chats_2021-04.csv"));
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["body"], "hi");
    assert!(read_records(&ds.join("superchats_2021-04.csv")).is_empty());
}

#[test]
fn malformed_documents_are_skipped() {
    let base = scratch();
    let source = MemorySource::new().with_collection(
        CHATS,
        [
            chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "ok"),
            json!({ "id": "c2", "timestamp": "2021-04-02T00:00:00Z", "rawMessage": text("no author") }),
            json!({ "id": "c3", "timestamp": "2021-04-02T00:00:00Z", "authorChannelId": "UCa",
                    "originVideoId": "v", "originChannelId": STREAMER, "rawMessage": [{ "sticker": {} }] }),
            chat_doc("c4", "UCa", STREAMER, "2021-04-03T00:00:00Z", ""),
            chat_doc("c5", "UCa", STREAMER, "2021-04-04T00:00:00Z", "ok again"),
        ],
    );
    let summary = april_only(base.path()).generate(&source).unwrap();
    assert_eq!(summary.chats, 2);
    assert_eq!(summary.malformed, 2);
    assert_eq!(summary.empty_bodies, 1);
}

#[test]
fn unknown_color_aborts_without_clobbering() {
    let base = scratch();
    let ds = dataset(base.path());
    let good = MemorySource::new()
        .with_collection(CHATS, [chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "kept")]);
    april_only(base.path()).generate(&good).unwrap();

    let bad = MemorySource::new().with_collection(
        CHATS,
        [
            chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "replacement"),
            superchat_doc("s1", "UCa", STREAMER, "2021-04-02T00:00:00Z", 5.0, "$", "999"),
        ],
    );
    let err = april_only(base.path()).generate(&bad).unwrap_err();
    assert!(format!("{:#}", err).contains("999"));

    // the finished table from the previous run is untouched
    let rows = read_records(&ds.join("chats_2021-04.csv"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["body"], "kept");
}

#[test]
fn generate_requires_salt() {
    let base = scratch();
    let err = vtlc_in(base.path()).salt("").generate(&MemorySource::new()).unwrap_err();
    assert!(err.to_string().contains("salt"));
}

#[test]
fn moderation_tables_cover_all_history() {
    let base = scratch();
    let source = MemorySource::new()
        .with_collection(
            BAN_ACTIONS,
            [
                ban_doc("UCt1", STREAMER, Some("2021-02-02T00:00:00Z")),
                ban_doc("UCt2", STREAMER, None),
                json!({ "channelId": "UCt3" }),
            ],
        )
        .with_collection(
            DELETE_ACTIONS,
            [
                deletion_doc("m1", STREAMER, "2021-04-02T00:00:00Z", false),
                deletion_doc("m2", STREAMER, "2021-04-03T00:00:00Z", true),
            ],
        );
    let summary = april_only(base.path()).generate(&source).unwrap();
    assert_eq!(summary.bans, 2, "malformed ban skipped, undated ban kept");
    assert_eq!(summary.deletions, 2);

    let bans = read_records(&dataset(base.path()).join("ban_events.csv"));
    assert_eq!(bans[1]["timestamp"], "");
    let dels = read_records(&dataset(base.path()).join("deletion_events.csv"));
    assert_eq!(dels[1]["retracted"], "1");
}

#[test]
fn compressed_output_and_dump_source() {
    let base = scratch();
    let dump = base.path().join("dump");
    write_zst_lines(
        &dump.join("chats.jsonl.zst"),
        &[
            chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "from dump").to_string(),
            "{not json".to_string(),
            json!({ "id": "c2", "timestamp": { "$date": { "$numberLong": "1618012800000" } },
                    "rawMessage": text("extended json"), "authorChannelId": "UCb",
                    "originVideoId": "v", "originChannelId": STREAMER }).to_string(),
        ],
    );
    let source = DumpSource::new(&dump);
    let summary = april_only(base.path()).format(TableFormat::CsvZst).generate(&source).unwrap();
    assert_eq!(summary.chats, 2);

    let table = dataset(base.path()).join("chats_2021-04.csv.zst");
    let rows = read_records(&table);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["body"], "extended json");
    assert_eq!(rows[1]["timestamp"], "2021-04-10T00:00:00Z");
}

#[test]
fn dump_lines_with_invalid_utf8_are_skipped() {
    let base = scratch();
    let dump = base.path().join("dump");
    std::fs::create_dir_all(&dump).unwrap();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "before").to_string().as_bytes());
    bytes.extend_from_slice(b"\n{\"id\":\"\xff\xfe\"}\r\n");
    bytes.extend_from_slice(chat_doc("c3", "UCa", STREAMER, "2021-04-02T00:00:00Z", "after").to_string().as_bytes());
    bytes.push(b'\n');
    std::fs::write(dump.join("chats.jsonl"), bytes).unwrap();

    let summary = april_only(base.path()).generate(&DumpSource::new(&dump)).unwrap();
    assert_eq!(summary.chats, 2);
    let rows = read_records(&dataset(base.path()).join("chats_2021-04.csv"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["body"], "after");
}

#[test]
fn dump_estimate_does_not_decode() {
    let base = scratch();
    let dump = base.path().join("dump");
    std::fs::create_dir_all(&dump).unwrap();
    // not a zstd frame: any attempt to decode it would fail
    std::fs::write(dump.join("chats.jsonl.zst"), b"definitely not zstd").unwrap();
    let lines: Vec<String> = (0..10)
        .map(|i| chat_doc(&format!("b{i}"), "UCa", STREAMER, "2021-04-01T00:00:00Z", "x").to_string())
        .collect();
    std::fs::write(dump.join("banactions.jsonl"), lines.join("\n") + "\n").unwrap();

    let source = DumpSource::new(&dump);
    assert_eq!(source.estimated_count(CHATS).unwrap(), None);
    assert_eq!(source.estimated_count(BAN_ACTIONS).unwrap(), Some(10));
    assert_eq!(source.estimated_count(DELETE_ACTIONS).unwrap(), Some(0));
}

#[test]
fn rerun_replaces_finished_tables_in_place() {
    let base = scratch();
    let ds = dataset(base.path());
    let first = MemorySource::new()
        .with_collection(CHATS, [chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "first run")]);
    april_only(base.path()).generate(&first).unwrap();

    let second = MemorySource::new().with_collection(
        CHATS,
        [
            chat_doc("c1", "UCa", STREAMER, "2021-04-01T00:00:00Z", "second run"),
            chat_doc("c2", "UCb", STREAMER, "2021-04-02T00:00:00Z", "second run too"),
        ],
    );
    april_only(base.path()).generate(&second).unwrap();

    let rows = read_records(&ds.join("chats_2021-04.csv"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["body"], "second run");
    assert_eq!(std::fs::read_dir(ds.join("_staging")).unwrap().count(), 0);
}
