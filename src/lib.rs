mod config;
mod date;
mod paths;
mod zstd_jsonl;
mod table;
mod rows;

mod window;
mod epoch;
mod anonymize;
mod message;
mod superchat;
mod transform;
mod channels;
mod source;
mod currency;
mod error;

mod progress;
mod util;
mod mem;
mod pipeline;
mod aggregate;
mod postprocess;

pub use crate::config::{PipelineOptions, DEFAULT_DATASET_NAME};
pub use crate::date::{format_timestamp, iter_year_months, parse_rfc3339, YearMonth};
pub use crate::pipeline::{GenerateSummary, Vtlc, WindowSummary};
pub use crate::window::{MonthWindow, TimeRange, Windows};
pub use crate::epoch::{EpochPolicy, EpochTable, MembershipInfo, SuperchatInfo, GENESIS, MEMBERSHIP_CUTOVER, SUPERCHAT_FIX};
pub use crate::anonymize::Anonymizer;
pub use crate::message::{flatten_runs, CUSTOM_EMOJI_PLACEHOLDER};
pub use crate::superchat::SuperchatColor;
pub use crate::transform::{SkipReason, Transformed, Transformer};
pub use crate::channels::{Channel, ChannelRegistry};
pub use crate::error::RecordError;

// rows and table files
pub use crate::rows::{
    BanRow, ChatRow, ChatStatRow, DeletionRow, SuperchatRow, SuperchatStatRow, MEMBERSHIP_NEW, MEMBERSHIP_NONE,
    MEMBERSHIP_UNKNOWN,
};
pub use crate::table::{open_table, read_rows, Table, TableFormat, TableWriter};
pub use crate::paths::{
    discover_monthly, find_table, plan_tables, MonthlyTable, TableKind, BAN_EVENTS, CHAT_STATS, DELETION_EVENTS,
    SUPERCHAT_STATS,
};

// document sources
pub use crate::source::{DocumentSource, DumpSource, MemorySource, BAN_ACTIONS, CHATS, DELETE_ACTIONS};

// currency normalization
pub use crate::currency::{
    canonical_code, CurrencyNormalizer, HttpRateProvider, RateCache, RateProvider, DEFAULT_RATE_BACKOFF,
    DEFAULT_REFERENCE_CURRENCY,
};

// stats and postprocess
pub use crate::aggregate::{
    aggregate_table, aggregate_tables, Aggregator, ChatAggregator, ModerationIndex, PricedSuperchat, StatsSummary, SuperchatAggregator,
};
pub use crate::postprocess::DEFAULT_POSTPROCESS_MATCHER;

// progress and memory helpers for the binary
pub use crate::progress::make_count_progress;
pub use crate::mem::{available_memory_fraction, is_low_memory};

//export robust file ops from util so binaries can import from crate root.
pub use crate::util::{init_tracing_once, replace_file_atomic_backoff};
