//! Historical schema epochs of the chat collection.
//!
//! The collector changed what it stored over time. Each epoch starts at a fixed
//! boundary and carries the policy for records stamped inside it; resolution is a
//! step function of the record timestamp.

use anyhow::{bail, Result};
use time::macros::datetime;
use time::OffsetDateTime;

/// First record ever collected (2021-01-15T05:15:33.293Z).
pub const GENESIS: OffsetDateTime = datetime!(2021-01-15 05:15:33.293 UTC);

/// Membership and purchase metadata were not stored before this instant.
pub const MEMBERSHIP_CUTOVER: OffsetDateTime = datetime!(2021-03-13 21:23:14 UTC);

/// Superchat amount and color were stored with a wrong encoding before this instant.
pub const SUPERCHAT_FIX: OffsetDateTime = datetime!(2021-03-15 23:19:32.123 UTC);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipInfo {
    /// Reported as "unknown" regardless of what the document says.
    Unknown,
    Known,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuperchatInfo {
    /// Amount/color mapping is wrong; the superchat must not be emitted.
    Untrusted,
    Trusted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochPolicy {
    pub membership: MembershipInfo,
    pub superchat: SuperchatInfo,
}

impl EpochPolicy {
    pub const LEGACY: Self = Self { membership: MembershipInfo::Unknown, superchat: SuperchatInfo::Untrusted };
    pub const BROKEN_SUPERCHAT: Self = Self { membership: MembershipInfo::Known, superchat: SuperchatInfo::Untrusted };
    pub const CURRENT: Self = Self { membership: MembershipInfo::Known, superchat: SuperchatInfo::Trusted };
}

/// Ordered `(boundary, policy)` pairs. Records older than the first boundary
/// fall under `before_first`.
#[derive(Clone, Debug)]
pub struct EpochTable {
    before_first: EpochPolicy,
    entries: Vec<(OffsetDateTime, EpochPolicy)>,
}

impl EpochTable {
    /// Boundaries must be strictly ascending.
    pub fn new(before_first: EpochPolicy, entries: Vec<(OffsetDateTime, EpochPolicy)>) -> Result<Self> {
        for pair in entries.windows(2) {
            if pair[0].0 >= pair[1].0 {
                bail!("epoch boundaries out of order: {} >= {}", pair[0].0, pair[1].0);
            }
        }
        Ok(Self { before_first, entries })
    }

    pub fn resolve(&self, ts: OffsetDateTime) -> EpochPolicy {
        // number of boundaries at or before `ts`
        let idx = self.entries.partition_point(|(boundary, _)| *boundary <= ts);
        if idx == 0 {
            self.before_first
        } else {
            self.entries[idx - 1].1
        }
    }

    pub fn boundaries(&self) -> impl Iterator<Item = OffsetDateTime> + '_ {
        self.entries.iter().map(|(b, _)| *b)
    }
}

impl Default for EpochTable {
    fn default() -> Self {
        Self {
            before_first: EpochPolicy::LEGACY,
            entries: vec![
                (MEMBERSHIP_CUTOVER, EpochPolicy::BROKEN_SUPERCHAT),
                (SUPERCHAT_FIX, EpochPolicy::CURRENT),
            ],
        }
    }
}
