//! # Types
//!
//! Records owned by a campaign identifier and the state flags stored with them.
//!
//! ## Campaign lifecycle
//!
//! Only the failure and completion points are written to the store. While the
//! stored flag is [`CampaignState::Derive`], the effective phase is computed
//! from the ledger clock (see [`crate::lifecycle::derive_campaign_phase`]):
//!
//! ```text
//! FundRaise ──► Milestone(1) ──► … ──► Milestone(N) ──► Completed
//!     │               │                     │
//!     ▼               ▼                     ▼
//! FailedFundRaise  FailedMilestone(1)   FailedMilestone(N)
//! ```
//!
//! `Completed` and `FailedMilestone(k)` are terminal for voting and payouts.
//! Refunds stay available from the failed phases.

use std::fmt;
use std::str::FromStr;

use crate::errors::{HookError, Result};

/// Maximum encoded length of a ledger address.
pub const ADDRESS_MAX_BYTES: usize = 35;
/// Maximum number of milestones embedded in a campaign.
pub const MILESTONES_MAX_LENGTH: usize = 10;

// ── Addresses ────────────────────────────────────────────────────────

/// A variable-length ledger address (1..=35 bytes), kept inline so that
/// records can be copied without allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    len: u8,
    bytes: [u8; ADDRESS_MAX_BYTES],
}

impl Address {
    pub fn new(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() || raw.len() > ADDRESS_MAX_BYTES {
            return Err(HookError::malformed(format!(
                "address must be between 1 and {ADDRESS_MAX_BYTES} bytes, got {}",
                raw.len()
            )));
        }
        let mut bytes = [0u8; ADDRESS_MAX_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The zero-padded 35-byte form written into records.
    pub fn padded(&self) -> &[u8; ADDRESS_MAX_BYTES] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromStr for Address {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

// ── State flags ──────────────────────────────────────────────────────

/// Stored campaign flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CampaignState {
    /// Fund raising; the effective phase is derived from the clock.
    Derive,
    /// Failed while milestone `k` (1-based) was being evaluated.
    FailedMilestone(u8),
    /// Every milestone has been paid out.
    Completed,
}

impl CampaignState {
    const DERIVE_FLAG: u8 = 0x00;
    const COMPLETED_FLAG: u8 = 0x0B;

    pub fn to_flag(self) -> u8 {
        match self {
            Self::Derive => Self::DERIVE_FLAG,
            Self::FailedMilestone(k) => k,
            Self::Completed => Self::COMPLETED_FLAG,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            Self::DERIVE_FLAG => Some(Self::Derive),
            1..=10 => Some(Self::FailedMilestone(flag)),
            Self::COMPLETED_FLAG => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MilestoneState {
    Unstarted = 0x00,
    InProgress = 0x01,
    Failed = 0x02,
    Paid = 0x03,
}

impl MilestoneState {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0x00 => Some(Self::Unstarted),
            0x01 => Some(Self::InProgress),
            0x02 => Some(Self::Failed),
            0x03 => Some(Self::Paid),
            _ => None,
        }
    }
}

/// Vote/refund status of a pledge. New pledges start as `Approve`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FundTransactionState {
    Reject = 0x00,
    Approve = 0x01,
    Refunded = 0x02,
}

impl FundTransactionState {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0x00 => Some(Self::Reject),
            0x01 => Some(Self::Approve),
            0x02 => Some(Self::Refunded),
            _ => None,
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// A scheduled phase gating a percentage payout. Embedded in [`Campaign`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Milestone {
    pub state: MilestoneState,
    pub end_time: u64,
    /// Share of `total_raised` released for this milestone (1..=100).
    pub payout_percent: u8,
}

/// The General-Info record of one campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Campaign {
    pub state: CampaignState,
    pub owner: Address,
    pub fund_raise_goal: u64,
    pub fund_raise_end_time: u64,
    pub total_raised: u64,
    pub total_non_refundable: u64,
    pub total_reserve: u64,
    /// Number of pledges; also the id of the next pledge.
    pub total_fund_transactions: u32,
    pub total_reject_votes_for_current_milestone: u32,
    pub milestones: Vec<Milestone>,
}

impl Campaign {
    /// Index of the milestone whose `end_time` is the first to exceed `now`.
    pub fn current_milestone_index(&self, now: u64) -> Option<usize> {
        self.milestones.iter().position(|m| m.end_time > now)
    }

    pub fn last_milestone_end_time(&self) -> u64 {
        self.milestones.last().map(|m| m.end_time).unwrap_or(0)
    }

    pub fn goal_reached(&self) -> bool {
        self.total_raised >= self.fund_raise_goal
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, CampaignState::FailedMilestone(_))
    }
}

/// One backer's contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FundTransaction {
    pub id: u32,
    pub backer: Address,
    pub state: FundTransactionState,
    /// Net of the per-pledge deposit.
    pub amount: u64,
}

/// A densely filled page of pledges; slot `i` holds the pledge with id
/// `page_index * FUND_TRANSACTIONS_PAGE_SIZE + i`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FundTransactionsPage {
    pub fund_transactions: Vec<FundTransaction>,
}

impl FundTransactionsPage {
    pub fn slot(&self, slot: usize) -> Option<&FundTransaction> {
        self.fund_transactions.get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut FundTransaction> {
        self.fund_transactions.get_mut(slot)
    }

    pub fn len(&self) -> usize {
        self.fund_transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fund_transactions.is_empty()
    }
}
