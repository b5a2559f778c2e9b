//! # Record Codec
//!
//! Byte-exact layouts of the records kept in hook state. All multi-byte
//! integers are big-endian.
//!
//! ## General Info (86 + 10 × milestones bytes, at most 186)
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | campaign state flag                     |
//! | 1      | 1    | owner address length                    |
//! | 2      | 35   | owner address, zero-padded              |
//! | 37     | 8    | fund raise goal                         |
//! | 45     | 8    | fund raise end time                     |
//! | 53     | 8    | total raised                            |
//! | 61     | 8    | total non-refundable                    |
//! | 69     | 8    | total reserve                           |
//! | 77     | 4    | total fund transactions                 |
//! | 81     | 4    | total reject votes (current milestone)  |
//! | 85     | 1    | milestone count                         |
//! | 86     | 10×n | milestones: state(1) end time(8) percent(1) |
//!
//! ## Fund Transactions Page (1 + 49 × occupied slots, at most 246)
//!
//! A one-byte occupancy count followed by the occupied slots, each
//! `id(4) address_len(1) address(35) state(1) amount(8)`.

use crate::errors::{HookError, Result};
use crate::types::{
    Address, Campaign, CampaignState, FundTransaction, FundTransactionState,
    FundTransactionsPage, Milestone, MilestoneState, ADDRESS_MAX_BYTES, MILESTONES_MAX_LENGTH,
};

pub const MILESTONE_BYTES: usize = 10;
pub const GENERAL_INFO_HEADER_BYTES: usize = 86;
pub const GENERAL_INFO_MAX_BYTES: usize =
    GENERAL_INFO_HEADER_BYTES + MILESTONES_MAX_LENGTH * MILESTONE_BYTES;

pub const FUND_TRANSACTIONS_PAGE_SIZE: u32 = 5;
pub const FUND_TRANSACTION_BYTES: usize = 49;
pub const FUND_TRANSACTIONS_PAGE_MAX_BYTES: usize =
    1 + FUND_TRANSACTIONS_PAGE_SIZE as usize * FUND_TRANSACTION_BYTES;

// ── Cursors ──────────────────────────────────────────────────────────

/// Bounds-checked read cursor. Overruns surface as the error produced by
/// the `overrun` constructor instead of reading past the buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    overrun: fn(String) -> HookError,
}

impl<'a> Reader<'a> {
    /// Cursor over a stored record; overruns are [`HookError::CorruptRecord`].
    pub fn record(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overrun: HookError::CorruptRecord,
        }
    }

    /// Cursor over an inbound payload; overruns are [`HookError::MalformedInput`].
    pub fn payload(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overrun: HookError::MalformedInput,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err((self.overrun)(format!(
                "{what}: need {n} bytes at offset {}, {} remaining",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u32(&mut self, what: &str) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_be_bytes(raw))
    }

    pub fn u64(&mut self, what: &str) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_be_bytes(raw))
    }

    /// Length-prefixed address stored in a fixed 35-byte field.
    fn address(&mut self, what: &str) -> Result<Address> {
        let len = self.u8(what)? as usize;
        let padded = self.take(ADDRESS_MAX_BYTES, what)?;
        if len == 0 || len > ADDRESS_MAX_BYTES {
            return Err((self.overrun)(format!("{what}: invalid address length {len}")));
        }
        Address::new(&padded[..len]).map_err(|e| (self.overrun)(e.to_string()))
    }
}

/// Append-only write cursor.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    fn address(&mut self, a: &Address) -> &mut Self {
        self.u8(a.len() as u8).bytes(a.padded())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ── General Info ─────────────────────────────────────────────────────

pub fn encode_general_info(campaign: &Campaign) -> Vec<u8> {
    let mut w = Writer::with_capacity(
        GENERAL_INFO_HEADER_BYTES + campaign.milestones.len() * MILESTONE_BYTES,
    );
    w.u8(campaign.state.to_flag())
        .address(&campaign.owner)
        .u64(campaign.fund_raise_goal)
        .u64(campaign.fund_raise_end_time)
        .u64(campaign.total_raised)
        .u64(campaign.total_non_refundable)
        .u64(campaign.total_reserve)
        .u32(campaign.total_fund_transactions)
        .u32(campaign.total_reject_votes_for_current_milestone)
        .u8(campaign.milestones.len() as u8);
    for m in &campaign.milestones {
        w.u8(m.state as u8).u64(m.end_time).u8(m.payout_percent);
    }
    w.finish()
}

pub fn decode_general_info(buf: &[u8]) -> Result<Campaign> {
    if buf.len() < GENERAL_INFO_HEADER_BYTES {
        return Err(HookError::corrupt(format!(
            "general info is {} bytes, header needs {GENERAL_INFO_HEADER_BYTES}",
            buf.len()
        )));
    }
    let mut r = Reader::record(buf);

    let flag = r.u8("campaign state")?;
    let state = CampaignState::from_flag(flag)
        .ok_or_else(|| HookError::corrupt(format!("unknown campaign state flag {flag:#04x}")))?;
    let owner = r.address("owner")?;
    let fund_raise_goal = r.u64("fund raise goal")?;
    let fund_raise_end_time = r.u64("fund raise end time")?;
    let total_raised = r.u64("total raised")?;
    let total_non_refundable = r.u64("total non-refundable")?;
    let total_reserve = r.u64("total reserve")?;
    let total_fund_transactions = r.u32("total fund transactions")?;
    let total_reject_votes_for_current_milestone = r.u32("total reject votes")?;

    let count = r.u8("milestone count")? as usize;
    if count == 0 || count > MILESTONES_MAX_LENGTH {
        return Err(HookError::corrupt(format!("invalid milestone count {count}")));
    }
    if r.remaining() < count * MILESTONE_BYTES {
        return Err(HookError::corrupt(format!(
            "general info declares {count} milestones but holds {} milestone bytes",
            r.remaining()
        )));
    }

    let mut milestones = Vec::with_capacity(count);
    for _ in 0..count {
        let flag = r.u8("milestone state")?;
        let state = MilestoneState::from_flag(flag)
            .ok_or_else(|| HookError::corrupt(format!("unknown milestone state flag {flag:#04x}")))?;
        milestones.push(Milestone {
            state,
            end_time: r.u64("milestone end time")?,
            payout_percent: r.u8("milestone payout percent")?,
        });
    }

    if total_non_refundable > total_raised {
        return Err(HookError::corrupt(
            "total non-refundable exceeds total raised",
        ));
    }
    if let CampaignState::FailedMilestone(k) = state {
        match milestones.get(k as usize - 1) {
            Some(m) if m.state == MilestoneState::Failed => {}
            Some(_) => {
                return Err(HookError::corrupt(format!(
                    "campaign failed at milestone {k} but that milestone is not marked failed"
                )));
            }
            None => {
                return Err(HookError::corrupt(format!(
                    "campaign failed at milestone {k} but holds {count} milestones"
                )));
            }
        }
    }

    Ok(Campaign {
        state,
        owner,
        fund_raise_goal,
        fund_raise_end_time,
        total_raised,
        total_non_refundable,
        total_reserve,
        total_fund_transactions,
        total_reject_votes_for_current_milestone,
        milestones,
    })
}

// ── Fund Transactions Page ───────────────────────────────────────────

pub fn encode_fund_transactions_page(page: &FundTransactionsPage) -> Vec<u8> {
    let mut w = Writer::with_capacity(1 + page.len() * FUND_TRANSACTION_BYTES);
    w.u8(page.len() as u8);
    for ft in &page.fund_transactions {
        w.u32(ft.id).address(&ft.backer).u8(ft.state as u8).u64(ft.amount);
    }
    w.finish()
}

pub fn decode_fund_transactions_page(buf: &[u8]) -> Result<FundTransactionsPage> {
    let mut r = Reader::record(buf);
    let count = r.u8("page occupancy")? as usize;
    if count > FUND_TRANSACTIONS_PAGE_SIZE as usize {
        return Err(HookError::corrupt(format!(
            "page occupancy {count} exceeds page size {FUND_TRANSACTIONS_PAGE_SIZE}"
        )));
    }
    if r.remaining() < count * FUND_TRANSACTION_BYTES {
        return Err(HookError::corrupt(format!(
            "page declares {count} slots but holds {} slot bytes",
            r.remaining()
        )));
    }

    let mut fund_transactions = Vec::with_capacity(count);
    for _ in 0..count {
        let id = r.u32("fund transaction id")?;
        let backer = r.address("backer")?;
        let flag = r.u8("fund transaction state")?;
        let state = FundTransactionState::from_flag(flag).ok_or_else(|| {
            HookError::corrupt(format!("unknown fund transaction state flag {flag:#04x}"))
        })?;
        let amount = r.u64("fund transaction amount")?;
        fund_transactions.push(FundTransaction {
            id,
            backer,
            state,
            amount,
        });
    }
    Ok(FundTransactionsPage { fund_transactions })
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
