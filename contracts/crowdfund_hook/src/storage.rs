//! # Storage
//!
//! Addressing scheme over the host's fixed-capacity key/value store, plus
//! typed load helpers used by the lifecycle and voting components.
//!
//! ## Keys
//!
//! Every key is 32 bytes: a 28-byte namespace flag followed by the 4-byte
//! big-endian campaign identifier.
//!
//! | Namespace flag                         | Record                      |
//! |----------------------------------------|-----------------------------|
//! | `00…00`                                | General Info                |
//! | `00…19 + page_index` (224-bit add)     | Fund Transactions page      |
//!
//! Page flags occupy the range from the page base up to `FF…FF`, so they can
//! never collide with the General Info flag or with each other.
//!
//! ## Writes
//!
//! Nothing here writes to the store. Operations return [`StateWrite`]s which
//! the host applies once every validation of the invocation has passed.

use std::collections::BTreeMap;

use tracing::debug;

use crate::codec::{
    decode_fund_transactions_page, decode_general_info, encode_fund_transactions_page,
    encode_general_info, FUND_TRANSACTIONS_PAGE_SIZE,
};
use crate::errors::{HookError, Result};
use crate::types::{Campaign, FundTransaction, FundTransactionsPage};

pub const NAMESPACE_FLAG_BYTES: usize = 28;
pub const STATE_KEY_BYTES: usize = 32;

// ── Namespace flags ──────────────────────────────────────────────────

/// 224-bit big-endian namespace selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceFlag(pub [u8; NAMESPACE_FLAG_BYTES]);

impl NamespaceFlag {
    pub const GENERAL_INFO: Self = Self([0u8; NAMESPACE_FLAG_BYTES]);

    pub const FUND_TRANSACTIONS_PAGE_START: Self = {
        let mut flag = [0u8; NAMESPACE_FLAG_BYTES];
        flag[NAMESPACE_FLAG_BYTES - 1] = 0x19;
        Self(flag)
    };

    pub const FUND_TRANSACTIONS_PAGE_END: Self = Self([0xFF; NAMESPACE_FLAG_BYTES]);

    /// Flag of the `page_index`-th Fund Transactions page.
    pub fn fund_transactions_page(page_index: u32) -> Self {
        Self::FUND_TRANSACTIONS_PAGE_START.add_u32(page_index)
    }

    /// Unsigned 224-bit addition with carry propagation.
    pub fn add_u32(&self, value: u32) -> Self {
        let mut addend = [0u8; NAMESPACE_FLAG_BYTES];
        addend[NAMESPACE_FLAG_BYTES - 4..].copy_from_slice(&value.to_be_bytes());

        let mut out = [0u8; NAMESPACE_FLAG_BYTES];
        let mut carry = 0u16;
        for i in (0..NAMESPACE_FLAG_BYTES).rev() {
            let sum = self.0[i] as u16 + addend[i] as u16 + carry;
            out[i] = (sum & 0xFF) as u8;
            carry = sum >> 8;
        }
        Self(out)
    }

    pub fn is_fund_transactions_page(&self) -> bool {
        *self >= Self::FUND_TRANSACTIONS_PAGE_START && *self <= Self::FUND_TRANSACTIONS_PAGE_END
    }

    /// Inverse of [`Self::fund_transactions_page`]; `None` for flags outside
    /// the page range or beyond a 32-bit page index.
    pub fn page_index(&self) -> Option<u32> {
        if !self.is_fund_transactions_page() {
            return None;
        }
        let mut diff = [0u8; NAMESPACE_FLAG_BYTES];
        let mut borrow = 0i16;
        for i in (0..NAMESPACE_FLAG_BYTES).rev() {
            let mut d = self.0[i] as i16 - Self::FUND_TRANSACTIONS_PAGE_START.0[i] as i16 - borrow;
            borrow = 0;
            if d < 0 {
                d += 256;
                borrow = 1;
            }
            diff[i] = d as u8;
        }
        if diff[..NAMESPACE_FLAG_BYTES - 4].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 4];
        low.copy_from_slice(&diff[NAMESPACE_FLAG_BYTES - 4..]);
        Some(u32::from_be_bytes(low))
    }
}

// ── Keys ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey(pub [u8; STATE_KEY_BYTES]);

impl StateKey {
    /// `namespace_flag ‖ campaign_id` by direct concatenation.
    pub fn derive(flag: &NamespaceFlag, campaign_id: u32) -> Self {
        let mut key = [0u8; STATE_KEY_BYTES];
        key[..NAMESPACE_FLAG_BYTES].copy_from_slice(&flag.0);
        key[NAMESPACE_FLAG_BYTES..].copy_from_slice(&campaign_id.to_be_bytes());
        Self(key)
    }

    pub fn general_info(campaign_id: u32) -> Self {
        Self::derive(&NamespaceFlag::GENERAL_INFO, campaign_id)
    }

    pub fn fund_transactions_page(campaign_id: u32, page_index: u32) -> Self {
        Self::derive(&NamespaceFlag::fund_transactions_page(page_index), campaign_id)
    }

    pub fn namespace_flag(&self) -> NamespaceFlag {
        let mut flag = [0u8; NAMESPACE_FLAG_BYTES];
        flag.copy_from_slice(&self.0[..NAMESPACE_FLAG_BYTES]);
        NamespaceFlag(flag)
    }

    pub fn campaign_id(&self) -> u32 {
        let mut id = [0u8; 4];
        id.copy_from_slice(&self.0[NAMESPACE_FLAG_BYTES..]);
        u32::from_be_bytes(id)
    }

    pub fn from_slice(raw: &[u8]) -> Option<Self> {
        let key: [u8; STATE_KEY_BYTES] = raw.try_into().ok()?;
        Some(Self(key))
    }
}

/// Page placement of a pledge: `(page_index, slot)`.
pub fn page_of(fund_transaction_id: u32) -> (u32, usize) {
    (
        fund_transaction_id / FUND_TRANSACTIONS_PAGE_SIZE,
        (fund_transaction_id % FUND_TRANSACTIONS_PAGE_SIZE) as usize,
    )
}

// ── Store access ─────────────────────────────────────────────────────

/// Read side of the host's key/value store.
pub trait HookState {
    fn get(&self, key: &StateKey) -> Option<Vec<u8>>;
}

/// A deferred store write produced by a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateWrite {
    pub key: StateKey,
    pub value: Vec<u8>,
}

impl StateWrite {
    pub fn general_info(campaign_id: u32, campaign: &Campaign) -> Self {
        Self {
            key: StateKey::general_info(campaign_id),
            value: encode_general_info(campaign),
        }
    }

    pub fn fund_transactions_page(
        campaign_id: u32,
        page_index: u32,
        page: &FundTransactionsPage,
    ) -> Self {
        Self {
            key: StateKey::fund_transactions_page(campaign_id, page_index),
            value: encode_fund_transactions_page(page),
        }
    }
}

/// In-memory store with a fixed entry capacity.
///
/// Used as the per-invocation snapshot by the host and as the store in tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    entries: BTreeMap<StateKey, Vec<u8>>,
    capacity: Option<usize>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: Some(capacity),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (StateKey, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            capacity: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&StateKey, &Vec<u8>)> {
        self.entries.iter()
    }

    /// Apply all writes or none. New keys beyond the capacity fail the
    /// whole batch with [`HookError::StorageFailure`].
    pub fn apply(&mut self, writes: &[StateWrite]) -> Result<()> {
        if let Some(capacity) = self.capacity {
            let mut new_keys: Vec<&StateKey> = writes
                .iter()
                .map(|w| &w.key)
                .filter(|k| !self.entries.contains_key(k))
                .collect();
            new_keys.sort();
            new_keys.dedup();
            if self.entries.len() + new_keys.len() > capacity {
                return Err(HookError::StorageFailure(format!(
                    "insufficient reserve: {} entries used of {capacity}, {} new requested",
                    self.entries.len(),
                    new_keys.len()
                )));
            }
        }
        for w in writes {
            self.entries.insert(w.key, w.value.clone());
        }
        Ok(())
    }
}

impl HookState for MemoryState {
    fn get(&self, key: &StateKey) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }
}

// ── Typed loads ──────────────────────────────────────────────────────

pub fn load_campaign(state: &impl HookState, campaign_id: u32) -> Result<Option<Campaign>> {
    match state.get(&StateKey::general_info(campaign_id)) {
        Some(buf) => {
            debug!(campaign_id, bytes = buf.len(), "loaded general info");
            decode_general_info(&buf).map(Some)
        }
        None => Ok(None),
    }
}

/// Load a campaign that must exist.
pub fn require_campaign(state: &impl HookState, campaign_id: u32) -> Result<Campaign> {
    load_campaign(state, campaign_id)?
        .ok_or_else(|| HookError::not_found(format!("no campaign found with id {campaign_id}")))
}

pub fn load_page(
    state: &impl HookState,
    campaign_id: u32,
    page_index: u32,
) -> Result<Option<FundTransactionsPage>> {
    match state.get(&StateKey::fund_transactions_page(campaign_id, page_index)) {
        Some(buf) => {
            debug!(campaign_id, page_index, bytes = buf.len(), "loaded fund transactions page");
            decode_fund_transactions_page(&buf).map(Some)
        }
        None => Ok(None),
    }
}

/// A pledge together with the page that holds it, ready to be mutated and
/// written back.
pub struct PledgeSlot {
    pub page_index: u32,
    pub slot: usize,
    pub page: FundTransactionsPage,
}

impl PledgeSlot {
    pub fn pledge(&self) -> &FundTransaction {
        &self.page.fund_transactions[self.slot]
    }

    pub fn pledge_mut(&mut self) -> &mut FundTransaction {
        &mut self.page.fund_transactions[self.slot]
    }
}

/// Locate pledge `fund_transaction_id`, checking that the stored slot
/// carries the same id.
pub fn require_pledge(
    state: &impl HookState,
    campaign_id: u32,
    fund_transaction_id: u32,
) -> Result<PledgeSlot> {
    let (page_index, slot) = page_of(fund_transaction_id);
    let page = load_page(state, campaign_id, page_index)?.ok_or_else(|| {
        HookError::not_found(format!(
            "fund transaction {fund_transaction_id} doesn't exist for campaign {campaign_id}"
        ))
    })?;
    match page.slot(slot) {
        Some(ft) if ft.id == fund_transaction_id => Ok(PledgeSlot {
            page_index,
            slot,
            page,
        }),
        Some(ft) => Err(HookError::corrupt(format!(
            "slot {slot} of page {page_index} holds id {} instead of {fund_transaction_id}",
            ft.id
        ))),
        None => Err(HookError::not_found(format!(
            "fund transaction {fund_transaction_id} doesn't exist for campaign {campaign_id}"
        ))),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
