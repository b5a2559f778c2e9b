//! JSON shapes for campaigns and raw hook state.
//!
//! Campaign views decode the stored records and attach the phases derived
//! from the ledger clock, so clients never need to know the byte layouts.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crowdfund_hook::codec::FUND_TRANSACTIONS_PAGE_SIZE;
use crowdfund_hook::finance::milestone_payout;
use crowdfund_hook::lifecycle::{
    derive_campaign_phase, derive_milestone_phases, CampaignPhase, MilestonePhase,
};
use crowdfund_hook::storage::{load_campaign, load_page, NamespaceFlag};
use crowdfund_hook::types::MilestoneState;
use crowdfund_hook::{CampaignState, FundTransactionState, MemoryState, Result, StateKey};
use serde::Serialize;

use crate::db::StateRow;

#[derive(Debug, Serialize)]
pub struct CampaignView {
    pub campaign_id: u32,
    pub state: String,
    pub phase: String,
    pub owner: String,
    pub fund_raise_goal: u64,
    pub fund_raise_end_time: u64,
    pub total_raised: u64,
    pub total_non_refundable: u64,
    pub total_reserve: u64,
    pub total_fund_transactions: u32,
    pub total_reject_votes_for_current_milestone: u32,
    pub milestones: Vec<MilestoneView>,
    pub fund_transactions: Vec<FundTransactionView>,
}

#[derive(Debug, Serialize)]
pub struct MilestoneView {
    pub index: usize,
    pub state: &'static str,
    pub phase: &'static str,
    pub end_time: u64,
    pub payout_percent: u8,
    pub payout_amount: u64,
}

#[derive(Debug, Serialize)]
pub struct FundTransactionView {
    pub id: u32,
    pub backer: String,
    pub state: &'static str,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct StateEntryView {
    /// Hex of the 32-byte key.
    pub key: String,
    pub campaign_id: u32,
    pub namespace: &'static str,
    pub page_index: Option<u32>,
    /// Base64 of the raw record.
    pub value: String,
    pub size: usize,
}

fn campaign_state_label(state: CampaignState) -> String {
    match state {
        CampaignState::Derive => "derive".to_string(),
        CampaignState::FailedMilestone(k) => format!("failed_milestone_{k}"),
        CampaignState::Completed => "completed".to_string(),
    }
}

fn campaign_phase_label(phase: CampaignPhase) -> String {
    match phase {
        CampaignPhase::FundRaise => "fund_raise".to_string(),
        CampaignPhase::FailedFundRaise => "failed_fund_raise".to_string(),
        CampaignPhase::Milestone(k) => format!("milestone_{k}"),
        CampaignPhase::FailedMilestone(k) => format!("failed_milestone_{k}"),
        CampaignPhase::Completed => "completed".to_string(),
    }
}

fn milestone_state_label(state: MilestoneState) -> &'static str {
    match state {
        MilestoneState::Unstarted => "unstarted",
        MilestoneState::InProgress => "in_progress",
        MilestoneState::Failed => "failed",
        MilestoneState::Paid => "paid",
    }
}

fn milestone_phase_label(phase: MilestonePhase) -> &'static str {
    match phase {
        MilestonePhase::Unstarted => "unstarted",
        MilestonePhase::InProgress => "in_progress",
        MilestonePhase::AwaitingPayout => "awaiting_payout",
        MilestonePhase::Failed => "failed",
        MilestonePhase::Paid => "paid",
    }
}

fn fund_transaction_state_label(state: FundTransactionState) -> &'static str {
    match state {
        FundTransactionState::Reject => "reject",
        FundTransactionState::Approve => "approve",
        FundTransactionState::Refunded => "refunded",
    }
}

/// Decode one campaign from its snapshot; `None` if it was never created.
pub fn campaign_view(
    snapshot: &MemoryState,
    campaign_id: u32,
    now: u64,
) -> Result<Option<CampaignView>> {
    let Some(campaign) = load_campaign(snapshot, campaign_id)? else {
        return Ok(None);
    };

    let phases = derive_milestone_phases(&campaign, now);
    let mut milestones = Vec::with_capacity(campaign.milestones.len());
    for (index, (m, phase)) in campaign.milestones.iter().zip(phases).enumerate() {
        milestones.push(MilestoneView {
            index,
            state: milestone_state_label(m.state),
            phase: milestone_phase_label(phase),
            end_time: m.end_time,
            payout_percent: m.payout_percent,
            payout_amount: milestone_payout(campaign.total_raised, m.payout_percent)?,
        });
    }

    let pages = campaign.total_fund_transactions.div_ceil(FUND_TRANSACTIONS_PAGE_SIZE);
    let mut fund_transactions = Vec::with_capacity(campaign.total_fund_transactions as usize);
    for page_index in 0..pages {
        if let Some(page) = load_page(snapshot, campaign_id, page_index)? {
            fund_transactions.extend(page.fund_transactions.iter().map(|ft| FundTransactionView {
                id: ft.id,
                backer: ft.backer.to_string(),
                state: fund_transaction_state_label(ft.state),
                amount: ft.amount,
            }));
        }
    }

    Ok(Some(CampaignView {
        campaign_id,
        state: campaign_state_label(campaign.state),
        phase: campaign_phase_label(derive_campaign_phase(&campaign, now)),
        owner: campaign.owner.to_string(),
        fund_raise_goal: campaign.fund_raise_goal,
        fund_raise_end_time: campaign.fund_raise_end_time,
        total_raised: campaign.total_raised,
        total_non_refundable: campaign.total_non_refundable,
        total_reserve: campaign.total_reserve,
        total_fund_transactions: campaign.total_fund_transactions,
        total_reject_votes_for_current_milestone: campaign.total_reject_votes_for_current_milestone,
        milestones,
        fund_transactions,
    }))
}

pub fn state_entry_view(row: &StateRow) -> StateEntryView {
    let flag = StateKey::from_slice(&row.key).map(|k| k.namespace_flag());
    let (namespace, page_index) = match flag {
        Some(f) if f == NamespaceFlag::GENERAL_INFO => ("general_info", None),
        Some(f) if f.is_fund_transactions_page() => ("fund_transactions_page", f.page_index()),
        _ => ("unknown", None),
    };
    StateEntryView {
        key: hex::encode(&row.key),
        campaign_id: row.campaign_id as u32,
        namespace,
        page_index,
        value: STANDARD.encode(&row.value),
        size: row.value.len(),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
