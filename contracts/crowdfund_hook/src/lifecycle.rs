//! # Campaign Lifecycle
//!
//! Create, fund, milestone payout and refund transitions, plus the
//! clock-derived phase views. Every function validates first and only then
//! builds the [`Outcome`]; a rejected invocation produces no writes.

use tracing::{debug, info};

use crate::errors::{HookError, Result};
use crate::finance::{milestone_payout, refund_amount, Percent};
use crate::payload::MilestonePayload;
use crate::storage::{
    load_campaign, load_page, page_of, require_campaign, require_pledge, HookState, StateWrite,
};
use crate::types::{
    Campaign, CampaignState, FundTransaction, FundTransactionState, FundTransactionsPage,
    Milestone, MilestoneState,
};
use crate::{CallContext, EmittedPayment, HookConfig, Outcome};

// ── Derived views ────────────────────────────────────────────────────

/// Effective campaign phase at a given instant. Milestone numbers are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CampaignPhase {
    FundRaise,
    FailedFundRaise,
    Milestone(u8),
    FailedMilestone(u8),
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MilestonePhase {
    Unstarted,
    InProgress,
    /// Ended without a majority reject; payout not yet requested.
    AwaitingPayout,
    Failed,
    Paid,
}

pub fn derive_campaign_phase(campaign: &Campaign, now: u64) -> CampaignPhase {
    match campaign.state {
        CampaignState::FailedMilestone(k) => CampaignPhase::FailedMilestone(k),
        CampaignState::Completed => CampaignPhase::Completed,
        CampaignState::Derive => {
            if now < campaign.fund_raise_end_time {
                CampaignPhase::FundRaise
            } else if !campaign.goal_reached() {
                CampaignPhase::FailedFundRaise
            } else {
                match campaign.current_milestone_index(now) {
                    Some(i) => CampaignPhase::Milestone(i as u8 + 1),
                    None => CampaignPhase::Completed,
                }
            }
        }
    }
}

pub fn derive_milestone_phases(campaign: &Campaign, now: u64) -> Vec<MilestonePhase> {
    let failed_at = match campaign.state {
        CampaignState::FailedMilestone(k) => Some(k as usize),
        _ => None,
    };
    let started = now >= campaign.fund_raise_end_time && campaign.goal_reached();
    let current = campaign.current_milestone_index(now);

    campaign
        .milestones
        .iter()
        .enumerate()
        .map(|(i, m)| match m.state {
            MilestoneState::Failed => MilestonePhase::Failed,
            MilestoneState::Paid => MilestonePhase::Paid,
            _ if failed_at.is_some_and(|k| i + 1 > k) => MilestonePhase::Unstarted,
            _ if failed_at.is_some() => MilestonePhase::AwaitingPayout,
            _ if !started => MilestonePhase::Unstarted,
            _ if m.end_time <= now => MilestonePhase::AwaitingPayout,
            _ if current == Some(i) => MilestonePhase::InProgress,
            _ => MilestonePhase::Unstarted,
        })
        .collect()
}

/// Whether refunds are open: the campaign failed a milestone, or the fund
/// raise closed below its goal.
pub fn refunds_open(campaign: &Campaign, now: u64) -> bool {
    matches!(
        derive_campaign_phase(campaign, now),
        CampaignPhase::FailedMilestone(_) | CampaignPhase::FailedFundRaise
    )
}

// ── Create ───────────────────────────────────────────────────────────

pub fn create_campaign(
    state: &impl HookState,
    call: &CallContext,
    config: &HookConfig,
    fund_raise_goal: u64,
    fund_raise_end_time: u64,
    milestones: &[MilestonePayload],
) -> Result<Outcome> {
    if call.amount < config.create_campaign_deposit {
        return Err(HookError::precondition(format!(
            "amount must be at least the create campaign deposit of {} drops",
            config.create_campaign_deposit
        )));
    }

    if load_campaign(state, call.campaign_id)?.is_some() {
        return Err(HookError::precondition(format!(
            "campaign id {} already in use for another campaign",
            call.campaign_id
        )));
    }

    if fund_raise_end_time <= call.now {
        return Err(HookError::precondition(
            "fund raise end time must be in the future",
        ));
    }

    validate_milestones(fund_raise_end_time, milestones)?;

    let campaign = Campaign {
        state: CampaignState::Derive,
        owner: call.sender,
        fund_raise_goal,
        fund_raise_end_time,
        total_raised: 0,
        total_non_refundable: 0,
        total_reserve: call.amount,
        total_fund_transactions: 0,
        total_reject_votes_for_current_milestone: 0,
        milestones: milestones
            .iter()
            .map(|m| Milestone {
                state: MilestoneState::Unstarted,
                end_time: m.end_time,
                payout_percent: m.payout_percent,
            })
            .collect(),
    };

    info!(
        campaign_id = call.campaign_id,
        owner = %campaign.owner,
        goal = fund_raise_goal,
        milestones = campaign.milestones.len(),
        "campaign created"
    );

    Ok(Outcome {
        writes: vec![StateWrite::general_info(call.campaign_id, &campaign)],
        ..Outcome::default()
    })
}

/// Milestones must pay out exactly 100% and end in non-decreasing order,
/// no earlier than the fund raise.
fn validate_milestones(fund_raise_end_time: u64, milestones: &[MilestonePayload]) -> Result<()> {
    let mut previous_end = fund_raise_end_time;
    let mut total_percent = 0u32;
    for (i, m) in milestones.iter().enumerate() {
        Percent::new(m.payout_percent)
            .map_err(|e| HookError::precondition(format!("milestone {i}: {e}")))?;
        if m.end_time < previous_end {
            return Err(HookError::precondition(format!(
                "milestone {i} ends at {} before the preceding deadline {previous_end}",
                m.end_time
            )));
        }
        previous_end = m.end_time;
        total_percent += m.payout_percent as u32;
    }
    if total_percent != 100 {
        return Err(HookError::precondition(format!(
            "milestone payout percents must sum to 100, got {total_percent}"
        )));
    }
    Ok(())
}

// ── Fund ─────────────────────────────────────────────────────────────

pub fn fund_campaign(
    state: &impl HookState,
    call: &CallContext,
    config: &HookConfig,
) -> Result<Outcome> {
    let mut campaign = require_campaign(state, call.campaign_id)?;

    if campaign.state != CampaignState::Derive || call.now >= campaign.fund_raise_end_time {
        return Err(HookError::precondition(
            "campaign is not in its fund raise window",
        ));
    }

    if call.amount <= config.fund_campaign_deposit {
        return Err(HookError::precondition(format!(
            "amount must be greater than the fund campaign deposit of {} drops",
            config.fund_campaign_deposit
        )));
    }
    let net = call.amount - config.fund_campaign_deposit;

    let id = campaign.total_fund_transactions;
    let (page_index, slot) = page_of(id);
    let existing = load_page(state, call.campaign_id, page_index)?;
    let mut page = match (slot, existing) {
        (0, None) => FundTransactionsPage::default(),
        (_, Some(page)) if page.len() == slot => page,
        (_, existing) => {
            return Err(HookError::corrupt(format!(
                "page {page_index} holds {} pledges, expected {slot}",
                existing.map(|p| p.len()).unwrap_or(0)
            )));
        }
    };

    page.fund_transactions.push(FundTransaction {
        id,
        backer: call.sender,
        state: FundTransactionState::Approve,
        amount: net,
    });

    campaign.total_raised = campaign
        .total_raised
        .checked_add(net)
        .ok_or_else(|| HookError::precondition("total raised would overflow"))?;
    campaign.total_reserve = campaign
        .total_reserve
        .checked_add(config.fund_campaign_deposit)
        .ok_or_else(|| HookError::precondition("total reserve would overflow"))?;
    campaign.total_fund_transactions = id
        .checked_add(1)
        .ok_or_else(|| HookError::precondition("fund transaction ids exhausted"))?;

    info!(
        campaign_id = call.campaign_id,
        fund_transaction_id = id,
        backer = %call.sender,
        amount = net,
        total_raised = campaign.total_raised,
        "campaign funded"
    );

    Ok(Outcome {
        writes: vec![
            StateWrite::general_info(call.campaign_id, &campaign),
            StateWrite::fund_transactions_page(call.campaign_id, page_index, &page),
        ],
        fund_transaction_id: Some(id),
        ..Outcome::default()
    })
}

// ── Milestone payout ─────────────────────────────────────────────────

pub fn request_milestone_payout(
    state: &impl HookState,
    call: &CallContext,
    milestone_index: u8,
) -> Result<Outcome> {
    let mut campaign = require_campaign(state, call.campaign_id)?;

    if call.sender != campaign.owner {
        return Err(HookError::precondition("sender does not match campaign owner"));
    }

    let index = milestone_index as usize;
    if index >= crate::types::MILESTONES_MAX_LENGTH {
        return Err(HookError::malformed(format!(
            "invalid milestone index {index}, must be between 0 and 9"
        )));
    }
    if index >= campaign.milestones.len() {
        return Err(HookError::not_found(format!(
            "milestone {index} does not exist"
        )));
    }

    // payouts for milestones resolved before a failure were accrued then
    let already_accrued = match campaign.state {
        CampaignState::Completed => {
            return Err(HookError::precondition("campaign is already completed"));
        }
        CampaignState::FailedMilestone(k) if index + 1 >= k as usize => {
            return Err(HookError::precondition("milestone has failed, payout ineligible"));
        }
        CampaignState::FailedMilestone(_) => true,
        CampaignState::Derive => {
            if call.now < campaign.fund_raise_end_time {
                return Err(HookError::precondition("campaign is still fund raising"));
            }
            if !campaign.goal_reached() {
                return Err(HookError::precondition("campaign fund goal was not reached"));
            }
            let starts_at = match index {
                0 => campaign.fund_raise_end_time,
                _ => campaign.milestones[index - 1].end_time,
            };
            if call.now < starts_at {
                return Err(HookError::precondition(format!(
                    "milestone {index} has not started"
                )));
            }
            false
        }
    };

    let milestone = campaign.milestones[index];
    if milestone.state == MilestoneState::Paid {
        return Err(HookError::precondition("milestone has already been paid out"));
    }

    let payout = milestone_payout(campaign.total_raised, milestone.payout_percent)?;
    if !already_accrued {
        campaign.total_non_refundable = campaign
            .total_non_refundable
            .checked_add(payout)
            .filter(|total| *total <= campaign.total_raised)
            .ok_or_else(|| HookError::corrupt("payouts exceed total raised"))?;
    }
    campaign.milestones[index].state = MilestoneState::Paid;

    if campaign
        .milestones
        .iter()
        .all(|m| m.state == MilestoneState::Paid)
    {
        campaign.state = CampaignState::Completed;
        info!(campaign_id = call.campaign_id, "campaign completed");
    }

    info!(
        campaign_id = call.campaign_id,
        milestone_index = index,
        payout,
        total_non_refundable = campaign.total_non_refundable,
        "milestone paid"
    );

    Ok(Outcome {
        writes: vec![StateWrite::general_info(call.campaign_id, &campaign)],
        result: payout.to_be_bytes().to_vec(),
        emitted: Some(EmittedPayment {
            destination: campaign.owner,
            amount: payout,
            campaign_id: call.campaign_id,
        }),
        fund_transaction_id: None,
    })
}

// ── Refund ───────────────────────────────────────────────────────────

pub fn request_refund(
    state: &impl HookState,
    call: &CallContext,
    fund_transaction_id: u32,
) -> Result<Outcome> {
    let campaign = require_campaign(state, call.campaign_id)?;

    if !refunds_open(&campaign, call.now) {
        return Err(HookError::precondition("campaign is not in a failed state"));
    }

    let mut pledge = require_pledge(state, call.campaign_id, fund_transaction_id)?;
    if pledge.pledge().backer != call.sender {
        return Err(HookError::precondition(
            "backer doesn't match fund transaction",
        ));
    }
    if pledge.pledge().state == FundTransactionState::Refunded {
        return Err(HookError::precondition(
            "fund transaction has already been refunded",
        ));
    }

    let refund = refund_amount(
        campaign.total_raised,
        campaign.total_non_refundable,
        pledge.pledge().amount,
    )?;
    debug!(
        total_raised = campaign.total_raised,
        total_non_refundable = campaign.total_non_refundable,
        pledge_amount = pledge.pledge().amount,
        refund,
        "computed refund"
    );
    pledge.pledge_mut().state = FundTransactionState::Refunded;

    info!(
        campaign_id = call.campaign_id,
        fund_transaction_id,
        refund,
        "pledge refunded"
    );

    Ok(Outcome {
        writes: vec![StateWrite::fund_transactions_page(
            call.campaign_id,
            pledge.page_index,
            &pledge.page,
        )],
        result: refund.to_be_bytes().to_vec(),
        emitted: Some(EmittedPayment {
            destination: call.sender,
            amount: refund,
            campaign_id: call.campaign_id,
        }),
        fund_transaction_id: Some(fund_transaction_id),
    })
}
