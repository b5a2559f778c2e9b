//! # Voting & Milestone Failure
//!
//! Backers toggle their pledge between `Approve` and `Reject` while a
//! milestone is being evaluated. The campaign keeps one running reject tally;
//! once it exceeds half of all pledges (floor division, strict `>`), the
//! current milestone fails and the campaign enters `FailedMilestone(k)`.
//! Votes close once the current milestone has been paid out.
//!
//! | Pledges | Rejects needed |
//! |---------|----------------|
//! | 3       | 2              |
//! | 4       | 3              |
//! | 5       | 3              |

use tracing::{debug, info, warn};

use crate::errors::{HookError, Result};
use crate::finance::milestone_payout;
use crate::lifecycle::{derive_campaign_phase, CampaignPhase};
use crate::storage::{require_campaign, require_pledge, HookState, StateWrite};
use crate::types::{Campaign, CampaignState, FundTransactionState, MilestoneState};
use crate::{CallContext, Outcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDirection {
    Reject,
    Approve,
}

impl VoteDirection {
    fn pledge_state(self) -> FundTransactionState {
        match self {
            Self::Reject => FundTransactionState::Reject,
            Self::Approve => FundTransactionState::Approve,
        }
    }
}

/// `reject_votes > floor(total_fund_transactions / 2)`
pub fn majority_reached(reject_votes: u32, total_fund_transactions: u32) -> bool {
    reject_votes > total_fund_transactions / 2
}

/// Fail the milestone being evaluated at `now`.
///
/// Milestones that ended before `now` count as resolved: their payouts are
/// accrued into `total_non_refundable` unless already paid out. Returns the
/// 1-based number of the failed milestone.
pub fn apply_majority_failure(campaign: &mut Campaign, now: u64) -> Result<u8> {
    let current = campaign
        .current_milestone_index(now)
        .ok_or_else(|| HookError::precondition("no milestone is being evaluated"))?;

    let mut accrued = campaign.total_non_refundable;
    for milestone in &campaign.milestones[..current] {
        if milestone.state == MilestoneState::Paid {
            continue;
        }
        let payout = milestone_payout(campaign.total_raised, milestone.payout_percent)?;
        accrued = accrued
            .checked_add(payout)
            .filter(|total| *total <= campaign.total_raised)
            .ok_or_else(|| HookError::corrupt("payouts exceed total raised"))?;
    }

    if campaign.milestones[current].state == MilestoneState::Paid {
        return Err(HookError::precondition(format!(
            "milestone {current} has already been paid out"
        )));
    }

    let failed = current as u8 + 1;
    campaign.total_non_refundable = accrued;
    campaign.milestones[current].state = MilestoneState::Failed;
    campaign.state = CampaignState::FailedMilestone(failed);
    Ok(failed)
}

pub fn vote(
    state: &impl HookState,
    call: &CallContext,
    fund_transaction_id: u32,
    direction: VoteDirection,
) -> Result<Outcome> {
    let mut campaign = require_campaign(state, call.campaign_id)?;

    match derive_campaign_phase(&campaign, call.now) {
        CampaignPhase::Milestone(k) => {
            if campaign.milestones[k as usize - 1].state == MilestoneState::Paid {
                return Err(HookError::precondition(format!(
                    "milestone {} has already been paid out; votes are closed",
                    k - 1
                )));
            }
        }
        CampaignPhase::FundRaise => {
            return Err(HookError::precondition(
                "campaign is fund raising; votes are only accepted during a milestone",
            ));
        }
        CampaignPhase::FailedFundRaise => {
            return Err(HookError::precondition("campaign fund goal was not reached"));
        }
        CampaignPhase::FailedMilestone(_) => {
            return Err(HookError::precondition(
                "campaign has already failed due to a rejected milestone",
            ));
        }
        CampaignPhase::Completed => {
            return Err(HookError::precondition(
                "campaign is closed; votes are only accepted during a milestone",
            ));
        }
    }

    let mut pledge = require_pledge(state, call.campaign_id, fund_transaction_id)?;
    if pledge.pledge().backer != call.sender {
        return Err(HookError::precondition(
            "backer doesn't match fund transaction",
        ));
    }
    match pledge.pledge().state {
        FundTransactionState::Refunded => {
            return Err(HookError::precondition(
                "fund transaction has been refunded and can no longer vote",
            ));
        }
        current if current == direction.pledge_state() => {
            return Err(HookError::precondition(
                "fund transaction has already placed same vote",
            ));
        }
        _ => {}
    }
    pledge.pledge_mut().state = direction.pledge_state();

    let tally = campaign.total_reject_votes_for_current_milestone;
    campaign.total_reject_votes_for_current_milestone = match direction {
        VoteDirection::Reject => tally.checked_add(1),
        VoteDirection::Approve => tally.checked_sub(1),
    }
    .filter(|t| *t <= campaign.total_fund_transactions)
    .ok_or_else(|| HookError::corrupt(format!("reject tally {tally} out of range")))?;

    debug!(
        campaign_id = call.campaign_id,
        fund_transaction_id,
        ?direction,
        reject_votes = campaign.total_reject_votes_for_current_milestone,
        total_fund_transactions = campaign.total_fund_transactions,
        "vote recorded"
    );

    if majority_reached(
        campaign.total_reject_votes_for_current_milestone,
        campaign.total_fund_transactions,
    ) {
        let failed = apply_majority_failure(&mut campaign, call.now)?;
        warn!(
            campaign_id = call.campaign_id,
            milestone = failed,
            total_non_refundable = campaign.total_non_refundable,
            "milestone rejected by majority, campaign failed"
        );
    } else {
        info!(campaign_id = call.campaign_id, fund_transaction_id, ?direction, "vote accepted");
    }

    Ok(Outcome {
        writes: vec![
            StateWrite::fund_transactions_page(call.campaign_id, pledge.page_index, &pledge.page),
            StateWrite::general_info(call.campaign_id, &campaign),
        ],
        fund_transaction_id: Some(fund_transaction_id),
        ..Outcome::default()
    })
}
