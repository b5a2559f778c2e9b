use crate::invariants::assert_all_campaign_invariants;
use crate::lifecycle::{derive_campaign_phase, CampaignPhase};
use crate::storage::{require_pledge, StateWrite};
use crate::test_lifecycle::{amount_of, Ledger, ALICE, BOB, CAMPAIGN, CAROL, OWNER};
use crate::types::{CampaignState, FundTransactionState, MilestoneState};
use crate::HookError;

const BACKERS: [&str; 10] = [
    "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe",
    "rGWrZyQqhTp9Xu7G5Pkayo7bXjH4k4QYpf",
    "r3kmLJN5D28dHuH8vZNUZpMC43pEHpaocV",
    "rLHzPsX6oXkzU2qL12kHCH8G8cnZv1rBJh",
    "rUn84CUYbNjRoTQ6mSW7BVJPSVJNLb1QLo",
    "rJb5KsHsDHF1YS5B5DU6QCkH5NsPaKQTcy",
    "rDsbeomae4FXwgQTJp9Rs64Qg9vDiTCdBv",
    "rE3bKR3RMpFAhwyMKrRbDPhznqhYjjQkRF",
    "rBKPS4oLSaV2KVVuHH8EpQqMGgGefGFQs7",
    "rNxp4h8apvRis6mJf9Sh8C6iRxfrDWN7AV",
];

fn campaign(ledger: &Ledger) -> crate::Campaign {
    assert_all_campaign_invariants(&ledger.state, CAMPAIGN)
}

/// `n` pledges of 100 drops each on a 30/20/50 campaign with a goal of 100.
fn funded_by(n: usize) -> Ledger {
    let mut ledger = Ledger::new();
    ledger
        .create(100, &[(200, 30), (300, 20), (400, 50)])
        .unwrap();
    for backer in &BACKERS[..n] {
        ledger.fund(backer, 100, 10).unwrap();
    }
    ledger
}

#[test]
fn test_five_pledges_fail_on_third_reject() {
    let mut ledger = funded_by(5);
    ledger.reject(BACKERS[0], 0, 150).unwrap();
    ledger.reject(BACKERS[1], 1, 150).unwrap();
    assert_eq!(campaign(&ledger).state, CampaignState::Derive);
    assert_eq!(campaign(&ledger).total_reject_votes_for_current_milestone, 2);

    ledger.reject(BACKERS[2], 2, 150).unwrap();
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::FailedMilestone(1));
    assert_eq!(c.milestones[0].state, MilestoneState::Failed);
    assert_eq!(c.total_non_refundable, 0);
}

#[test]
fn test_four_pledges_fail_on_third_reject() {
    let mut ledger = funded_by(4);
    ledger.reject(BACKERS[0], 0, 150).unwrap();
    ledger.reject(BACKERS[1], 1, 150).unwrap();
    assert_eq!(campaign(&ledger).state, CampaignState::Derive);

    ledger.reject(BACKERS[2], 2, 150).unwrap();
    assert_eq!(campaign(&ledger).state, CampaignState::FailedMilestone(1));
}

#[test]
fn test_approve_retracts_a_reject() {
    let mut ledger = funded_by(5);
    ledger.reject(BACKERS[0], 0, 150).unwrap();
    ledger.reject(BACKERS[1], 1, 150).unwrap();
    ledger.approve(BACKERS[1], 1, 160).unwrap();
    assert_eq!(campaign(&ledger).total_reject_votes_for_current_milestone, 1);

    let pledge = require_pledge(&ledger.state, CAMPAIGN, 1).unwrap();
    assert_eq!(pledge.pledge().state, FundTransactionState::Approve);

    ledger.reject(BACKERS[2], 2, 170).unwrap();
    assert_eq!(campaign(&ledger).state, CampaignState::Derive);
}

#[test]
fn test_same_vote_twice_is_rejected() {
    let mut ledger = funded_by(3);
    // pledges start as approvals
    assert!(matches!(
        ledger.approve(BACKERS[0], 0, 150),
        Err(HookError::PreconditionFailed(_))
    ));
    ledger.reject(BACKERS[0], 0, 150).unwrap();
    assert!(matches!(
        ledger.reject(BACKERS[0], 0, 160),
        Err(HookError::PreconditionFailed(_))
    ));
    assert_eq!(campaign(&ledger).total_reject_votes_for_current_milestone, 1);
}

#[test]
fn test_vote_outside_milestone_window_is_rejected() {
    let mut ledger = funded_by(3);
    // fund raise
    assert!(matches!(
        ledger.reject(BACKERS[0], 0, 50),
        Err(HookError::PreconditionFailed(_))
    ));
    // after the last milestone ended
    assert!(matches!(
        ledger.reject(BACKERS[0], 0, 400),
        Err(HookError::PreconditionFailed(_))
    ));
    ledger.reject(BACKERS[0], 0, 399).unwrap();
}

#[test]
fn test_vote_requires_pledge_backer() {
    let mut ledger = funded_by(3);
    assert!(matches!(
        ledger.reject(BACKERS[1], 0, 150),
        Err(HookError::PreconditionFailed(_))
    ));
    assert!(matches!(
        ledger.reject(BACKERS[0], 3, 150),
        Err(HookError::NotFound(_))
    ));
}

#[test]
fn test_refunded_pledge_cannot_vote() {
    let mut ledger = funded_by(3);
    let mut pledge = require_pledge(&ledger.state, CAMPAIGN, 0).unwrap();
    pledge.pledge_mut().state = FundTransactionState::Refunded;
    ledger
        .state
        .apply(&[StateWrite::fund_transactions_page(CAMPAIGN, 0, &pledge.page)])
        .unwrap();

    assert!(matches!(
        ledger.reject(BACKERS[0], 0, 150),
        Err(HookError::PreconditionFailed(_))
    ));
}

#[test]
fn test_failed_campaign_rejects_votes_and_payouts() {
    let mut ledger = funded_by(3);
    ledger.reject(BACKERS[0], 0, 250).unwrap();
    ledger.reject(BACKERS[1], 1, 250).unwrap();
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::FailedMilestone(2));
    assert_eq!(derive_campaign_phase(&c, 250), CampaignPhase::FailedMilestone(2));

    assert!(matches!(
        ledger.reject(BACKERS[2], 2, 260),
        Err(HookError::PreconditionFailed(_))
    ));
    assert!(matches!(
        ledger.payout(OWNER, 1, 260),
        Err(HookError::PreconditionFailed(_))
    ));
    assert!(matches!(
        ledger.payout(OWNER, 2, 400),
        Err(HookError::PreconditionFailed(_))
    ));
}

#[test]
fn test_milestone_resolved_before_failure_stays_payable() {
    let mut ledger = funded_by(3);
    ledger.reject(BACKERS[0], 0, 250).unwrap();
    ledger.reject(BACKERS[1], 1, 250).unwrap();
    // milestone 1 ended unopposed; its 30% was accrued at failure
    assert_eq!(campaign(&ledger).total_non_refundable, 90);

    let outcome = ledger.payout(OWNER, 0, 260).unwrap();
    assert_eq!(amount_of(&outcome), 90);
    let c = campaign(&ledger);
    assert_eq!(c.total_non_refundable, 90);
    assert_eq!(c.milestones[0].state, MilestoneState::Paid);
    assert_eq!(c.state, CampaignState::FailedMilestone(2));
}

#[test]
fn test_votes_close_once_current_milestone_is_paid() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 60), (300, 40)]).unwrap();
    ledger.fund(ALICE, 600, 10).unwrap();
    ledger.fund(BOB, 500, 20).unwrap();
    assert_eq!(amount_of(&ledger.payout(OWNER, 0, 150).unwrap()), 660);

    assert!(matches!(
        ledger.reject(ALICE, 0, 160),
        Err(HookError::PreconditionFailed(_))
    ));
    assert!(matches!(
        ledger.reject(BOB, 1, 160),
        Err(HookError::PreconditionFailed(_))
    ));
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::Derive);
    assert_eq!(c.milestones[0].state, MilestoneState::Paid);
    assert_eq!(c.total_reject_votes_for_current_milestone, 0);
    assert_eq!(c.total_non_refundable, 660);

    // the next milestone opens voting again
    ledger.reject(ALICE, 0, 210).unwrap();
    ledger.reject(BOB, 1, 210).unwrap();
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::FailedMilestone(2));
    assert_eq!(c.milestones[0].state, MilestoneState::Paid);
    assert_eq!(c.milestones[1].state, MilestoneState::Failed);
}

// ─────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────

#[test]
fn test_payout_then_majority_reject_then_refunds() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 60), (300, 40)]).unwrap();
    assert_eq!(ledger.fund(ALICE, 600, 10).unwrap().fund_transaction_id, Some(0));
    assert_eq!(ledger.fund(BOB, 500, 20).unwrap().fund_transaction_id, Some(1));
    assert_eq!(campaign(&ledger).total_raised, 1_100);

    assert_eq!(amount_of(&ledger.payout(OWNER, 0, 150).unwrap()), 660);

    ledger.reject(ALICE, 0, 250).unwrap();
    ledger.reject(BOB, 1, 250).unwrap();
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::FailedMilestone(2));
    assert_eq!(c.milestones[0].state, MilestoneState::Paid);
    assert_eq!(c.milestones[1].state, MilestoneState::Failed);
    // the paid milestone is not counted twice
    assert_eq!(c.total_non_refundable, 660);

    assert_eq!(amount_of(&ledger.refund(ALICE, 0, 260).unwrap()), 240);
    assert_eq!(amount_of(&ledger.refund(BOB, 1, 260).unwrap()), 200);
    assert!(matches!(
        ledger.refund(BOB, 1, 270),
        Err(HookError::PreconditionFailed(_))
    ));
    assert!(matches!(
        ledger.refund(CAROL, 1, 270),
        Err(HookError::PreconditionFailed(_))
    ));
}

#[test]
fn test_failure_at_third_milestone_conserves_funds() {
    let mut ledger = funded_by(10);
    assert_eq!(campaign(&ledger).total_raised, 1_000);

    for (id, backer) in BACKERS.iter().enumerate().take(6) {
        ledger.reject(backer, id as u32, 350).unwrap();
    }
    let c = campaign(&ledger);
    assert_eq!(c.state, CampaignState::FailedMilestone(3));
    assert_eq!(c.total_non_refundable, 500);

    let mut refunded = 0;
    for (id, backer) in BACKERS.iter().enumerate() {
        let refund = amount_of(&ledger.refund(backer, id as u32, 360).unwrap());
        assert_eq!(refund, 50);
        refunded += refund;
    }

    let paid: u64 = [0u8, 1]
        .into_iter()
        .map(|i| amount_of(&ledger.payout(OWNER, i, 370).unwrap()))
        .sum();
    assert_eq!(paid, 500);
    assert_eq!(paid + refunded, 1_000);
}
