use crate::invariants::assert_all_campaign_invariants;
use crate::lifecycle::{derive_campaign_phase, derive_milestone_phases, CampaignPhase, MilestonePhase};
use crate::storage::{load_campaign, require_pledge};
use crate::types::{CampaignState, FundTransactionState, MilestoneState};
use crate::{
    CrowdfundHook, HookConfig, HookError, MemoryState, MilestonePayload, Outcome, Request,
    RequestContext, Result,
};

pub(crate) const OWNER: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
pub(crate) const ALICE: &str = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe";
pub(crate) const BOB: &str = "rGWrZyQqhTp9Xu7G5Pkayo7bXjH4k4QYpf";
pub(crate) const CAROL: &str = "r3kmLJN5D28dHuH8vZNUZpMC43pEHpaocV";

pub(crate) const CAMPAIGN: u32 = 7;
pub(crate) const CREATE_DEPOSIT: u64 = 100_000_000;
pub(crate) const FUND_DEPOSIT: u64 = 10_000_000;

/// Applies each accepted outcome the way the host does.
pub(crate) struct Ledger {
    pub hook: CrowdfundHook,
    pub state: MemoryState,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            hook: CrowdfundHook::default(),
            state: MemoryState::new(),
        }
    }

    pub fn submit(&mut self, sender: &str, amount: u64, request: Request, now: u64) -> Result<Outcome> {
        let ctx = RequestContext {
            campaign_id: CAMPAIGN,
            sender: sender.parse()?,
            amount,
            payload: request.encode(None),
            ledger_time: now,
        };
        let outcome = self.hook.invoke(&self.state, &ctx)?;
        self.state.apply(&outcome.writes)?;
        Ok(outcome)
    }

    /// Create a campaign closing its fund raise at t=100.
    pub fn create(&mut self, goal: u64, milestones: &[(u64, u8)]) -> Result<Outcome> {
        self.submit(OWNER, CREATE_DEPOSIT, create_request(goal, 100, milestones), 0)
    }

    pub fn fund(&mut self, backer: &str, net: u64, now: u64) -> Result<Outcome> {
        self.submit(backer, net + FUND_DEPOSIT, Request::FundCampaign, now)
    }

    pub fn payout(&mut self, sender: &str, milestone_index: u8, now: u64) -> Result<Outcome> {
        self.submit(
            sender,
            0,
            Request::RequestMilestonePayoutPayment { milestone_index },
            now,
        )
    }

    pub fn refund(&mut self, sender: &str, fund_transaction_id: u32, now: u64) -> Result<Outcome> {
        self.submit(
            sender,
            0,
            Request::RequestRefundPayment { fund_transaction_id },
            now,
        )
    }

    pub fn reject(&mut self, sender: &str, fund_transaction_id: u32, now: u64) -> Result<Outcome> {
        self.submit(
            sender,
            0,
            Request::VoteRejectMilestone { fund_transaction_id },
            now,
        )
    }

    pub fn approve(&mut self, sender: &str, fund_transaction_id: u32, now: u64) -> Result<Outcome> {
        self.submit(
            sender,
            0,
            Request::VoteApproveMilestone { fund_transaction_id },
            now,
        )
    }
}

pub(crate) fn create_request(goal: u64, end: u64, milestones: &[(u64, u8)]) -> Request {
    Request::CreateCampaign {
        fund_raise_goal: goal,
        fund_raise_end_time: end,
        milestones: milestones
            .iter()
            .map(|(end_time, payout_percent)| MilestonePayload {
                end_time: *end_time,
                payout_percent: *payout_percent,
            })
            .collect(),
    }
}

pub(crate) fn amount_of(outcome: &Outcome) -> u64 {
    let bytes: [u8; 8] = outcome.result.as_slice().try_into().unwrap();
    u64::from_be_bytes(bytes)
}

fn is_precondition(result: Result<Outcome>) -> bool {
    matches!(result, Err(HookError::PreconditionFailed(_)))
}

// ─────────────────────────────────────────────────────────
// Create
// ─────────────────────────────────────────────────────────

#[test]
fn test_create_campaign_stores_general_info() {
    let mut ledger = Ledger::new();
    let outcome = ledger.create(1_000, &[(200, 60), (300, 40)]).unwrap();
    assert_eq!(outcome.writes.len(), 1);
    assert!(outcome.result.is_empty());
    assert!(outcome.emitted.is_none());

    let campaign = assert_all_campaign_invariants(&ledger.state, CAMPAIGN);
    assert_eq!(campaign.state, CampaignState::Derive);
    assert_eq!(campaign.owner.to_string(), OWNER);
    assert_eq!(campaign.fund_raise_goal, 1_000);
    assert_eq!(campaign.total_reserve, CREATE_DEPOSIT);
    assert_eq!(campaign.total_fund_transactions, 0);
    assert!(campaign
        .milestones
        .iter()
        .all(|m| m.state == MilestoneState::Unstarted));
}

#[test]
fn test_create_campaign_rejects_reused_id() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 100)]).unwrap();
    assert!(is_precondition(ledger.create(5_000, &[(300, 100)])));
    let campaign = load_campaign(&ledger.state, CAMPAIGN).unwrap().unwrap();
    assert_eq!(campaign.fund_raise_goal, 1_000);
}

#[test]
fn test_create_campaign_requires_deposit() {
    let mut ledger = Ledger::new();
    let result = ledger.submit(
        OWNER,
        CREATE_DEPOSIT - 1,
        create_request(1_000, 100, &[(200, 100)]),
        0,
    );
    assert!(is_precondition(result));
    assert!(ledger.state.is_empty());
}

#[test]
fn test_create_campaign_validates_schedule() {
    let mut ledger = Ledger::new();
    // fund raise already over
    let past = ledger.submit(OWNER, CREATE_DEPOSIT, create_request(1_000, 100, &[(200, 100)]), 100);
    assert!(is_precondition(past));
    // percentages short of 100
    assert!(is_precondition(ledger.create(1_000, &[(200, 50), (300, 49)])));
    // milestones out of order
    assert!(is_precondition(ledger.create(1_000, &[(300, 50), (200, 50)])));
    // zero percent milestone
    assert!(is_precondition(ledger.create(1_000, &[(200, 0), (300, 100)])));
    assert!(ledger.state.is_empty());
}

// ─────────────────────────────────────────────────────────
// Fund
// ─────────────────────────────────────────────────────────

#[test]
fn test_fund_campaign_appends_pledges_across_pages() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 100)]).unwrap();

    for i in 0..7u32 {
        let outcome = ledger.fund(ALICE, 100, 10).unwrap();
        assert_eq!(outcome.fund_transaction_id, Some(i));
        assert_eq!(outcome.writes.len(), 2);
    }
    // pledges 5 and 6 spill into the second page
    assert_eq!(ledger.state.len(), 3);

    let campaign = assert_all_campaign_invariants(&ledger.state, CAMPAIGN);
    assert_eq!(campaign.total_raised, 700);
    assert_eq!(campaign.total_fund_transactions, 7);
    assert_eq!(campaign.total_reserve, CREATE_DEPOSIT + 7 * FUND_DEPOSIT);

    let pledge = require_pledge(&ledger.state, CAMPAIGN, 6).unwrap();
    assert_eq!(pledge.page_index, 1);
    assert_eq!(pledge.slot, 1);
    assert_eq!(pledge.pledge().amount, 100);
    assert_eq!(pledge.pledge().state, FundTransactionState::Approve);
}

#[test]
fn test_fund_campaign_requires_more_than_deposit() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 100)]).unwrap();
    assert!(is_precondition(ledger.submit(ALICE, FUND_DEPOSIT, Request::FundCampaign, 10)));
    assert!(ledger.fund(ALICE, 1, 10).is_ok());
}

#[test]
fn test_fund_campaign_closes_at_end_time() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 100)]).unwrap();
    assert!(ledger.fund(ALICE, 100, 99).is_ok());
    assert!(is_precondition(ledger.fund(ALICE, 100, 100)));
}

#[test]
fn test_fund_unknown_campaign_is_not_found() {
    let mut ledger = Ledger::new();
    assert!(matches!(
        ledger.fund(ALICE, 100, 10),
        Err(HookError::NotFound(_))
    ));
}

#[test]
fn test_fund_campaign_reports_full_store() {
    let mut ledger = Ledger::new();
    ledger.state = MemoryState::with_capacity(2);
    ledger.create(1_000, &[(200, 100)]).unwrap();
    for _ in 0..5 {
        ledger.fund(ALICE, 100, 10).unwrap();
    }
    // the sixth pledge needs a new page
    assert!(matches!(
        ledger.fund(BOB, 100, 10),
        Err(HookError::StorageFailure(_))
    ));
    let campaign = assert_all_campaign_invariants(&ledger.state, CAMPAIGN);
    assert_eq!(campaign.total_fund_transactions, 5);
    assert_eq!(campaign.total_raised, 500);
}

// ─────────────────────────────────────────────────────────
// Payout
// ─────────────────────────────────────────────────────────

fn funded_two_milestones() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 60), (300, 40)]).unwrap();
    ledger.fund(ALICE, 600, 10).unwrap();
    ledger.fund(BOB, 500, 20).unwrap();
    ledger
}

#[test]
fn test_milestone_payout_pays_owner_share_of_raise() {
    let mut ledger = funded_two_milestones();
    let outcome = ledger.payout(OWNER, 0, 150).unwrap();
    assert_eq!(amount_of(&outcome), 660);
    let payment = outcome.emitted.unwrap();
    assert_eq!(payment.amount, 660);
    assert_eq!(payment.destination.to_string(), OWNER);
    assert_eq!(payment.campaign_id, CAMPAIGN);

    let campaign = assert_all_campaign_invariants(&ledger.state, CAMPAIGN);
    assert_eq!(campaign.total_non_refundable, 660);
    assert_eq!(campaign.milestones[0].state, MilestoneState::Paid);
}

#[test]
fn test_milestone_payout_guards() {
    let mut ledger = funded_two_milestones();
    // still fund raising
    assert!(is_precondition(ledger.payout(OWNER, 0, 50)));
    // not the owner
    assert!(is_precondition(ledger.payout(ALICE, 0, 150)));
    // second milestone starts at 200
    assert!(is_precondition(ledger.payout(OWNER, 1, 150)));
    // no such milestone
    assert!(matches!(ledger.payout(OWNER, 2, 150), Err(HookError::NotFound(_))));
    assert!(matches!(ledger.payout(OWNER, 10, 150), Err(HookError::MalformedInput(_))));

    ledger.payout(OWNER, 0, 150).unwrap();
    assert!(is_precondition(ledger.payout(OWNER, 0, 160)));
}

#[test]
fn test_all_milestones_paid_completes_campaign() {
    let mut ledger = funded_two_milestones();
    ledger.payout(OWNER, 0, 150).unwrap();
    let outcome = ledger.payout(OWNER, 1, 250).unwrap();
    assert_eq!(amount_of(&outcome), 440);

    let campaign = assert_all_campaign_invariants(&ledger.state, CAMPAIGN);
    assert_eq!(campaign.state, CampaignState::Completed);
    assert_eq!(campaign.total_non_refundable, 1_100);
    assert_eq!(derive_campaign_phase(&campaign, 250), CampaignPhase::Completed);
    assert!(is_precondition(ledger.payout(OWNER, 1, 260)));
    assert!(is_precondition(ledger.refund(ALICE, 0, 400)));
}

// ─────────────────────────────────────────────────────────
// Failed fund raise
// ─────────────────────────────────────────────────────────

#[test]
fn test_failed_fund_raise_refunds_in_full() {
    let mut ledger = Ledger::new();
    ledger.create(1_000, &[(200, 100)]).unwrap();
    ledger.fund(ALICE, 400, 10).unwrap();
    ledger.fund(BOB, 300, 10).unwrap();

    // refunds only open once the window closes below the goal
    assert!(is_precondition(ledger.refund(ALICE, 0, 50)));

    let campaign = load_campaign(&ledger.state, CAMPAIGN).unwrap().unwrap();
    assert_eq!(derive_campaign_phase(&campaign, 150), CampaignPhase::FailedFundRaise);
    assert!(is_precondition(ledger.payout(OWNER, 0, 150)));
    assert!(is_precondition(ledger.reject(ALICE, 0, 150)));

    assert_eq!(amount_of(&ledger.refund(ALICE, 0, 150).unwrap()), 400);
    assert_eq!(amount_of(&ledger.refund(BOB, 1, 150).unwrap()), 300);
}

// ─────────────────────────────────────────────────────────
// Refund
// ─────────────────────────────────────────────────────────

#[test]
fn test_refund_guards() {
    let mut ledger = funded_two_milestones();
    ledger.reject(ALICE, 0, 250).unwrap();
    ledger.reject(BOB, 1, 250).unwrap();

    // wrong backer
    assert!(is_precondition(ledger.refund(BOB, 0, 260)));
    // unknown pledge
    assert!(matches!(ledger.refund(CAROL, 2, 260), Err(HookError::NotFound(_))));
    assert!(matches!(ledger.refund(CAROL, 5, 260), Err(HookError::NotFound(_))));

    let outcome = ledger.refund(ALICE, 0, 260).unwrap();
    assert_eq!(outcome.emitted.unwrap().destination.to_string(), ALICE);
    assert!(is_precondition(ledger.refund(ALICE, 0, 270)));

    let pledge = require_pledge(&ledger.state, CAMPAIGN, 0).unwrap();
    assert_eq!(pledge.pledge().state, FundTransactionState::Refunded);
}

#[test]
fn test_refund_before_failure_is_rejected() {
    let mut ledger = funded_two_milestones();
    assert!(is_precondition(ledger.refund(ALICE, 0, 50)));
    assert!(is_precondition(ledger.refund(ALICE, 0, 150)));
}

// ─────────────────────────────────────────────────────────
// Phases and clock
// ─────────────────────────────────────────────────────────

#[test]
fn test_phases_follow_ledger_time() {
    let mut ledger = funded_two_milestones();
    ledger.payout(OWNER, 0, 150).unwrap();
    let campaign = load_campaign(&ledger.state, CAMPAIGN).unwrap().unwrap();

    assert_eq!(derive_campaign_phase(&campaign, 50), CampaignPhase::FundRaise);
    assert_eq!(derive_campaign_phase(&campaign, 150), CampaignPhase::Milestone(1));
    assert_eq!(derive_campaign_phase(&campaign, 250), CampaignPhase::Milestone(2));
    assert_eq!(
        derive_milestone_phases(&campaign, 310),
        vec![MilestonePhase::Paid, MilestonePhase::AwaitingPayout]
    );
}

#[test]
fn test_dev_override_replaces_ledger_time() {
    let mut ledger = funded_two_milestones();
    let request = Request::RequestMilestonePayoutPayment { milestone_index: 0 };
    let ctx = RequestContext {
        campaign_id: CAMPAIGN,
        sender: OWNER.parse().unwrap(),
        amount: 0,
        payload: request.encode(Some(150)),
        ledger_time: 50,
    };

    assert!(matches!(
        ledger.hook.invoke(&ledger.state, &ctx),
        Err(HookError::MalformedInput(_))
    ));

    ledger.hook = CrowdfundHook::new(HookConfig {
        dev_mode: true,
        ..HookConfig::default()
    });
    let outcome = ledger.hook.invoke(&ledger.state, &ctx).unwrap();
    assert_eq!(amount_of(&outcome), 660);
}

#[test]
fn test_rejected_invocation_leaves_store_untouched() {
    let mut ledger = funded_two_milestones();
    let before: Vec<_> = ledger
        .state
        .entries()
        .map(|(k, v)| (*k, v.clone()))
        .collect();
    assert!(ledger.payout(ALICE, 0, 150).is_err());
    assert!(ledger.submit(ALICE, 0, Request::FundCampaign, 150).is_err());
    let after: Vec<_> = ledger
        .state
        .entries()
        .map(|(k, v)| (*k, v.clone()))
        .collect();
    assert_eq!(before, after);
}
