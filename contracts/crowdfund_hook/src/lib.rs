//! # Crowdfund Hook
//!
//! Milestone-based crowdfunding logic executed by a ledger host for every
//! inbound transaction addressed to a campaign. One invocation reads a
//! snapshot of the campaign's records, validates the request and returns the
//! writes to apply; it never touches the store itself.
//!
//! | Mode | Request                  | Entry point                                     |
//! |------|--------------------------|-------------------------------------------------|
//! | 0x00 | create campaign          | [`lifecycle::create_campaign`]                  |
//! | 0x01 | fund campaign            | [`lifecycle::fund_campaign`]                    |
//! | 0x02 | vote reject milestone    | [`voting::vote`]                                |
//! | 0x03 | vote approve milestone   | [`voting::vote`]                                |
//! | 0x04 | request refund payment   | [`lifecycle::request_refund`]                   |
//! | 0x05 | request milestone payout | [`lifecycle::request_milestone_payout`]         |
//!
//! ## Architecture
//!
//! Record layouts live in [`codec`], key derivation and the read trait in
//! [`storage`], arithmetic in [`finance`]. This file only decodes the payload,
//! resolves the evaluation clock and dispatches.

pub mod codec;
pub mod errors;
pub mod finance;
pub mod lifecycle;
pub mod payload;
pub mod storage;
pub mod types;
pub mod voting;

#[cfg(test)]
mod test_lifecycle;
#[cfg(test)]
mod test_voting;

use tracing::{debug, warn};

pub use errors::{HookError, Result};
pub use payload::{Envelope, MilestonePayload, Request};
pub use storage::{HookState, MemoryState, StateKey, StateWrite};
pub use types::{Address, Campaign, CampaignState, FundTransaction, FundTransactionState};

use voting::VoteDirection;

/// Deposit held back from a create-campaign payment, in drops.
pub const DEFAULT_CREATE_CAMPAIGN_DEPOSIT: u64 = 100_000_000;
/// Deposit held back from every pledge, in drops.
pub const DEFAULT_FUND_CAMPAIGN_DEPOSIT: u64 = 10_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookConfig {
    pub create_campaign_deposit: u64,
    pub fund_campaign_deposit: u64,
    /// Accept the `0x80` mode bit and its override timestamp.
    pub dev_mode: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            create_campaign_deposit: DEFAULT_CREATE_CAMPAIGN_DEPOSIT,
            fund_campaign_deposit: DEFAULT_FUND_CAMPAIGN_DEPOSIT,
            dev_mode: false,
        }
    }
}

/// Everything the host knows about one inbound transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Destination tag of the transaction.
    pub campaign_id: u32,
    pub sender: Address,
    /// Payment amount in drops; zero for plain invokes.
    pub amount: u64,
    pub payload: Vec<u8>,
    /// Ledger close time in unix seconds.
    pub ledger_time: u64,
}

/// The context passed down to the components once the clock is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub campaign_id: u32,
    pub sender: Address,
    pub amount: u64,
    pub now: u64,
}

/// An outbound payment the host must emit on success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmittedPayment {
    pub destination: Address,
    pub amount: u64,
    pub campaign_id: u32,
}

/// Result of an accepted invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// One write per touched record, in application order.
    pub writes: Vec<StateWrite>,
    /// Empty, or the 8-byte big-endian amount paid out.
    pub result: Vec<u8>,
    pub emitted: Option<EmittedPayment>,
    /// Pledge created or touched by this invocation.
    pub fund_transaction_id: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct CrowdfundHook {
    config: HookConfig,
}

impl CrowdfundHook {
    pub fn new(config: HookConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// Run one invocation against a read-only snapshot of the store.
    pub fn invoke(&self, state: &impl HookState, ctx: &RequestContext) -> Result<Outcome> {
        let envelope = payload::decode(&ctx.payload, self.config.dev_mode)?;
        let call = CallContext {
            campaign_id: ctx.campaign_id,
            sender: ctx.sender,
            amount: ctx.amount,
            now: envelope.override_time.unwrap_or(ctx.ledger_time),
        };

        debug!(
            campaign_id = call.campaign_id,
            mode = envelope.request.name(),
            sender = %call.sender,
            amount = call.amount,
            now = call.now,
            dev_override = envelope.override_time.is_some(),
            "invoking hook"
        );

        let outcome = self.dispatch(state, &call, envelope.request);
        if let Err(err) = &outcome {
            warn!(campaign_id = call.campaign_id, code = err.code(), %err, "invocation rejected");
        }
        outcome
    }

    fn dispatch(
        &self,
        state: &impl HookState,
        call: &CallContext,
        request: Request,
    ) -> Result<Outcome> {
        match request {
            Request::CreateCampaign {
                fund_raise_goal,
                fund_raise_end_time,
                milestones,
            } => lifecycle::create_campaign(
                state,
                call,
                &self.config,
                fund_raise_goal,
                fund_raise_end_time,
                &milestones,
            ),
            Request::FundCampaign => lifecycle::fund_campaign(state, call, &self.config),
            Request::VoteRejectMilestone { fund_transaction_id } => {
                voting::vote(state, call, fund_transaction_id, VoteDirection::Reject)
            }
            Request::VoteApproveMilestone { fund_transaction_id } => {
                voting::vote(state, call, fund_transaction_id, VoteDirection::Approve)
            }
            Request::RequestRefundPayment { fund_transaction_id } => {
                lifecycle::request_refund(state, call, fund_transaction_id)
            }
            Request::RequestMilestonePayoutPayment { milestone_index } => {
                lifecycle::request_milestone_payout(state, call, milestone_index)
            }
        }
    }
}
