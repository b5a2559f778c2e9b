//! Inbound payload framing.
//!
//! ```text
//! mode(1) [override_time(8) if mode & 0x80] fields…
//! ```
//!
//! | Mode | Request                  | Fields                                          |
//! |------|--------------------------|-------------------------------------------------|
//! | 0x00 | create campaign          | goal(8) end_time(8) n(1) n × (end_time(8) percent(1)) |
//! | 0x01 | fund campaign            | none                                             |
//! | 0x02 | vote reject milestone    | fund_transaction_id(4)                          |
//! | 0x03 | vote approve milestone   | fund_transaction_id(4)                          |
//! | 0x04 | request refund payment   | fund_transaction_id(4)                          |
//! | 0x05 | request milestone payout | milestone_index(1)                              |
//!
//! The dev bit carries an explicit evaluation timestamp for deterministic
//! testing and is only honoured when the hook runs in dev mode.

use crate::codec::{Reader, Writer};
use crate::errors::{HookError, Result};
use crate::types::MILESTONES_MAX_LENGTH;

pub const MODE_CREATE_CAMPAIGN_FLAG: u8 = 0x00;
pub const MODE_FUND_CAMPAIGN_FLAG: u8 = 0x01;
pub const MODE_VOTE_REJECT_MILESTONE_FLAG: u8 = 0x02;
pub const MODE_VOTE_APPROVE_MILESTONE_FLAG: u8 = 0x03;
pub const MODE_REQUEST_REFUND_PAYMENT_FLAG: u8 = 0x04;
pub const MODE_REQUEST_MILESTONE_PAYOUT_PAYMENT_FLAG: u8 = 0x05;

pub const MODE_DEV_BIT: u8 = 0x80;

/// Milestone schedule entry of a create-campaign request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MilestonePayload {
    pub end_time: u64,
    pub payout_percent: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    CreateCampaign {
        fund_raise_goal: u64,
        fund_raise_end_time: u64,
        milestones: Vec<MilestonePayload>,
    },
    FundCampaign,
    VoteRejectMilestone { fund_transaction_id: u32 },
    VoteApproveMilestone { fund_transaction_id: u32 },
    RequestRefundPayment { fund_transaction_id: u32 },
    RequestMilestonePayoutPayment { milestone_index: u8 },
}

/// A decoded payload plus the optional dev-mode clock override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub request: Request,
    pub override_time: Option<u64>,
}

impl Request {
    pub fn mode_flag(&self) -> u8 {
        match self {
            Self::CreateCampaign { .. } => MODE_CREATE_CAMPAIGN_FLAG,
            Self::FundCampaign => MODE_FUND_CAMPAIGN_FLAG,
            Self::VoteRejectMilestone { .. } => MODE_VOTE_REJECT_MILESTONE_FLAG,
            Self::VoteApproveMilestone { .. } => MODE_VOTE_APPROVE_MILESTONE_FLAG,
            Self::RequestRefundPayment { .. } => MODE_REQUEST_REFUND_PAYMENT_FLAG,
            Self::RequestMilestonePayoutPayment { .. } => {
                MODE_REQUEST_MILESTONE_PAYOUT_PAYMENT_FLAG
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCampaign { .. } => "create_campaign",
            Self::FundCampaign => "fund_campaign",
            Self::VoteRejectMilestone { .. } => "vote_reject_milestone",
            Self::VoteApproveMilestone { .. } => "vote_approve_milestone",
            Self::RequestRefundPayment { .. } => "request_refund_payment",
            Self::RequestMilestonePayoutPayment { .. } => "request_milestone_payout_payment",
        }
    }

    /// Encode the request; `override_time` sets the dev bit.
    pub fn encode(&self, override_time: Option<u64>) -> Vec<u8> {
        let mut w = Writer::default();
        match override_time {
            Some(t) => w.u8(self.mode_flag() | MODE_DEV_BIT).u64(t),
            None => w.u8(self.mode_flag()),
        };
        match self {
            Self::CreateCampaign {
                fund_raise_goal,
                fund_raise_end_time,
                milestones,
            } => {
                w.u64(*fund_raise_goal)
                    .u64(*fund_raise_end_time)
                    .u8(milestones.len() as u8);
                for m in milestones {
                    w.u64(m.end_time).u8(m.payout_percent);
                }
            }
            Self::FundCampaign => {}
            Self::VoteRejectMilestone { fund_transaction_id }
            | Self::VoteApproveMilestone { fund_transaction_id }
            | Self::RequestRefundPayment { fund_transaction_id } => {
                w.u32(*fund_transaction_id);
            }
            Self::RequestMilestonePayoutPayment { milestone_index } => {
                w.u8(*milestone_index);
            }
        }
        w.finish()
    }
}

/// Decode a raw payload. The dev bit is rejected unless `dev_mode` is set.
pub fn decode(payload: &[u8], dev_mode: bool) -> Result<Envelope> {
    let mut r = Reader::payload(payload);
    let raw_mode = r.u8("mode flag")?;

    let override_time = if raw_mode & MODE_DEV_BIT != 0 {
        if !dev_mode {
            return Err(HookError::malformed(
                "dev mode flag used while dev mode is disabled",
            ));
        }
        Some(r.u64("override time")?)
    } else {
        None
    };

    let request = match raw_mode & !MODE_DEV_BIT {
        MODE_CREATE_CAMPAIGN_FLAG => {
            let fund_raise_goal = r.u64("fund raise goal")?;
            let fund_raise_end_time = r.u64("fund raise end time")?;
            let count = r.u8("milestone count")? as usize;
            if count == 0 || count > MILESTONES_MAX_LENGTH {
                return Err(HookError::malformed(format!(
                    "total milestones must be between 1 and {MILESTONES_MAX_LENGTH}, got {count}"
                )));
            }
            let mut milestones = Vec::with_capacity(count);
            for _ in 0..count {
                milestones.push(MilestonePayload {
                    end_time: r.u64("milestone end time")?,
                    payout_percent: r.u8("milestone payout percent")?,
                });
            }
            Request::CreateCampaign {
                fund_raise_goal,
                fund_raise_end_time,
                milestones,
            }
        }
        MODE_FUND_CAMPAIGN_FLAG => Request::FundCampaign,
        MODE_VOTE_REJECT_MILESTONE_FLAG => Request::VoteRejectMilestone {
            fund_transaction_id: r.u32("fund transaction id")?,
        },
        MODE_VOTE_APPROVE_MILESTONE_FLAG => Request::VoteApproveMilestone {
            fund_transaction_id: r.u32("fund transaction id")?,
        },
        MODE_REQUEST_REFUND_PAYMENT_FLAG => Request::RequestRefundPayment {
            fund_transaction_id: r.u32("fund transaction id")?,
        },
        MODE_REQUEST_MILESTONE_PAYOUT_PAYMENT_FLAG => Request::RequestMilestonePayoutPayment {
            milestone_index: r.u8("milestone index")?,
        },
        other => {
            return Err(HookError::malformed(format!("invalid mode flag {other:#04x}")));
        }
    };

    if r.remaining() != 0 {
        return Err(HookError::malformed(format!(
            "{} trailing bytes after {} payload",
            r.remaining(),
            request.name()
        )));
    }

    Ok(Envelope {
        request,
        override_time,
    })
}
