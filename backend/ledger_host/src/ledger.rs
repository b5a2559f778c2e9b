//! Sequenced hook invocation.
//!
//! The ledger applies one transaction at a time: take the sequencer lock,
//! snapshot the target campaign's records, run the hook against the
//! snapshot, then commit its writes in a single SQL transaction. A rejection
//! at any step leaves the store exactly as it was.

use chrono::Utc;
use crowdfund_hook::{payload, Address, CrowdfundHook, RequestContext};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::{self, NewTransaction};
use crate::errors::{HostError, Result};
use crate::views::{self, CampaignView};

/// An inbound transaction addressed to a campaign.
#[derive(Debug, Clone)]
pub struct Submission {
    pub campaign_id: u32,
    pub sender: String,
    pub amount: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmittedPaymentView {
    pub destination: String,
    pub amount: u64,
}

/// What the submitter gets back, accepted or not.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub transaction_id: i64,
    pub accepted: bool,
    pub code: u32,
    pub message: Option<String>,
    pub mode: Option<&'static str>,
    pub ledger_time: u64,
    /// Hex of the result payload.
    pub result: String,
    /// Payout or refund amount decoded from the result payload.
    pub amount: Option<u64>,
    pub fund_transaction_id: Option<u32>,
    pub emitted_payment: Option<EmittedPaymentView>,
}

pub struct Ledger {
    pool: SqlitePool,
    hook: CrowdfundHook,
    capacity: usize,
    sequencer: Mutex<()>,
}

/// Current ledger close time in unix seconds.
pub fn ledger_time() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl Ledger {
    pub fn new(pool: SqlitePool, hook: CrowdfundHook, capacity: usize) -> Self {
        Self {
            pool,
            hook,
            capacity,
            sequencer: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn hook(&self) -> &CrowdfundHook {
        &self.hook
    }

    /// Run one invocation to completion and log it. Hook rejections are
    /// reported in the receipt; only host failures surface as errors.
    pub async fn submit(&self, submission: Submission) -> Result<Receipt> {
        let _turn = self.sequencer.lock().await;
        let ledger_time = ledger_time();

        let tx_record = NewTransaction {
            campaign_id: submission.campaign_id,
            sender: submission.sender.clone(),
            amount: submission.amount,
            mode: payload::decode(&submission.payload, self.hook.config().dev_mode)
                .ok()
                .map(|envelope| envelope.request.name()),
            payload: submission.payload.clone(),
            ledger_time,
        };

        match self.invoke_and_commit(&submission, &tx_record).await {
            Ok((transaction_id, outcome)) => {
                info!(
                    transaction_id,
                    campaign_id = submission.campaign_id,
                    mode = tx_record.mode,
                    "transaction accepted"
                );
                let amount = <[u8; 8]>::try_from(outcome.result.as_slice())
                    .ok()
                    .map(u64::from_be_bytes);
                Ok(Receipt {
                    transaction_id,
                    accepted: true,
                    code: 0,
                    message: None,
                    mode: tx_record.mode,
                    ledger_time,
                    result: hex::encode(&outcome.result),
                    amount,
                    fund_transaction_id: outcome.fund_transaction_id,
                    emitted_payment: outcome.emitted.map(|p| EmittedPaymentView {
                        destination: p.destination.to_string(),
                        amount: p.amount,
                    }),
                })
            }
            Err(HostError::Rejected(err)) => {
                let transaction_id = db::record_rejected(&self.pool, &tx_record, &err).await?;
                warn!(
                    transaction_id,
                    campaign_id = submission.campaign_id,
                    code = err.code(),
                    "transaction rejected: {err}"
                );
                Ok(Receipt {
                    transaction_id,
                    accepted: false,
                    code: err.code(),
                    message: Some(err.to_string()),
                    mode: tx_record.mode,
                    ledger_time,
                    result: String::new(),
                    amount: None,
                    fund_transaction_id: None,
                    emitted_payment: None,
                })
            }
            Err(other) => Err(other),
        }
    }

    async fn invoke_and_commit(
        &self,
        submission: &Submission,
        tx_record: &NewTransaction,
    ) -> Result<(i64, crowdfund_hook::Outcome)> {
        let sender: Address = submission.sender.parse()?;
        let snapshot = db::load_snapshot(&self.pool, submission.campaign_id).await?;
        let ctx = RequestContext {
            campaign_id: submission.campaign_id,
            sender,
            amount: submission.amount,
            payload: submission.payload.clone(),
            ledger_time: tx_record.ledger_time,
        };
        let outcome = self.hook.invoke(&snapshot, &ctx)?;
        let transaction_id =
            db::commit_accepted(&self.pool, self.capacity, tx_record, &outcome).await?;
        Ok((transaction_id, outcome))
    }

    pub async fn campaign(&self, campaign_id: u32, now: u64) -> Result<Option<CampaignView>> {
        let snapshot = db::load_snapshot(&self.pool, campaign_id).await?;
        Ok(views::campaign_view(&snapshot, campaign_id, now)?)
    }

    pub async fn campaigns(&self, now: u64) -> Result<Vec<CampaignView>> {
        let mut out = Vec::new();
        for campaign_id in db::campaign_ids(&self.pool).await? {
            if let Some(view) = self.campaign(campaign_id, now).await? {
                out.push(view);
            }
        }
        Ok(out)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
