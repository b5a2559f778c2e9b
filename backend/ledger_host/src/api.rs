//! Axum REST API handlers.
//!
//! `POST /transactions` takes a raw hex payload exactly as a wallet would
//! attach it. The campaign routes build the same payloads from JSON for
//! convenience; both paths end in [`Ledger::submit`].

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crowdfund_hook::{MilestonePayload, Request};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::errors::HostError;
use crate::ledger::{ledger_time, Ledger, Receipt, Submission};
use crate::views::{self, CampaignView, StateEntryView};

pub struct ApiState {
    pub ledger: Ledger,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/deposit-fee/:operation", get(deposit_fee))
        .route("/transactions", get(get_transactions).post(submit_transaction))
        .route("/campaigns", get(get_campaigns).post(create_campaign))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id/fund-transactions", post(fund_campaign))
        .route(
            "/campaigns/:id/fund-transactions/:fund_transaction_id/:action",
            post(fund_transaction_action),
        )
        .route(
            "/campaigns/:id/milestones/:index/request-milestone-payout-payment",
            post(request_milestone_payout),
        )
        .route("/payments", get(get_payments))
        .route("/state", get(get_state))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RawTransactionBody {
    pub campaign_id: u32,
    pub sender: String,
    #[serde(default)]
    pub amount: u64,
    /// Hex-encoded payload.
    pub payload: String,
}

#[derive(Deserialize)]
pub struct MilestoneBody {
    pub end_time: u64,
    pub payout_percent: u8,
}

#[derive(Deserialize)]
pub struct CreateCampaignBody {
    pub campaign_id: u32,
    pub sender: String,
    pub amount: u64,
    pub fund_raise_goal: u64,
    pub fund_raise_end_time: u64,
    pub milestones: Vec<MilestoneBody>,
    /// Evaluation time; only accepted in dev mode.
    pub override_time: Option<u64>,
}

#[derive(Deserialize)]
pub struct FundBody {
    pub sender: String,
    pub amount: u64,
    pub override_time: Option<u64>,
}

#[derive(Deserialize)]
pub struct SenderBody {
    pub sender: String,
    pub override_time: Option<u64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ledger_time: u64,
}

#[derive(Serialize)]
pub struct DepositFeeResponse {
    pub operation: String,
    pub deposit_drops: u64,
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub count: usize,
    pub campaigns: Vec<CampaignView>,
}

#[derive(Serialize)]
pub struct StateResponse {
    pub count: usize,
    pub entries: Vec<StateEntryView>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub items: Vec<T>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!(ErrorResponse {
            error: error.to_string()
        })),
    )
        .into_response()
}

fn host_error_response(e: HostError) -> Response {
    match e {
        HostError::BadRequest(_) => error_response(StatusCode::BAD_REQUEST, e),
        HostError::Rejected(_) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Accepted receipts are `200`, hook rejections `400` with the same body.
fn receipt_response(result: crate::errors::Result<Receipt>) -> Response {
    match result {
        Ok(receipt) => {
            let status = if receipt.accepted {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(serde_json::json!(receipt))).into_response()
        }
        Err(e) => host_error_response(e),
    }
}

async fn submit_request(
    state: &ApiState,
    campaign_id: u32,
    sender: String,
    amount: u64,
    request: Request,
    override_time: Option<u64>,
) -> Response {
    let submission = Submission {
        campaign_id,
        sender,
        amount,
        payload: request.encode(override_time),
    };
    receipt_response(state.ledger.submit(submission).await)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ledger_time: ledger_time(),
    })
}

/// `GET /deposit-fee/:operation`
///
/// `operation` is `create-campaign` or `fund-campaign`.
pub async fn deposit_fee(
    State(state): State<Arc<ApiState>>,
    Path(operation): Path<String>,
) -> Response {
    let config = state.ledger.hook().config();
    let deposit_drops = match operation.as_str() {
        "create-campaign" => config.create_campaign_deposit,
        "fund-campaign" => config.fund_campaign_deposit,
        other => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("unknown operation '{other}'"),
            )
        }
    };
    Json(DepositFeeResponse {
        operation,
        deposit_drops,
    })
    .into_response()
}

/// `POST /transactions`
///
/// Submits a raw hex payload to the hook.
pub async fn submit_transaction(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RawTransactionBody>,
) -> Response {
    let payload = match hex::decode(body.payload.trim_start_matches("0x")) {
        Ok(payload) => payload,
        Err(e) => {
            return host_error_response(HostError::BadRequest(format!("payload is not hex: {e}")))
        }
    };
    let submission = Submission {
        campaign_id: body.campaign_id,
        sender: body.sender,
        amount: body.amount,
        payload,
    };
    receipt_response(state.ledger.submit(submission).await)
}

/// `POST /campaigns`
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateCampaignBody>,
) -> Response {
    let request = Request::CreateCampaign {
        fund_raise_goal: body.fund_raise_goal,
        fund_raise_end_time: body.fund_raise_end_time,
        milestones: body
            .milestones
            .iter()
            .map(|m| MilestonePayload {
                end_time: m.end_time,
                payout_percent: m.payout_percent,
            })
            .collect(),
    };
    submit_request(
        &state,
        body.campaign_id,
        body.sender,
        body.amount,
        request,
        body.override_time,
    )
    .await
}

/// `POST /campaigns/:id/fund-transactions`
pub async fn fund_campaign(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u32>,
    Json(body): Json<FundBody>,
) -> Response {
    submit_request(
        &state,
        campaign_id,
        body.sender,
        body.amount,
        Request::FundCampaign,
        body.override_time,
    )
    .await
}

/// `POST /campaigns/:id/fund-transactions/:fund_transaction_id/:action`
///
/// `action` is `vote-reject`, `vote-approve` or `request-refund-payment`.
pub async fn fund_transaction_action(
    State(state): State<Arc<ApiState>>,
    Path((campaign_id, fund_transaction_id, action)): Path<(u32, u32, String)>,
    Json(body): Json<SenderBody>,
) -> Response {
    let request = match action.as_str() {
        "vote-reject" => Request::VoteRejectMilestone { fund_transaction_id },
        "vote-approve" => Request::VoteApproveMilestone { fund_transaction_id },
        "request-refund-payment" => Request::RequestRefundPayment { fund_transaction_id },
        other => {
            return error_response(StatusCode::NOT_FOUND, format!("unknown action '{other}'"))
        }
    };
    submit_request(&state, campaign_id, body.sender, 0, request, body.override_time).await
}

/// `POST /campaigns/:id/milestones/:index/request-milestone-payout-payment`
pub async fn request_milestone_payout(
    State(state): State<Arc<ApiState>>,
    Path((campaign_id, milestone_index)): Path<(u32, u8)>,
    Json(body): Json<SenderBody>,
) -> Response {
    submit_request(
        &state,
        campaign_id,
        body.sender,
        0,
        Request::RequestMilestonePayoutPayment { milestone_index },
        body.override_time,
    )
    .await
}

/// `GET /campaigns`
pub async fn get_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    match state.ledger.campaigns(ledger_time()).await {
        Ok(campaigns) => {
            let count = campaigns.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(CampaignsResponse { count, campaigns })),
            )
                .into_response()
        }
        Err(e) => host_error_response(e),
    }
}

/// `GET /campaigns/:id`
///
/// Decoded General Info, derived phases and every pledge of the campaign.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u32>,
) -> Response {
    match state.ledger.campaign(campaign_id, ledger_time()).await {
        Ok(Some(view)) => (StatusCode::OK, Json(serde_json::json!(view))).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no campaign found with id {campaign_id}"),
        ),
        Err(e) => host_error_response(e),
    }
}

/// `GET /payments`
pub async fn get_payments(State(state): State<Arc<ApiState>>) -> Response {
    match db::get_payments(state.ledger.pool()).await {
        Ok(items) => Json(ListResponse {
            count: items.len(),
            items,
        })
        .into_response(),
        Err(e) => host_error_response(e),
    }
}

/// `GET /transactions`
pub async fn get_transactions(State(state): State<Arc<ApiState>>) -> Response {
    match db::get_transactions(state.ledger.pool()).await {
        Ok(items) => Json(ListResponse {
            count: items.len(),
            items,
        })
        .into_response(),
        Err(e) => host_error_response(e),
    }
}

/// `GET /state`
///
/// Raw hook state: hex keys, base64 values.
pub async fn get_state(State(state): State<Arc<ApiState>>) -> Response {
    match db::all_state(state.ledger.pool()).await {
        Ok(rows) => {
            let entries: Vec<_> = rows.iter().map(views::state_entry_view).collect();
            Json(StateResponse {
                count: entries.len(),
                entries,
            })
            .into_response()
        }
        Err(e) => host_error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
