//! # REST API
//!
//! Builds the axum router that exposes the credit ledger over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                        |
//! |--------|-----------------------------------|------------------------------------|
//! | GET    | `/health`                         | Liveness probe                     |
//! | GET    | `/status`                         | Service status summary             |
//! | POST   | `/accounts`                       | Create account (signup bonus)      |
//! | GET    | `/accounts/:user_id/balance`      | Normalized balance                 |
//! | GET    | `/accounts/:user_id/history`      | Ledger entries, newest first       |
//! | POST   | `/accounts/:user_id/referral-bonus` | Fire the dual-sided referral bonus |
//! | POST   | `/payments/:provider/confirm`     | Provider payment callback          |
//! | POST   | `/listings`                       | Register a listing with the ledger |
//! | POST   | `/auctions`                       | Register an auction with the ledger|
//! | POST   | `/spend/boost`                    | Boost a listing                    |
//! | POST   | `/spend/subscription`             | Buy a collection subscription      |
//! | POST   | `/spend/auction-fee`              | Charge an auction creation fee     |
//! | POST   | `/spend/listing-fee`              | Pay a listing fee                  |
//! | POST   | `/spend/relist`                   | Relist an expired listing          |
//! | POST   | `/spend/promotion`                | Promote a listing or auction       |
//!
//! Ledger errors map onto status codes by class: missing things are 404,
//! ownership failures 403, uncovered costs 402, relist guards 409,
//! parameter problems 422, storage trouble 500.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use curio_ledger::config;
use curio_ledger::error::LedgerResult;
use curio_ledger::market::{Auction, Listing, ListingKind};
use curio_ledger::ops::{PaymentProvider, PromotionRequest, SpendReceipt};
use curio_ledger::{Ledger, LedgerError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    /// The credit ledger every handler operates on.
    pub ledger: Arc<Ledger>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts", post(create_account_handler))
        .route("/accounts/:user_id/balance", get(balance_handler))
        .route("/accounts/:user_id/history", get(history_handler))
        .route(
            "/accounts/:user_id/referral-bonus",
            post(referral_bonus_handler),
        )
        .route("/payments/:provider/confirm", post(confirm_payment_handler))
        .route("/listings", post(register_listing_handler))
        .route("/auctions", post(register_auction_handler))
        .route("/spend/boost", post(boost_handler))
        .route("/spend/subscription", post(subscription_handler))
        .route("/spend/auction-fee", post(auction_fee_handler))
        .route("/spend/listing-fee", post(listing_fee_handler))
        .route("/spend/relist", post(relist_handler))
        .route("/spend/promotion", post(promotion_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Service software version.
    pub version: String,
    /// Number of accounts in the ledger.
    pub accounts: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Request body for `POST /accounts`.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Marketplace user id. Must be non-empty.
    pub user_id: String,
    /// The inviting user, when the signup came through a referral link.
    pub referred_by: Option<String>,
}

/// Response payload for `POST /accounts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub user_id: String,
    /// Total spendable credits.
    pub credits: u64,
    /// The promotional portion of the balance.
    pub promo_remaining: u64,
    /// When the promotional portion expires, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_expires_at: Option<DateTime<Utc>>,
    /// `false` when the account already existed.
    pub created: bool,
}

/// Query parameters for `GET /accounts/:user_id/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of entries to return. Omit for the full history.
    pub limit: Option<usize>,
}

/// Request body for `POST /payments/:provider/confirm`.
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub user_id: String,
    /// Paid amount in minor currency units (cents), as reported by the
    /// provider.
    pub paid_amount_minor: i64,
    /// The provider's unique reference for this payment.
    pub payment_reference: String,
}

/// Request body for `POST /listings`.
#[derive(Debug, Deserialize)]
pub struct RegisterListingRequest {
    /// Listing id; generated when omitted.
    pub id: Option<Uuid>,
    /// The selling user. Omitted only for legacy imports.
    pub owner: Option<String>,
    pub kind: ListingKind,
}

/// Request body for `POST /auctions`.
#[derive(Debug, Deserialize)]
pub struct RegisterAuctionRequest {
    /// Auction id; generated when omitted.
    pub id: Option<Uuid>,
    /// The selling user. Omitted only for legacy imports.
    pub owner: Option<String>,
}

/// Request body for `POST /spend/boost`.
#[derive(Debug, Deserialize)]
pub struct BoostRequest {
    pub user_id: String,
    pub listing_id: Uuid,
    /// Client-generated key making retries of this exact request free.
    pub idempotency_key: Option<Uuid>,
}

/// Request body for `POST /spend/subscription`.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub user_id: String,
    pub years: u32,
    pub idempotency_key: Option<Uuid>,
}

/// Request body for `POST /spend/auction-fee`.
#[derive(Debug, Deserialize)]
pub struct AuctionFeeRequest {
    pub user_id: String,
    pub auction_id: Uuid,
    pub duration_hours: u32,
    pub idempotency_key: Option<Uuid>,
}

/// Request body for `POST /spend/listing-fee` and `POST /spend/relist`.
#[derive(Debug, Deserialize)]
pub struct ListingFeeRequest {
    pub user_id: String,
    pub listing_id: Uuid,
    pub days: u32,
    pub idempotency_key: Option<Uuid>,
}

/// Request body for `POST /spend/promotion`.
#[derive(Debug, Deserialize)]
pub struct PromotionSpendRequest {
    pub user_id: String,
    /// Promote a product listing. Exactly one of the two targets.
    pub product_id: Option<Uuid>,
    /// Promote an auction.
    pub auction_id: Option<Uuid>,
    pub duration_hours: Option<u32>,
    pub idempotency_key: Option<Uuid>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn status_for(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::AccountNotFound(_)
        | LedgerError::ListingNotFound(_)
        | LedgerError::AuctionNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::NotOwner { .. } => StatusCode::FORBIDDEN,
        LedgerError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        LedgerError::NotRelistable(_)
        | LedgerError::ListingSold(_)
        | LedgerError::ListingNotApproved(_) => StatusCode::CONFLICT,
        LedgerError::AmbiguousPromotionTarget
        | LedgerError::Fee(_)
        | LedgerError::Overflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Storage(_) | LedgerError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: LedgerError) -> Response {
    let status = status_for(&e);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "ledger operation failed");
    }
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

fn validation_error(message: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Shared tail for every spend handler: metrics plus status mapping.
fn spend_response(state: &AppState, result: LedgerResult<SpendReceipt>) -> Response {
    match result {
        Ok(receipt) => {
            if !receipt.replayed {
                state.metrics.spends_total.inc();
                state.metrics.credits_spent_total.inc_by(receipt.cost);
            }
            (StatusCode::OK, Json(receipt)).into_response()
        }
        Err(e) => {
            if matches!(e, LedgerError::InsufficientCredits { .. }) {
                state.metrics.insufficient_funds_total.inc();
            }
            error_response(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the service is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch the ledger store — that belongs in
/// `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a service status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        accounts: state.ledger.store().account_count() as u64,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `POST /accounts` — creates an account with the signup bonus, or
/// returns the existing one. 201 on creation, 200 on the no-op.
async fn create_account_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    if req.user_id.is_empty() || req.user_id.contains('\0') {
        return validation_error("user_id must be a non-empty string without NUL bytes");
    }

    match state.ledger.create_account(&req.user_id, req.referred_by) {
        Ok(creation) => {
            if creation.created {
                state.metrics.earns_total.inc();
                state
                    .metrics
                    .credits_earned_total
                    .inc_by(creation.account.promo_remaining());
            }
            let status = if creation.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(AccountResponse {
                    user_id: creation.account.user_id.clone(),
                    credits: creation.account.credits(),
                    promo_remaining: creation.account.promo_remaining(),
                    promo_expires_at: creation.account.promo.map(|p| p.expires_at),
                    created: creation.created,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `GET /accounts/:user_id/balance` — the expiry-normalized balance.
async fn balance_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.ledger.balance(&user_id) {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /accounts/:user_id/history?limit=N` — ledger entries, newest first.
async fn history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.ledger.history(&user_id, query.limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /accounts/:user_id/referral-bonus` — fires the dual-sided
/// referral bonus, at most once per user.
async fn referral_bonus_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.ledger.apply_referral_bonus(&user_id) {
        Ok(outcome) => {
            if outcome.applied {
                state.metrics.earns_total.inc();
                state.metrics.credits_earned_total.inc_by(
                    config::REFERRAL_BONUS_REFERRED_CREDITS
                        + config::REFERRAL_BONUS_INVITER_CREDITS,
                );
            }
            Json(outcome).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `POST /payments/:provider/confirm` — provider payment callback.
///
/// Safe to retry: a reference that was already credited returns
/// `already_processed` without touching the balance.
async fn confirm_payment_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Response {
    let provider: PaymentProvider = match provider.parse() {
        Ok(p) => p,
        Err(e) => return validation_error(e),
    };

    match state.ledger.record_purchase(
        &req.user_id,
        provider,
        req.paid_amount_minor,
        &req.payment_reference,
    ) {
        Ok(outcome) => {
            if outcome.credits_added > 0 {
                state.metrics.earns_total.inc();
                state
                    .metrics
                    .credits_earned_total
                    .inc_by(outcome.credits_added);
            }
            Json(outcome).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `POST /listings` — registers a listing the ledger can charge against.
async fn register_listing_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterListingRequest>,
) -> Response {
    let listing = Listing::new(req.id.unwrap_or_else(Uuid::new_v4), req.owner, req.kind);
    match state.ledger.store().put_listing(&listing) {
        Ok(()) => (StatusCode::CREATED, Json(listing)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /auctions` — registers an auction the ledger can charge against.
async fn register_auction_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterAuctionRequest>,
) -> Response {
    let auction = Auction::new(req.id.unwrap_or_else(Uuid::new_v4), req.owner);
    match state.ledger.store().put_auction(&auction) {
        Ok(()) => (StatusCode::CREATED, Json(auction)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /spend/boost` — boosts a listing's visibility.
async fn boost_handler(
    State(state): State<AppState>,
    Json(req): Json<BoostRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state
        .ledger
        .boost_listing(&req.user_id, req.listing_id, req.idempotency_key);
    spend_response(&state, result)
}

/// `POST /spend/subscription` — buys a collection subscription.
async fn subscription_handler(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state
        .ledger
        .subscribe_collection(&req.user_id, req.years, req.idempotency_key);
    spend_response(&state, result)
}

/// `POST /spend/auction-fee` — charges the tiered auction creation fee.
async fn auction_fee_handler(
    State(state): State<AppState>,
    Json(req): Json<AuctionFeeRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state.ledger.charge_auction_creation(
        &req.user_id,
        req.auction_id,
        req.duration_hours,
        req.idempotency_key,
    );
    spend_response(&state, result)
}

/// `POST /spend/listing-fee` — pays to keep a listing live.
async fn listing_fee_handler(
    State(state): State<AppState>,
    Json(req): Json<ListingFeeRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state.ledger.pay_listing_fee(
        &req.user_id,
        req.listing_id,
        req.days,
        req.idempotency_key,
    );
    spend_response(&state, result)
}

/// `POST /spend/relist` — relists an expired fixed-price listing.
async fn relist_handler(
    State(state): State<AppState>,
    Json(req): Json<ListingFeeRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state
        .ledger
        .relist(&req.user_id, req.listing_id, req.days, req.idempotency_key);
    spend_response(&state, result)
}

/// `POST /spend/promotion` — promotes a listing or auction to the
/// homepage. The body must name exactly one target.
async fn promotion_handler(
    State(state): State<AppState>,
    Json(req): Json<PromotionSpendRequest>,
) -> Response {
    let _timer = state.metrics.spend_latency_seconds.start_timer();
    let result = state.ledger.promote(
        &req.user_id,
        PromotionRequest {
            product_id: req.product_id,
            auction_id: req.auction_id,
            duration_hours: req.duration_hours,
        },
        req.idempotency_key,
    );
    spend_response(&state, result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use curio_ledger::entry::EntryKind;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app_state() -> AppState {
        AppState {
            version: "0.1.0-test".into(),
            ledger: Arc::new(Ledger::open_temporary().expect("temp ledger")),
            metrics: Arc::new(crate::metrics::LedgerMetrics::new()),
        }
    }

    /// Sends a GET request and returns (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Creates an account and funds it with a Stripe payment through the
    /// public API, returning its resulting balance.
    async fn create_and_fund(router: &Router, user: &str, paid_minor: i64) -> u64 {
        post_json(
            router,
            "/accounts",
            serde_json::json!({ "user_id": user }),
        )
        .await;
        post_json(
            router,
            "/payments/stripe/confirm",
            serde_json::json!({
                "user_id": user,
                "paid_amount_minor": paid_minor,
                "payment_reference": format!("stripe_{user}_{paid_minor}"),
            }),
        )
        .await;
        let (_, body) = get(router, &format!("/accounts/{user}/balance")).await;
        let view: serde_json::Value = serde_json::from_slice(&body).unwrap();
        view["credits"].as_u64().unwrap()
    }

    /// Registers an owned fixed-price listing and returns its id.
    async fn register_listing(router: &Router, owner: &str) -> Uuid {
        let (status, body) = post_json(
            router,
            "/listings",
            serde_json::json!({ "owner": owner, "kind": "fixed_price" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let listing: Listing = serde_json::from_slice(&body).unwrap();
        listing.id
    }

    // -- Probes ---------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_endpoint_counts_accounts() {
        let state = test_app_state();
        let router = create_router(state);
        post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.accounts, 1);
        assert_eq!(resp.version, "0.1.0-test");
    }

    // -- Accounts -------------------------------------------------------------

    #[tokio::test]
    async fn create_account_grants_bonus_and_is_idempotent() {
        let router = create_router(test_app_state());
        let bonus = config::signup_bonus_at(Utc::now()).credits;

        let (status, body) = post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let resp: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert!(resp.created);
        assert_eq!(resp.credits, bonus);
        assert_eq!(resp.promo_remaining, bonus);

        // Second call is a 200 no-op.
        let (status, body) = post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert!(!resp.created);
    }

    #[tokio::test]
    async fn create_account_rejects_empty_user_id() {
        let router = create_router(test_app_state());
        let (status, _) = post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn balance_returns_404_for_unknown_user() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/accounts/ghost/balance").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("ghost"));
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let router = create_router(test_app_state());
        create_and_fund(&router, "alice", 1000).await;

        let (status, body) = get(&router, "/accounts/alice/history?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(entries.len(), 1);
        // Newest first: the purchase, not the signup bonus.
        assert_eq!(entries[0]["kind"], "purchase_stripe");
    }

    // -- Referral -------------------------------------------------------------

    #[tokio::test]
    async fn referral_bonus_endpoint_applies_once() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;
        post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "bob", "referred_by": "alice" }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/accounts/bob/referral-bonus",
            serde_json::json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["applied"], true);

        let (_, body) = post_json(
            &router,
            "/accounts/bob/referral-bonus",
            serde_json::json!({}),
        )
        .await;
        let resp: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["applied"], false);
    }

    // -- Payments -------------------------------------------------------------

    #[tokio::test]
    async fn payment_callback_credits_and_dedupes() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;

        let payment = serde_json::json!({
            "user_id": "alice",
            "paid_amount_minor": 1000,
            "payment_reference": "stripe_abc",
        });
        let (status, body) = post_json(&router, "/payments/stripe/confirm", payment.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let resp: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["credits_added"], 20);
        assert_eq!(resp["already_processed"], false);

        let (_, body) = post_json(&router, "/payments/stripe/confirm", payment).await;
        let resp: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp["already_processed"], true);
    }

    #[tokio::test]
    async fn unknown_payment_provider_is_rejected() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/payments/paypal/confirm",
            serde_json::json!({
                "user_id": "alice",
                "paid_amount_minor": 1000,
                "payment_reference": "pp_1",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("paypal"));
    }

    // -- Spends ---------------------------------------------------------------

    #[tokio::test]
    async fn boost_spend_roundtrip() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let balance = create_and_fund(&router, "alice", 1000).await;
        let listing_id = register_listing(&router, "alice").await;

        let (status, body) = post_json(
            &router,
            "/spend/boost",
            serde_json::json!({ "user_id": "alice", "listing_id": listing_id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: SpendReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.kind, EntryKind::SpendBoost);
        assert_eq!(receipt.cost, config::BOOST_PRICE_CREDITS);
        assert_eq!(receipt.remaining_credits, balance - config::BOOST_PRICE_CREDITS);

        assert_eq!(state.metrics.spends_total.get(), 1);
        assert_eq!(
            state.metrics.credits_spent_total.get(),
            config::BOOST_PRICE_CREDITS
        );
    }

    #[tokio::test]
    async fn insufficient_credits_map_to_402() {
        let state = test_app_state();
        let router = create_router(state.clone());
        // Signup bonus only — not enough for a subscription.
        post_json(
            &router,
            "/accounts",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/spend/subscription",
            serde_json::json!({ "user_id": "alice", "years": 3 }),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("insufficient"));
        assert_eq!(state.metrics.insufficient_funds_total.get(), 1);
    }

    #[tokio::test]
    async fn foreign_listing_spend_maps_to_403() {
        let router = create_router(test_app_state());
        create_and_fund(&router, "mallory", 1000).await;
        let listing_id = register_listing(&router, "alice").await;

        let (status, _) = post_json(
            &router,
            "/spend/boost",
            serde_json::json!({ "user_id": "mallory", "listing_id": listing_id }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_listing_spend_maps_to_404() {
        let router = create_router(test_app_state());
        create_and_fund(&router, "alice", 1000).await;

        let (status, _) = post_json(
            &router,
            "/spend/boost",
            serde_json::json!({ "user_id": "alice", "listing_id": Uuid::new_v4() }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn relist_of_sold_listing_maps_to_409() {
        let state = test_app_state();
        let router = create_router(state.clone());
        create_and_fund(&router, "alice", 1000).await;

        let mut listing = Listing::new(
            Uuid::new_v4(),
            Some("alice".into()),
            ListingKind::FixedPrice,
        );
        listing.sold = true;
        state.ledger.store().put_listing(&listing).unwrap();

        let (status, _) = post_json(
            &router,
            "/spend/relist",
            serde_json::json!({ "user_id": "alice", "listing_id": listing.id, "days": 30 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn ambiguous_promotion_maps_to_422() {
        let router = create_router(test_app_state());
        create_and_fund(&router, "alice", 1000).await;

        let (status, _) = post_json(
            &router,
            "/spend/promotion",
            serde_json::json!({ "user_id": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn auction_fee_spend_roundtrip() {
        let state = test_app_state();
        let router = create_router(state.clone());
        create_and_fund(&router, "alice", 1000).await;

        let (status, body) = post_json(
            &router,
            "/auctions",
            serde_json::json!({ "owner": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let auction: Auction = serde_json::from_slice(&body).unwrap();

        let (status, body) = post_json(
            &router,
            "/spend/auction-fee",
            serde_json::json!({
                "user_id": "alice",
                "auction_id": auction.id,
                "duration_hours": 72,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: SpendReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.cost, config::AUCTION_BASE_PRICE_CREDITS);
        assert!(receipt.expires_at.is_some());
    }

    #[tokio::test]
    async fn idempotent_spend_replays_over_http() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let balance = create_and_fund(&router, "alice", 1000).await;
        let listing_id = register_listing(&router, "alice").await;
        let key = Uuid::new_v4();

        let body = serde_json::json!({
            "user_id": "alice",
            "listing_id": listing_id,
            "idempotency_key": key,
        });
        let (_, first) = post_json(&router, "/spend/boost", body.clone()).await;
        let (_, second) = post_json(&router, "/spend/boost", body).await;

        let first: SpendReceipt = serde_json::from_slice(&first).unwrap();
        let second: SpendReceipt = serde_json::from_slice(&second).unwrap();
        assert!(!first.replayed);
        assert!(second.replayed);

        // Charged once, counted once.
        let (_, body) = get(&router, "/accounts/alice/balance").await;
        let view: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            view["credits"].as_u64().unwrap(),
            balance - config::BOOST_PRICE_CREDITS
        );
        assert_eq!(state.metrics.spends_total.get(), 1);
    }
}
