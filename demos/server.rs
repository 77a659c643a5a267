//! REST API server example for the wallet ledger and settlement engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /wallets` - Open a wallet for a seller
//! - `POST /wallets/:seller/transactions` - Apply a ledger operation
//! - `GET /wallets` - List wallet balance snapshots
//! - `GET /wallets/:seller` - Get one seller's balances
//! - `POST /settlements` - Calculate and create a settlement for a period
//! - `POST /settlements/:id/process` - Mark a settlement as processing
//! - `GET /settlements/:id` - Get a settlement
//! - `POST /webhooks/payout` - Payout-provider webhook (always acknowledged)
//!
//! ## Example Usage
//!
//! ```bash
//! # Open a wallet
//! curl -X POST http://localhost:3000/wallets \
//!   -H "Content-Type: application/json" \
//!   -d '{"seller_id": 1, "currency": "INR"}'
//!
//! # Credit settled sale proceeds
//! curl -X POST http://localhost:3000/wallets/1/transactions \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "credit", "amount": "500.00", "category": "SALE", "settled": true}'
//!
//! # Get balances
//! curl http://localhost:3000/wallets/1
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use wallet_ledger_rs::{
    BalanceSnapshot, CalculatorConfig, CategoryId, CommissionRule, CommissionTier, Currency,
    HmacSha256Verifier, InMemoryAuditLog, InMemoryCommissionRules, LedgerEngine, LedgerError,
    OrderId, OrderItem, OrderStore, ProductId, RuleScope, SellerAccountId, SellerAccounts,
    SellerId, Settlement, SettlementBook, SettlementCalculator, SettlementHistory, SettlementId,
    TracingNotifier, TransactionCategory, TxContext, WebhookAck, WebhookReconciler,
};

// === Demo Collaborators ===

/// Order store with one delivered-and-paid order per seller, so settlement
/// calculation has something to chew on out of the box.
struct DemoOrderStore;

impl OrderStore for DemoOrderStore {
    fn delivered_paid_items(
        &self,
        seller: SellerId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<OrderItem> {
        vec![OrderItem {
            order_id: OrderId(seller.0 as u64 * 1000 + 1),
            product_id: ProductId(42),
            category_id: CategoryId(7),
            quantity: 1,
            total_price: dec!(1500.00),
            commission_rate: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
        }]
    }

    fn refunded_items(
        &self,
        _seller: SellerId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<OrderItem> {
        Vec::new()
    }
}

/// Every seller resolves to a demo fund account.
struct DemoSellerAccounts;

impl SellerAccounts for DemoSellerAccounts {
    fn account_for(&self, seller: SellerId) -> Option<SellerAccountId> {
        Some(SellerAccountId(format!("fa_demo_{}", seller)))
    }
}

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
struct OpenWalletRequest {
    seller_id: u32,
    currency: String,
}

/// Request body for ledger operations.
///
/// ```json
/// {"type": "credit", "amount": "100.00", "category": "SALE"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OperationRequest {
    Credit {
        amount: Decimal,
        category: TransactionCategory,
        #[serde(default)]
        settled: bool,
        #[serde(default)]
        description: Option<String>,
    },
    Debit {
        amount: Decimal,
        category: TransactionCategory,
        #[serde(default)]
        description: Option<String>,
    },
    Reserve {
        amount: Decimal,
    },
    Release {
        amount: Decimal,
    },
    MovePending {
        amount: Decimal,
    },
}

#[derive(Debug, Deserialize)]
struct CreateSettlementRequest {
    seller_id: u32,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct StartProcessingRequest {
    payout_id: String,
    #[serde(default)]
    transfer_id: Option<String>,
    #[serde(default = "default_processor")]
    processed_by: String,
}

fn default_processor() -> String {
    "demo-operator".to_string()
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

// === Application State ===

#[derive(Clone)]
struct AppState {
    engine: Arc<LedgerEngine>,
    book: Arc<SettlementBook>,
    calculator: Arc<SettlementCalculator>,
    reconciler: Arc<WebhookReconciler>,
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LedgerError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            LedgerError::InsufficientBalance => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
            }
            LedgerError::InsufficientReserve => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_RESERVE")
            }
            LedgerError::InsufficientPending => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_PENDING")
            }
            LedgerError::WalletNotFound => (StatusCode::NOT_FOUND, "WALLET_NOT_FOUND"),
            LedgerError::WalletExists => (StatusCode::CONFLICT, "WALLET_EXISTS"),
            LedgerError::SellerAccountNotFound => {
                (StatusCode::NOT_FOUND, "SELLER_ACCOUNT_NOT_FOUND")
            }
            LedgerError::SettlementNotFound => (StatusCode::NOT_FOUND, "SETTLEMENT_NOT_FOUND"),
            LedgerError::InvalidStatusTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_STATUS_TRANSITION")
            }
            LedgerError::CurrencyMismatch => (StatusCode::BAD_REQUEST, "CURRENCY_MISMATCH"),
            LedgerError::DuplicateTransaction => (StatusCode::CONFLICT, "DUPLICATE_TRANSACTION"),
            LedgerError::SignatureVerificationFailed => {
                (StatusCode::UNAUTHORIZED, "SIGNATURE_VERIFICATION_FAILED")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn not_found(code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not found".to_string(),
            code: code.to_string(),
        }),
    )
}

// === Handlers ===

/// POST /wallets - Open a wallet for a seller.
async fn open_wallet(
    State(state): State<AppState>,
    Json(request): Json<OpenWalletRequest>,
) -> Result<(StatusCode, Json<BalanceSnapshot>), AppError> {
    let wallet = state
        .engine
        .open_wallet(SellerId(request.seller_id), Currency::new(&request.currency))?;
    Ok((StatusCode::CREATED, Json(wallet.snapshot())))
}

/// POST /wallets/:seller/transactions - Apply a ledger operation.
async fn apply_operation(
    State(state): State<AppState>,
    Path(seller): Path<u32>,
    Json(request): Json<OperationRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let wallet = state
        .engine
        .wallet_for_seller(SellerId(seller))
        .ok_or_else(|| not_found("WALLET_NOT_FOUND").into_response())?;
    let wallet_id = wallet.wallet_id();

    let receipt = match request {
        OperationRequest::Credit {
            amount,
            category,
            settled,
            description,
        } => state.engine.credit(
            wallet_id,
            amount,
            category,
            TxContext {
                settled,
                description,
                ..TxContext::default()
            },
        ),
        OperationRequest::Debit {
            amount,
            category,
            description,
        } => state.engine.debit(
            wallet_id,
            amount,
            category,
            TxContext {
                description,
                ..TxContext::default()
            },
        ),
        OperationRequest::Reserve { amount } => {
            state.engine.reserve(wallet_id, amount, TxContext::default())
        }
        OperationRequest::Release { amount } => {
            state
                .engine
                .release_reserve(wallet_id, amount, TxContext::default())
        }
        OperationRequest::MovePending { amount } => {
            state
                .engine
                .move_pending_to_available(wallet_id, amount, TxContext::default())
        }
    }
    .map_err(|err| AppError(err).into_response())?;

    Ok(Json(serde_json::json!({
        "wallet": receipt.snapshot,
        "transaction": &*receipt.transaction,
    })))
}

/// GET /wallets/:seller - Get one seller's balances.
async fn get_wallet(
    State(state): State<AppState>,
    Path(seller): Path<u32>,
) -> Result<Json<BalanceSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .wallet_for_seller(SellerId(seller))
        .map(|wallet| Json(wallet.snapshot()))
        .ok_or_else(|| not_found("WALLET_NOT_FOUND"))
}

/// GET /wallets - List all wallet snapshots.
async fn list_wallets(State(state): State<AppState>) -> Json<Vec<BalanceSnapshot>> {
    Json(state.engine.wallets().map(|w| w.snapshot()).collect())
}

/// POST /settlements - Validate, calculate, and create a settlement.
async fn create_settlement(
    State(state): State<AppState>,
    Json(request): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), Response> {
    let seller = SellerId(request.seller_id);

    let validation =
        state
            .calculator
            .validate_period(seller, request.period_start, request.period_end);
    if !validation.is_valid {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "validation": validation })),
        )
            .into_response());
    }

    let calc = state
        .calculator
        .calculate(
            seller,
            request.period_start,
            request.period_end,
            Currency::new(&request.currency),
        )
        .map_err(|err| AppError(err).into_response())?;
    let settlement = state
        .book
        .create(&calc)
        .map_err(|err| AppError(err).into_response())?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "settlement": settlement,
            "validation": validation,
        })),
    ))
}

/// POST /settlements/:id/process - Mark a settlement as processing.
async fn start_processing(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<StartProcessingRequest>,
) -> Result<Json<Settlement>, AppError> {
    let settlement = state.book.start_processing(
        SettlementId(id),
        Some(request.payout_id),
        request.transfer_id,
        &request.processed_by,
    )?;
    Ok(Json(settlement))
}

/// GET /settlements/:id - Get a settlement.
async fn get_settlement(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Settlement>, (StatusCode, Json<ErrorResponse>)> {
    state
        .book
        .get(SettlementId(id))
        .map(Json)
        .ok_or_else(|| not_found("SETTLEMENT_NOT_FOUND"))
}

/// POST /webhooks/payout - Provider webhook endpoint.
///
/// Always answers 200 with a structured acknowledgment; failures are logged
/// and audited instead of surfacing as HTTP errors.
async fn payout_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    let signature = headers
        .get("x-payout-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    Json(state.reconciler.process(&body, signature))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/wallets", post(open_wallet).get(list_wallets))
        .route("/wallets/{seller}", get(get_wallet))
        .route("/wallets/{seller}/transactions", post(apply_operation))
        .route("/settlements", post(create_settlement))
        .route("/settlements/{id}", get(get_settlement))
        .route("/settlements/{id}/process", post(start_processing))
        .route("/webhooks/payout", post(payout_webhook))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = Arc::new(LedgerEngine::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let book = Arc::new(SettlementBook::new(
        Arc::clone(&engine),
        audit.clone(),
        Arc::new(TracingNotifier),
    ));

    // One global tiered rule: 5% up to 1000, 8% above.
    let rules = InMemoryCommissionRules::new(vec![CommissionRule::tiered(
        1,
        RuleScope::Global,
        vec![
            CommissionTier {
                threshold: dec!(0),
                rate: dec!(0.05),
            },
            CommissionTier {
                threshold: dec!(1000),
                rate: dec!(0.08),
            },
        ],
    )]);

    // Demo periods end yesterday so the future-period check passes; the
    // 7-day hold is shortened to keep the flow interactive.
    let calculator = Arc::new(SettlementCalculator::new(
        CalculatorConfig {
            hold_period_days: 0,
            ..CalculatorConfig::default()
        },
        Arc::new(DemoOrderStore),
        Arc::new(DemoSellerAccounts),
        Arc::new(rules),
        Arc::clone(&book) as Arc<dyn SettlementHistory>,
    ));

    let secret = std::env::var("WEBHOOK_SECRET").unwrap_or_else(|_| "demo-secret".to_string());
    let reconciler = Arc::new(WebhookReconciler::new(
        Arc::clone(&book),
        Arc::new(HmacSha256Verifier::new(&secret)),
        audit,
    ));

    let state = AppState {
        engine,
        book,
        calculator,
        reconciler,
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Wallet ledger API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /wallets                        - Open a wallet");
    println!("  POST /wallets/:seller/transactions   - Apply a ledger operation");
    println!("  GET  /wallets                        - List wallet snapshots");
    println!("  GET  /wallets/:seller                - Get one seller's balances");
    println!("  POST /settlements                    - Calculate and create a settlement");
    println!("  POST /settlements/:id/process        - Mark a settlement as processing");
    println!("  GET  /settlements/:id                - Get a settlement");
    println!("  POST /webhooks/payout                - Payout provider webhook");
    let demo_period = Utc::now() - Duration::days(1);
    println!();
    println!(
        "Demo settlement period example: period_end = {}",
        demo_period.to_rfc3339()
    );

    axum::serve(listener, app).await.unwrap();
}
