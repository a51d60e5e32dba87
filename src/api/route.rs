use crate::{
    analytics::{self, chart, ChartQuery, ChartScope},
    api::{
        error::ApiError,
        response::{ApiResponse, with_total_count},
    },
    blockchain::{sync_mode, SyncMode},
    db::{address, transaction},
    models::{now_millis, TransferRequest},
    state::AppState,
    validation::{
        require, validate_address, validate_chart_span, validate_limit, validate_network, validate_offset,
        validate_range, ValidationError,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

// POST/DELETE /addresses query parameters
#[derive(Deserialize)]
pub struct AddressQuery {
    net: Option<String>,
    address: Option<String>,
    user: Option<String>,
}

// GET /transactions query parameters
#[derive(Deserialize)]
pub struct TransactionsQuery {
    net: Option<String>,
    address: Option<String>,
    offset: Option<i64>,
    limit: Option<i64>,
}

// GET /chart query parameters
#[derive(Deserialize)]
pub struct ChartParams {
    user: Option<String>,
    net: Option<String>,
    address: Option<String>,
    from: i64,
    to: i64,
    width: Option<i64>,
    #[serde(default)]
    interpolate: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    signed_payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkSummary {
    net: String,
    currency: String,
    sync_mode: SyncMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AmountResponse {
    net: String,
    address: String,
    currency: String,
    value: f64,
}

#[derive(Serialize)]
struct SendResponse {
    hash: String,
}

// Create router with all routes
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("x-total-count")]);

    Router::new()
        .route("/networks", get(list_networks))
        .route("/addresses", post(add_address).delete(remove_address))
        .route("/transactions", get(get_transactions))
        .route("/balance", get(get_balance))
        .route("/reward", get(get_reward))
        .route("/chart", get(get_chart))
        .route("/info/{net}", get(get_info))
        .route("/voting/{net}", get(get_voting))
        .route("/prepare/{net}", post(prepare_transaction))
        .route("/send/{net}", post(send_transaction))
        .layer(cors)
        .with_state(app_state)
}

// GET /networks handler
async fn list_networks(State(state): State<Arc<AppState>>) -> Response {
    let networks: Vec<NetworkSummary> = state
        .registry
        .adapters()
        .map(|adapter| NetworkSummary {
            net: adapter.net().to_string(),
            currency: adapter.currency().to_string(),
            sync_mode: sync_mode(adapter.as_ref()),
        })
        .collect();

    ApiResponse { data: networks }.into_response()
}

// POST /addresses handler
async fn add_address(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let net = require("net", params.net.as_deref())?;
    let address_param = require("address", params.address.as_deref())?;
    let adapter = validate_address(&state.registry, net, address_param)?;

    let mut tracked = address::find_or_create(&state.db_pool, net, adapter.currency(), address_param, now_millis()).await?;

    if let Some(user) = params.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        address::attach_user(&state.db_pool, tracked.id, user).await?;
        if !tracked.user_ids.iter().any(|u| u == user) {
            tracked.user_ids.push(user.to_string());
        }
    }

    info!("Tracking {} on {}", address_param, net);
    Ok((StatusCode::CREATED, Json(ApiResponse { data: tracked })).into_response())
}

// DELETE /addresses handler
async fn remove_address(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let net = require("net", params.net.as_deref())?;
    let address_param = require("address", params.address.as_deref())?;
    validate_network(&state.registry, net)?;

    if !address::remove(&state.db_pool, net, address_param).await? {
        return Err(ApiError::NotFound(format!("{} is not tracked on {}", address_param, net)));
    }

    info!("Removed {} on {} with its history", address_param, net);
    Ok(StatusCode::NO_CONTENT.into_response())
}

// GET /transactions handler
async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Response, ApiError> {
    let net = require("net", params.net.as_deref())?;
    let address_param = require("address", params.address.as_deref())?;
    validate_address(&state.registry, net, address_param)?;
    let offset = validate_offset(params.offset)?;
    let limit = validate_limit(params.limit)?;

    if address::find(&state.db_pool, net, address_param).await?.is_none() {
        return Err(ApiError::NotFound(format!("{} is not tracked on {}", address_param, net)));
    }

    let (transactions, total_count) =
        transaction::list_for_address(&state.db_pool, net, address_param, offset, limit).await?;

    Ok(with_total_count(transactions, total_count))
}

// GET /balance handler
async fn get_balance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let net = require("net", params.net.as_deref())?;
    let address_param = require("address", params.address.as_deref())?;
    let adapter = validate_address(&state.registry, net, address_param)?;

    let value = analytics::balance(&state.db_pool, net, address_param).await?;

    Ok(ApiResponse {
        data: AmountResponse {
            net: net.to_string(),
            address: address_param.to_string(),
            currency: adapter.currency().to_string(),
            value,
        },
    }
    .into_response())
}

// GET /reward handler
async fn get_reward(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let net = require("net", params.net.as_deref())?;
    let address_param = require("address", params.address.as_deref())?;
    let adapter = validate_address(&state.registry, net, address_param)?;

    let value = analytics::reward(&state.db_pool, net, address_param).await?;

    Ok(ApiResponse {
        data: AmountResponse {
            net: net.to_string(),
            address: address_param.to_string(),
            currency: adapter.currency().to_string(),
            value,
        },
    }
    .into_response())
}

// GET /chart handler
async fn get_chart(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChartParams>,
) -> Result<Response, ApiError> {
    validate_range(params.from, params.to)?;
    let width = params
        .width
        .unwrap_or_else(|| chart::default_bucket_width(params.from, params.to));
    validate_chart_span(params.from, params.to, width, chart::MAX_CHART_POINTS)?;

    let scope = match params.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => ChartScope::User(user.to_string()),
        None => {
            let net = require("net", params.net.as_deref())?;
            let address_param = require("address", params.address.as_deref())?;
            validate_address(&state.registry, net, address_param)?;
            ChartScope::Address {
                net: net.to_string(),
                address: address_param.to_string(),
            }
        }
    };

    let query = ChartQuery {
        scope,
        date_from: params.from,
        date_to: params.to,
        bucket_width: params.width,
        interpolate: params.interpolate,
    };
    let series = analytics::chart(&state.db_pool, &query).await?;

    Ok(ApiResponse { data: series }.into_response())
}

fn unsupported(net: &str, op: &str) -> ApiError {
    ValidationError::UnsupportedOperation {
        net: net.to_string(),
        op: op.to_string(),
    }
    .into()
}

// GET /info/{net} handler
async fn get_info(
    State(state): State<Arc<AppState>>,
    Path(net): Path<String>,
) -> Result<Response, ApiError> {
    let adapter = validate_network(&state.registry, &net)?;
    let provider = adapter.info().ok_or_else(|| unsupported(&net, "info"))?;

    let info = state.info_cache.get_or_fetch(&net, provider).await?;

    Ok(ApiResponse { data: info }.into_response())
}

// GET /voting/{net} handler
async fn get_voting(
    State(state): State<Arc<AppState>>,
    Path(net): Path<String>,
) -> Result<Response, ApiError> {
    let adapter = validate_network(&state.registry, &net)?;
    let provider = adapter.info().ok_or_else(|| unsupported(&net, "voting"))?;

    let voting = provider.get_voting().await?;

    Ok(ApiResponse { data: voting }.into_response())
}

// POST /prepare/{net} handler
async fn prepare_transaction(
    State(state): State<Arc<AppState>>,
    Path(net): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<Response, ApiError> {
    let adapter = validate_network(&state.registry, &net)?;
    for party in [&request.from, &request.to] {
        validate_address(&state.registry, &net, party)?;
    }
    if request.value.is_nan() || request.value <= 0.0 {
        return Err(ValidationError::InvalidParameter("value must be positive".to_string()).into());
    }
    let preparer = adapter.preparer().ok_or_else(|| unsupported(&net, "prepare"))?;

    let prepared = preparer.prepare_transaction(&request).await?;

    Ok(ApiResponse { data: prepared }.into_response())
}

// POST /send/{net} handler
async fn send_transaction(
    State(state): State<Arc<AppState>>,
    Path(net): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Response, ApiError> {
    let adapter = validate_network(&state.registry, &net)?;
    let signed_payload = require("signedPayload", Some(request.signed_payload.as_str()))?;
    let preparer = adapter.preparer().ok_or_else(|| unsupported(&net, "send"))?;

    let hash = preparer.send_transaction(signed_payload).await?;
    info!("Relayed transaction {} on {}", hash, net);

    Ok(ApiResponse { data: SendResponse { hash } }.into_response())
}
