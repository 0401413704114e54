//! HTTP handlers for the API v1 and v2 routes

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::auth::Auth;
use super::policy::{ConsentPolicy, ConsentRequest};
use crate::api::{payload_digest, ApiError, ClientApi};
use crate::error::Error;
use crate::interactor::Permissions;
use crate::logging::Logger;
use crate::network::CLIENT_VERSION;
use crate::node::NodeForwarder;
use crate::wallet::WalletStore;

// JSON-RPC error codes
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const NETWORK_ERROR: i64 = 1000;
const APPLICATION_ERROR: i64 = 2000;
const USER_ERROR: i64 = 3000;
const INTERNAL_ERROR: i64 = 5000;

/// Application state shared across handlers
#[derive(Clone)]
pub(super) struct AppState {
    pub log: Logger,
    pub api: Arc<ClientApi>,
    pub auth: Arc<Auth>,
    pub forwarder: Arc<NodeForwarder>,
    pub policy: Arc<dyn ConsentPolicy>,
    pub wallets: Arc<dyn WalletStore>,
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    fn invalid_params(e: impl ToString) -> Self {
        Self::new(INVALID_PARAMS, e)
    }
}

impl From<ApiError> for RpcError {
    fn from(e: ApiError) -> Self {
        let code = match &e {
            ApiError::Consent(_) | ApiError::Rejected => USER_ERROR,
            ApiError::InvalidParams(_) => INVALID_PARAMS,
            ApiError::UnknownConnection => APPLICATION_ERROR,
            ApiError::Wallet(
                Error::Node { .. } | Error::NoHealthyNode | Error::TransactionRejected { .. },
            ) => NETWORK_ERROR,
            ApiError::Wallet(_) => INTERNAL_ERROR,
        };
        Self::new(code, e)
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestPermissionsParams {
    requested_permissions: Permissions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionParams {
    public_key: String,
    transaction: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    wallet: String,
    passphrase: String,
}

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": CLIENT_VERSION }))
}

/// `POST /api/v2/requests`
pub(super) async fn handle_v2_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(rpc_error(Value::Null, RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)))),
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return (
            StatusCode::BAD_REQUEST,
            Json(rpc_error(
                request.id,
                RpcError::new(INVALID_REQUEST, "the JSON-RPC version must be 2.0"),
            )),
        );
    }

    debug!(parent: state.log.span(), method = %request.method, "Received request");
    let token = authorization_token(&headers, "VWT");
    let outcome = dispatch(&state, &headers, token, &request.method, request.params).await;

    let response = match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "result": result, "id": request.id }),
        Err(e) => {
            warn!(parent: state.log.span(), method = %request.method, code = e.code, error = %e.message, "Request failed");
            rpc_error(request.id, e)
        }
    };
    (StatusCode::OK, Json(response))
}

async fn dispatch(
    state: &AppState,
    headers: &HeaderMap,
    token: Option<&str>,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    let api = &state.api;
    match method {
        "client.get_chain_id" => {
            let chain_id = api.get_chain_id().await?;
            Ok(json!({ "chainID": chain_id }))
        }
        "client.connect_wallet" => {
            let hostname = origin_hostname(headers).ok_or_else(|| {
                RpcError::new(INVALID_REQUEST, "the origin of the request is not specified")
            })?;
            let connected = api.connect_wallet(&hostname).await?;
            Ok(json!(connected))
        }
        "client.disconnect_wallet" => {
            api.disconnect_wallet(require_token(token)?)?;
            Ok(Value::Null)
        }
        "client.request_permissions" => {
            let params: RequestPermissionsParams =
                serde_json::from_value(params).map_err(RpcError::invalid_params)?;
            let granted = api
                .request_permissions(require_token(token)?, params.requested_permissions)
                .await?;
            Ok(json!({ "permissions": granted }))
        }
        "client.sign_transaction" => {
            let params: TransactionParams =
                serde_json::from_value(params).map_err(RpcError::invalid_params)?;
            let signed = api
                .sign_transaction(require_token(token)?, &params.public_key, &params.transaction)
                .await?;
            Ok(json!(signed))
        }
        "client.send_transaction" => {
            let params: TransactionParams =
                serde_json::from_value(params).map_err(RpcError::invalid_params)?;
            let sent = api
                .send_transaction(require_token(token)?, &params.public_key, &params.transaction)
                .await?;
            Ok(json!(sent))
        }
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("method {} is not supported", other),
        )),
    }
}

/// `POST /api/v1/auth/token`
pub(super) async fn handle_v1_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let issued = state
        .wallets
        .unlock(&request.wallet, &request.passphrase)
        .await
        .and_then(|_| state.auth.issue(&request.wallet));

    match issued {
        Ok(token) => (StatusCode::OK, Json(json!({ "token": token }))),
        Err(e @ (Error::WalletNotFound(_) | Error::WrongPassphrase)) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() })))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// `DELETE /api/v1/auth/token`
pub(super) async fn handle_v1_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let revoked = authorization_token(&headers, "Bearer")
        .ok_or(Error::UnknownToken)
        .and_then(|token| state.auth.revoke(token));

    match revoked {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))),
    }
}

/// `POST /api/v1/command/sync`
pub(super) async fn handle_v1_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<TransactionParams>,
) -> impl IntoResponse {
    let received_at = Utc::now();
    let wallet = match authorization_token(&headers, "Bearer")
        .ok_or(Error::UnknownToken)
        .and_then(|token| state.auth.verify(token))
    {
        Ok(wallet) => wallet,
        Err(e) => return (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))),
    };

    if params.public_key.is_empty() || params.transaction.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "the public key and the transaction are required" })),
        );
    }

    let request = ConsentRequest {
        tx_id: uuid::Uuid::new_v4().to_string(),
        wallet,
        public_key: params.public_key,
        digest: payload_digest(params.transaction.as_bytes()),
        received_at,
    };

    match state.policy.ask(&request).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "the transaction has been rejected" })),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    }

    match state.forwarder.send_tx(params.transaction.as_bytes()).await {
        Ok(tx_hash) => (
            StatusCode::OK,
            Json(json!({
                "txId": request.tx_id,
                "txHash": tx_hash,
                "receivedAt": received_at,
                "sentAt": Utc::now(),
            })),
        ),
        Err(e @ Error::TransactionRejected { .. }) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
        }
        Err(e) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))),
    }
}

fn rpc_error(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": error.code, "message": error.message },
        "id": id,
    })
}

fn require_token(token: Option<&str>) -> Result<&str, RpcError> {
    token.ok_or_else(|| RpcError::new(APPLICATION_ERROR, "the request is missing its token"))
}

/// Token from an `Authorization: <scheme> <token>` header
fn authorization_token<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (found, token) = value.split_once(' ')?;
    let token = token.trim();
    (found.eq_ignore_ascii_case(scheme) && !token.is_empty()).then_some(token)
}

fn origin_hostname(headers: &HeaderMap) -> Option<String> {
    let origin = headers.get(header::ORIGIN)?.to_str().ok()?;
    let url = Url::parse(origin).ok()?;
    url.host_str().map(str::to_string)
}
