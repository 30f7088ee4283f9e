//! # JSON-RPC Gateway
//!
//! `POST /rpc` accepts JSON-RPC 2.0 calls with named parameters. Every
//! mutating method takes an explicit `caller` address; authenticating that
//! identity is left to whatever sits in front of the node.
//!
//! Amount parameters accept either a JSON number (up to `u64::MAX`) or a
//! decimal string (up to `u128::MAX`). Amounts in results are always strings.
//!
//! | Method                    | Params                                        |
//! |---------------------------|-----------------------------------------------|
//! | `offtake_proposeProject`  | caller, name, symbol, initial_supply, metadata? |
//! | `offtake_approveProject`  | caller, project_id                            |
//! | `offtake_denyProject`     | caller, project_id                            |
//! | `offtake_deployVault`     | caller, project_id, settlement_asset          |
//! | `offtake_transferAdmin`   | caller, new_admin                             |
//! | `token_transfer`          | caller, token, to, amount                     |
//! | `token_approve`           | caller, token, spender, amount                |
//! | `token_increaseAllowance` | caller, token, spender, amount                |
//! | `token_decreaseAllowance` | caller, token, spender, amount                |
//! | `token_transferFrom`      | caller, token, from, to, amount               |
//! | `token_mint`              | caller, token, to, amount                     |
//! | `token_burn`              | caller, token, amount                         |
//! | `token_burnFrom`          | caller, token, from, amount                   |
//! | `token_pause`             | caller, token                                 |
//! | `token_unpause`           | caller, token                                 |
//! | `vault_activate`          | caller, project_id                            |
//! | `vault_swap`              | caller, project_id, amount                    |
//! | `vault_quote`             | project_id, amount                            |
//! | `vault_pause`             | caller, project_id                            |
//! | `vault_unpause`           | caller, project_id                            |
//! | `settlement_create`       | caller, symbol, decimals?                     |
//! | `settlement_mint`         | caller, asset, to, amount                     |
//! | `settlement_transfer`     | caller, asset, to, amount                     |
//! | `settlement_balanceOf`    | asset, holder                                 |
//!
//! Ledger failures come back as error objects whose `data.kind` names the
//! [`ErrorKind`]; the numeric code is fixed per kind (see [`kind_code`]).

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use offtake_contracts::{ContractEvent, ProjectId, ProjectProposal};
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::Address;
use offtake_protocol::ledger::SettlementAsset;

use crate::api::AppState;
use crate::deployment::{Deployment, DeploymentError};
use crate::metrics::NodeMetrics;

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Error code reported for a ledger failure of `kind`.
pub fn kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => -32001,
        ErrorKind::Validation => -32002,
        ErrorKind::Authorization => -32003,
        ErrorKind::Lifecycle => -32004,
        ErrorKind::Arithmetic => -32005,
        ErrorKind::External => -32006,
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named method parameters.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Why a call failed before or during dispatch.
#[derive(Debug)]
enum RpcFailure {
    MethodNotFound(String),
    InvalidParams(String),
    Operation(DeploymentError),
}

impl From<DeploymentError> for RpcFailure {
    fn from(e: DeploymentError) -> Self {
        RpcFailure::Operation(e)
    }
}

impl RpcFailure {
    fn into_error(self, metrics: &NodeMetrics) -> JsonRpcError {
        match self {
            RpcFailure::MethodNotFound(method) => JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            },
            RpcFailure::InvalidParams(msg) => JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid params: {msg}"),
                data: None,
            },
            RpcFailure::Operation(e) => match e.kind() {
                Some(kind) => {
                    metrics.record_rejection(kind);
                    JsonRpcError {
                        code: kind_code(kind),
                        message: e.to_string(),
                        data: Some(json!({ "kind": kind.as_str() })),
                    }
                }
                None => {
                    tracing::error!(error = %e, "operation failed to persist");
                    JsonRpcError {
                        code: INTERNAL_ERROR,
                        message: format!("Internal error: {e}"),
                        data: None,
                    }
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Named-parameter accessor over the request's `params` object.
struct Params<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Params<'a> {
    fn new(params: Option<&'a Value>) -> Result<Self, RpcFailure> {
        match params {
            None | Some(Value::Null) => Ok(Self { map: None }),
            Some(Value::Object(map)) => Ok(Self { map: Some(map) }),
            Some(_) => Err(RpcFailure::InvalidParams("expected a params object".into())),
        }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(name)).filter(|v| !v.is_null())
    }

    fn required(&self, name: &str) -> Result<&'a Value, RpcFailure> {
        self.get(name)
            .ok_or_else(|| RpcFailure::InvalidParams(format!("missing `{name}`")))
    }

    fn string(&self, name: &str) -> Result<String, RpcFailure> {
        self.required(name)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcFailure::InvalidParams(format!("`{name}` must be a string")))
    }

    fn opt_string(&self, name: &str) -> Result<Option<String>, RpcFailure> {
        self.get(name).map(|_| self.string(name)).transpose()
    }

    fn address(&self, name: &str) -> Result<Address, RpcFailure> {
        Address::new(self.string(name)?)
            .map_err(|e| RpcFailure::InvalidParams(format!("`{name}`: {e}")))
    }

    fn caller(&self) -> Result<Address, RpcFailure> {
        self.address("caller")
    }

    fn project_id(&self) -> Result<ProjectId, RpcFailure> {
        self.required("project_id")?
            .as_u64()
            .ok_or_else(|| RpcFailure::InvalidParams("`project_id` must be an unsigned integer".into()))
    }

    fn amount(&self, name: &str) -> Result<u128, RpcFailure> {
        let invalid = || RpcFailure::InvalidParams(format!("`{name}` must be an unsigned integer or decimal string"));
        match self.required(name)? {
            Value::Number(n) => n.as_u64().map(u128::from).ok_or_else(invalid),
            Value::String(s) => s.parse::<u128>().map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    fn opt_u8(&self, name: &str) -> Result<Option<u8>, RpcFailure> {
        self.get(name)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| RpcFailure::InvalidParams(format!("`{name}` must be 0..=255")))
            })
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// Routes method calls to the hosted deployment. Unknown methods return
/// error code -32601 (Method not found).
pub async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: INVALID_REQUEST,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let timer = state.metrics.rpc_latency_seconds.start_timer();
    let outcome = dispatch(&state, &req.method, req.params.as_ref()).await;
    timer.observe_duration();

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(failure) => {
            warn!(method = %req.method, ?failure, "rpc call rejected");
            (None, Some(failure.into_error(&state.metrics)))
        }
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

async fn dispatch(state: &AppState, method: &str, params: Option<&Value>) -> Result<Value, RpcFailure> {
    let p = Params::new(params)?;

    match method {
        // -- Registry -------------------------------------------------------
        "offtake_proposeProject" => {
            let caller = p.caller()?;
            let proposal = ProjectProposal {
                name: p.string("name")?,
                symbol: p.string("symbol")?,
                initial_supply: p.amount("initial_supply")?,
                metadata: p.opt_string("metadata")?.unwrap_or_default(),
            };
            let id = mutate(state, |d| d.propose_project(&caller, proposal)).await?;
            Ok(json!({ "project_id": id }))
        }
        "offtake_approveProject" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            let token = mutate(state, |d| d.approve_project(&caller, id)).await?;
            Ok(json!({ "project_id": id, "token": token }))
        }
        "offtake_denyProject" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            mutate(state, |d| d.deny_project(&caller, id)).await?;
            Ok(json!({ "project_id": id, "status": "Denied" }))
        }
        "offtake_deployVault" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            let asset = p.address("settlement_asset")?;
            let vault = mutate(state, |d| d.deploy_vault(&caller, id, &asset)).await?;
            Ok(json!({ "project_id": id, "vault": vault }))
        }
        "offtake_transferAdmin" => {
            let (caller, new_admin) = (p.caller()?, p.address("new_admin")?);
            mutate(state, |d| d.transfer_admin(&caller, new_admin.clone())).await?;
            Ok(json!({ "admin": new_admin }))
        }

        // -- Tokens ---------------------------------------------------------
        "token_transfer" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (to, amount) = (p.address("to")?, p.amount("amount")?);
            mutate(state, |d| d.token_op(&token, |t| t.transfer(&caller, &to, amount))).await?;
            Ok(json!(true))
        }
        "token_approve" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (spender, amount) = (p.address("spender")?, p.amount("amount")?);
            mutate(state, |d| d.token_op(&token, |t| t.approve(&caller, &spender, amount))).await?;
            Ok(json!(true))
        }
        "token_increaseAllowance" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (spender, amount) = (p.address("spender")?, p.amount("amount")?);
            let allowance = mutate(state, |d| {
                d.token_op(&token, |t| t.increase_allowance(&caller, &spender, amount))
            })
            .await?;
            Ok(json!({ "allowance": allowance.to_string() }))
        }
        "token_decreaseAllowance" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (spender, amount) = (p.address("spender")?, p.amount("amount")?);
            let allowance = mutate(state, |d| {
                d.token_op(&token, |t| t.decrease_allowance(&caller, &spender, amount))
            })
            .await?;
            Ok(json!({ "allowance": allowance.to_string() }))
        }
        "token_transferFrom" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (from, to, amount) = (p.address("from")?, p.address("to")?, p.amount("amount")?);
            mutate(state, |d| {
                d.token_op(&token, |t| t.transfer_from(&caller, &from, &to, amount))
            })
            .await?;
            Ok(json!(true))
        }
        "token_mint" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (to, amount) = (p.address("to")?, p.amount("amount")?);
            let supply = mutate(state, |d| {
                d.token_op(&token, |t| {
                    t.mint(&caller, &to, amount)?;
                    Ok(t.total_supply())
                })
            })
            .await?;
            Ok(json!({ "total_supply": supply.to_string() }))
        }
        "token_burn" => {
            let (caller, token, amount) = (p.caller()?, p.address("token")?, p.amount("amount")?);
            let supply = mutate(state, |d| {
                d.token_op(&token, |t| {
                    t.burn(&caller, amount)?;
                    Ok(t.total_supply())
                })
            })
            .await?;
            Ok(json!({ "total_supply": supply.to_string() }))
        }
        "token_burnFrom" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            let (from, amount) = (p.address("from")?, p.amount("amount")?);
            let supply = mutate(state, |d| {
                d.token_op(&token, |t| {
                    t.burn_from(&caller, &from, amount)?;
                    Ok(t.total_supply())
                })
            })
            .await?;
            Ok(json!({ "total_supply": supply.to_string() }))
        }
        "token_pause" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            mutate(state, |d| d.token_op(&token, |t| t.pause(&caller))).await?;
            Ok(json!({ "paused": true }))
        }
        "token_unpause" => {
            let (caller, token) = (p.caller()?, p.address("token")?);
            mutate(state, |d| d.token_op(&token, |t| t.unpause(&caller))).await?;
            Ok(json!({ "paused": false }))
        }

        // -- Vaults ---------------------------------------------------------
        "vault_activate" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            let rate = mutate(state, |d| d.activate_redemption(&caller, id)).await?;
            Ok(json!({ "project_id": id, "rate": rate.to_string() }))
        }
        "vault_swap" => {
            let (caller, id, amount) = (p.caller()?, p.project_id()?, p.amount("amount")?);
            let r = mutate(state, |d| d.swap(&caller, id, amount)).await?;
            Ok(json!({
                "holder": r.holder,
                "token_amount": r.token_amount.to_string(),
                "payout": r.payout.to_string(),
            }))
        }
        "vault_quote" => {
            let (id, amount) = (p.project_id()?, p.amount("amount")?);
            let payout = state.deployment.read().await.quote(id, amount)?;
            Ok(json!({ "payout": payout.to_string() }))
        }
        "vault_pause" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            mutate(state, |d| d.vault_op(id, |v| v.pause(&caller))).await?;
            Ok(json!({ "paused": true }))
        }
        "vault_unpause" => {
            let (caller, id) = (p.caller()?, p.project_id()?);
            mutate(state, |d| d.vault_op(id, |v| v.unpause(&caller))).await?;
            Ok(json!({ "paused": false }))
        }

        // -- Settlement assets ----------------------------------------------
        "settlement_create" => {
            let (caller, symbol) = (p.caller()?, p.string("symbol")?);
            let decimals = p.opt_u8("decimals")?;
            let asset = mutate(state, |d| d.create_settlement(&caller, &symbol, decimals)).await?;
            Ok(json!({ "asset": asset }))
        }
        "settlement_mint" => {
            let (caller, asset) = (p.caller()?, p.address("asset")?);
            let (to, amount) = (p.address("to")?, p.amount("amount")?);
            mutate(state, |d| d.mint_settlement(&caller, &asset, &to, amount)).await?;
            Ok(json!(true))
        }
        "settlement_transfer" => {
            let (caller, asset) = (p.caller()?, p.address("asset")?);
            let (to, amount) = (p.address("to")?, p.amount("amount")?);
            mutate(state, |d| d.transfer_settlement(&caller, &asset, &to, amount)).await?;
            Ok(json!(true))
        }
        "settlement_balanceOf" => {
            let (asset, holder) = (p.address("asset")?, p.address("holder")?);
            let deployment = state.deployment.read().await;
            let balance = deployment.settlement(&asset)?.balance_of(&holder);
            Ok(json!({ "balance": balance.to_string() }))
        }

        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

/// Runs a mutating operation under the write lock, then logs and counts the
/// events it emitted.
async fn mutate<T>(
    state: &AppState,
    op: impl FnOnce(&mut Deployment) -> Result<(T, Vec<ContractEvent>), DeploymentError>,
) -> Result<T, RpcFailure> {
    let mut deployment = state.deployment.write().await;
    let (value, events) = op(&mut deployment)?;
    state
        .metrics
        .projects
        .set(deployment.registry().project_count() as i64);
    drop(deployment);

    publish(&state.metrics, &events);
    Ok(value)
}

fn publish(metrics: &NodeMetrics, events: &[ContractEvent]) {
    for event in events {
        metrics.record_event(event);
        match serde_json::to_string(event) {
            Ok(payload) => info!(event = event.name(), %payload, "contract event"),
            Err(e) => warn!(event = event.name(), error = %e, "failed to serialize contract event"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::api::tests::{get, post_json, test_app_state, test_app_state_with_vault, TOKEN};
    use axum::http::StatusCode;
    use axum::Router;

    async fn call(router: &Router, method: &str, params: Value) -> JsonRpcResponse {
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
        let (status, bytes) = post_json(router, "/rpc", body).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn ok(router: &Router, method: &str, params: Value) -> Value {
        let resp = call(router, method, params).await;
        assert!(resp.error.is_none(), "{method} failed: {:?}", resp.error);
        resp.result.unwrap()
    }

    async fn err(router: &Router, method: &str, params: Value) -> JsonRpcError {
        let resp = call(router, method, params).await;
        assert!(resp.result.is_none(), "{method} unexpectedly succeeded");
        resp.error.unwrap()
    }

    #[tokio::test]
    async fn full_lifecycle_over_rpc() {
        let state = test_app_state();
        let metrics = state.metrics.clone();
        let router = create_router(state);

        let r = ok(&router, "offtake_proposeProject", json!({
            "caller": "dev",
            "name": "Solar Farm",
            "symbol": "SOL",
            "initial_supply": "10000000000000000000000000",
        }))
        .await;
        assert_eq!(r["project_id"], 1);

        let r = ok(&router, "offtake_approveProject", json!({ "caller": "admin", "project_id": 1 })).await;
        let token = r["token"].as_str().unwrap().to_string();

        let r = ok(&router, "settlement_create", json!({ "caller": "admin", "symbol": "USDC" })).await;
        let usdc = r["asset"].as_str().unwrap().to_string();

        let r = ok(&router, "offtake_deployVault", json!({
            "caller": "admin", "project_id": 1, "settlement_asset": usdc,
        }))
        .await;
        let vault = r["vault"].as_str().unwrap().to_string();

        // 1000 USDC over 10M tokens.
        ok(&router, "settlement_mint", json!({
            "caller": "admin", "asset": usdc, "to": vault, "amount": 1_000_000_000u64,
        }))
        .await;
        let r = ok(&router, "vault_activate", json!({ "caller": "admin", "project_id": 1 })).await;
        assert_eq!(r["rate"], "100");

        ok(&router, "token_transfer", json!({
            "caller": "admin", "token": token, "to": "alice", "amount": (5_000 * TOKEN).to_string(),
        }))
        .await;
        ok(&router, "token_approve", json!({
            "caller": "alice", "token": token, "spender": vault, "amount": (5_000 * TOKEN).to_string(),
        }))
        .await;

        let r = ok(&router, "vault_quote", json!({ "project_id": 1, "amount": (5_000 * TOKEN).to_string() })).await;
        assert_eq!(r["payout"], "500000");

        let r = ok(&router, "vault_swap", json!({
            "caller": "alice", "project_id": 1, "amount": (5_000 * TOKEN).to_string(),
        }))
        .await;
        assert_eq!(r["payout"], "500000");
        assert_eq!(r["holder"], "alice");

        let r = ok(&router, "settlement_balanceOf", json!({ "asset": usdc, "holder": "alice" })).await;
        assert_eq!(r["balance"], "500000");

        let (_, body) = get(&router, &format!("/tokens/{token}/balances/alice")).await;
        let balance: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(balance["balance"], "0");

        assert_eq!(metrics.projects_proposed_total.get(), 1);
        assert_eq!(metrics.projects_approved_total.get(), 1);
        assert_eq!(metrics.vaults_deployed_total.get(), 1);
        assert_eq!(metrics.redemptions_activated_total.get(), 1);
        assert_eq!(metrics.swaps_total.get(), 1);
        assert_eq!(metrics.settlement_paid_total.get(), 500_000);
        assert_eq!(metrics.projects.get(), 1);
    }

    #[tokio::test]
    async fn ledger_errors_carry_their_kind() {
        let (state, token, _, _) = test_app_state_with_vault().await;
        let metrics = state.metrics.clone();
        let router = create_router(state);

        let e = err(&router, "offtake_approveProject", json!({ "caller": "mallory", "project_id": 1 })).await;
        assert_eq!(e.code, kind_code(ErrorKind::Authorization));
        assert_eq!(e.data.unwrap()["kind"], "authorization");

        let e = err(&router, "offtake_denyProject", json!({ "caller": "admin", "project_id": 1 })).await;
        assert_eq!(e.code, kind_code(ErrorKind::Lifecycle));

        let e = err(&router, "offtake_approveProject", json!({ "caller": "admin", "project_id": 9 })).await;
        assert_eq!(e.code, kind_code(ErrorKind::NotFound));

        let e = err(&router, "token_transfer", json!({
            "caller": "bob", "token": token, "to": "carol", "amount": 1,
        }))
        .await;
        assert_eq!(e.code, kind_code(ErrorKind::Arithmetic));

        assert_eq!(
            metrics
                .rejected_operations_total
                .with_label_values(&["authorization"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn inactive_and_paused_vaults_refuse_swaps() {
        let (state, token, _, vault) = test_app_state_with_vault().await;
        let router = create_router(state);

        let e = err(&router, "vault_quote", json!({ "project_id": 1, "amount": "1" })).await;
        assert_eq!(e.code, kind_code(ErrorKind::Lifecycle));

        ok(&router, "vault_activate", json!({ "caller": "admin", "project_id": 1 })).await;
        ok(&router, "vault_pause", json!({ "caller": "admin", "project_id": 1 })).await;
        ok(&router, "token_approve", json!({
            "caller": "admin", "token": token, "spender": vault, "amount": TOKEN.to_string(),
        }))
        .await;

        let e = err(&router, "vault_swap", json!({ "caller": "admin", "project_id": 1, "amount": TOKEN.to_string() })).await;
        assert_eq!(e.code, kind_code(ErrorKind::Lifecycle));

        ok(&router, "vault_unpause", json!({ "caller": "admin", "project_id": 1 })).await;
        let r = ok(&router, "vault_swap", json!({ "caller": "admin", "project_id": 1, "amount": TOKEN.to_string() })).await;
        // 500 USDC over 1000 tokens: one token pays 0.5 USDC.
        assert_eq!(r["payout"], "500000");
    }

    #[tokio::test]
    async fn token_pause_blocks_transfers_but_not_approvals() {
        let (state, token, _, _) = test_app_state_with_vault().await;
        let router = create_router(state);

        let r = ok(&router, "token_pause", json!({ "caller": "admin", "token": token })).await;
        assert_eq!(r["paused"], true);

        let e = err(&router, "token_transfer", json!({
            "caller": "admin", "token": token, "to": "alice", "amount": 1,
        }))
        .await;
        assert_eq!(e.code, kind_code(ErrorKind::Lifecycle));

        ok(&router, "token_approve", json!({
            "caller": "admin", "token": token, "spender": "alice", "amount": 1,
        }))
        .await;
    }

    #[tokio::test]
    async fn large_amounts_travel_as_strings() {
        let (state, token, _, _) = test_app_state_with_vault().await;
        let router = create_router(state);

        let big = u128::from(u64::MAX) * 1_000;
        let r = ok(&router, "token_mint", json!({
            "caller": "admin", "token": token, "to": "alice", "amount": big.to_string(),
        }))
        .await;
        assert_eq!(r["total_supply"], (1_000 * TOKEN + big).to_string());

        let r = ok(&router, "token_burn", json!({
            "caller": "alice", "token": token, "amount": big.to_string(),
        }))
        .await;
        assert_eq!(r["total_supply"], (1_000 * TOKEN).to_string());
    }

    #[tokio::test]
    async fn delegated_burn_and_allowance_adjustments() {
        let (state, token, _, _) = test_app_state_with_vault().await;
        let router = create_router(state);

        let r = ok(&router, "token_increaseAllowance", json!({
            "caller": "admin", "token": token, "spender": "broker", "amount": (3 * TOKEN).to_string(),
        }))
        .await;
        assert_eq!(r["allowance"], (3 * TOKEN).to_string());
        let r = ok(&router, "token_decreaseAllowance", json!({
            "caller": "admin", "token": token, "spender": "broker", "amount": TOKEN.to_string(),
        }))
        .await;
        assert_eq!(r["allowance"], (2 * TOKEN).to_string());

        let e = err(&router, "token_decreaseAllowance", json!({
            "caller": "admin", "token": token, "spender": "broker", "amount": (5 * TOKEN).to_string(),
        }))
        .await;
        assert_eq!(e.code, kind_code(ErrorKind::Arithmetic));

        let r = ok(&router, "token_burnFrom", json!({
            "caller": "broker", "token": token, "from": "admin", "amount": (2 * TOKEN).to_string(),
        }))
        .await;
        assert_eq!(r["total_supply"], (998 * TOKEN).to_string());

        // The allowance is spent.
        let e = err(&router, "token_burnFrom", json!({
            "caller": "broker", "token": token, "from": "admin", "amount": 1,
        }))
        .await;
        assert_eq!(e.code, kind_code(ErrorKind::Arithmetic));
    }

    #[tokio::test]
    async fn admin_transfer_moves_authority() {
        let (state, token, _, _) = test_app_state_with_vault().await;
        let router = create_router(state);

        ok(&router, "offtake_transferAdmin", json!({ "caller": "admin", "new_admin": "council" })).await;

        let e = err(&router, "token_pause", json!({ "caller": "admin", "token": token })).await;
        assert_eq!(e.code, kind_code(ErrorKind::Authorization));
        ok(&router, "token_pause", json!({ "caller": "council", "token": token })).await;
        ok(&router, "vault_pause", json!({ "caller": "council", "project_id": 1 })).await;
    }

    #[tokio::test]
    async fn malformed_calls_are_rejected() {
        let router = create_router(test_app_state());

        let e = err(&router, "offtake_proposeProject", json!({ "name": "X", "symbol": "X", "initial_supply": 1 })).await;
        assert_eq!(e.code, INVALID_PARAMS);

        let e = err(&router, "token_transfer", json!({
            "caller": "a", "token": "tok_1", "to": "b", "amount": -5,
        }))
        .await;
        assert_eq!(e.code, INVALID_PARAMS);

        let e = err(&router, "vault_quote", json!([1, 2])).await;
        assert_eq!(e.code, INVALID_PARAMS);

        let e = err(&router, "offtake_mine", json!({})).await;
        assert_eq!(e.code, METHOD_NOT_FOUND);

        let body = json!({ "jsonrpc": "1.0", "method": "vault_quote", "params": {}, "id": 20 });
        let (_, bytes) = post_json(&router, "/rpc", body).await;
        let resp: JsonRpcResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }
}
