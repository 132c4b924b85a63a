//! # JSON-RPC 2.0
//!
//! Envelope types and the method table behind `POST /rpc`. Every treasury
//! operation and query is reachable here as `ballast_<camelCaseName>`, with
//! named parameters. Amounts travel as decimal strings (plain integers are
//! accepted too); durations are whole seconds.
//!
//! ## Signed calls
//!
//! Methods that act for an account (deposits, redemption requests and
//! cancellations, attestations, transfers, approvals and every owner
//! setting) take a signed envelope instead of bare parameters:
//!
//! ```json
//! { "signer": "<hex public key>", "nonce": 7, "signature": "<hex>", "args": { ... } }
//! ```
//!
//! The signature is [`sign_call`] over the method name, the nonce and the
//! compact JSON encoding of `args` with keys in sorted order. The acting
//! account is the signer; there is no `caller` parameter to spoof. Nonces
//! are per signer and must strictly increase. A nonce is spent as soon as
//! its signature checks out, even if the operation then fails.
//!
//! Permissionless methods (processing redemptions, the keeper hooks) and
//! queries take plain parameters.
//!
//! ## Errors
//!
//! Treasury errors map to codes by category and carry the category and
//! reason code in `error.data`:
//!
//! | Category               | Code   |
//! |------------------------|--------|
//! | validation             | -32010 |
//! | authorization          | -32011 |
//! | state_conflict         | -32012 |
//! | resource_insufficiency | -32013 |
//! | bound_violation        | -32014 |
//! | internal               | -32603 |
//!
//! A rejected signature or nonce is an authorization error with reason
//! `INVALID_SIGNATURE` or `STALE_NONCE`.

use ballast_contracts::{CollateralKind, ErrorCategory, RedemptionId, TreasuryError};
use ballast_protocol::crypto::{sign_call, verify_call, Hash32, Keypair, Signature};
use ballast_protocol::{amount_serde, Address};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::api::AppState;

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32001;

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named parameters.
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

impl JsonRpcResponse {
    /// Wraps a dispatch outcome.
    pub fn from_outcome(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            jsonrpc: "2.0".into(),
            result,
            error,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(err: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {err}"))
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {err}"))
    }

    /// A refused signature or nonce, reported as an authorization error.
    fn unauthorized(reason: &'static str, message: impl Into<String>) -> Self {
        let category = ErrorCategory::Authorization;
        Self {
            code: category_code(category),
            message: message.into(),
            data: Some(json!({ "category": category, "reason": reason })),
        }
    }
}

impl From<TreasuryError> for JsonRpcError {
    fn from(err: TreasuryError) -> Self {
        let category = err.category();
        Self {
            code: category_code(category),
            message: err.to_string(),
            data: Some(json!({
                "category": category,
                "reason": err.reason_code(),
            })),
        }
    }
}

/// JSON-RPC code for a treasury error category.
pub fn category_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Validation => -32010,
        ErrorCategory::Authorization => -32011,
        ErrorCategory::StateConflict => -32012,
        ErrorCategory::ResourceInsufficiency => -32013,
        ErrorCategory::BoundViolation => -32014,
        ErrorCategory::Internal => INTERNAL_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Every method [`dispatch`] understands, by its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "ballast_version")]
    Version,
    #[serde(rename = "ballast_health")]
    Health,

    // -- Vault --
    /// Signed. Args: `collateral`, `amount`, optional `recipient`.
    #[serde(rename = "ballast_deposit")]
    Deposit,
    /// Signed. Args: `amount`, `collateral`.
    #[serde(rename = "ballast_requestRedemption")]
    RequestRedemption,
    /// Signed. Args: `id`.
    #[serde(rename = "ballast_cancelRedemption")]
    CancelRedemption,
    #[serde(rename = "ballast_processRedemption")]
    ProcessRedemption,
    #[serde(rename = "ballast_processBatchRedemptions")]
    ProcessBatchRedemptions,
    #[serde(rename = "ballast_checkCircuitBreaker")]
    CheckCircuitBreaker,

    // -- Oracle --
    /// Signed by an attestor. Args: `total_assets`, `report_date`,
    /// `proof_reference`.
    #[serde(rename = "ballast_attestNav")]
    AttestNav,
    #[serde(rename = "ballast_sweepExpiredAttestation")]
    SweepExpiredAttestation,

    // -- Ledger --
    #[serde(rename = "ballast_transfer")]
    Transfer,
    #[serde(rename = "ballast_transferShares")]
    TransferShares,
    /// Signed by the owner of the allowance. Args: `spender`, `amount`.
    #[serde(rename = "ballast_approve")]
    Approve,
    /// Signed by the spender. Args: `from`, `to`, `amount`.
    #[serde(rename = "ballast_transferFrom")]
    TransferFrom,

    // -- Administration (signed by the owner) --
    #[serde(rename = "ballast_setFees")]
    SetFees,
    #[serde(rename = "ballast_setRedemptionDelay")]
    SetRedemptionDelay,
    #[serde(rename = "ballast_setMinDeposit")]
    SetMinDeposit,
    #[serde(rename = "ballast_pauseDeposits")]
    PauseDeposits,
    #[serde(rename = "ballast_pauseRedemptions")]
    PauseRedemptions,
    #[serde(rename = "ballast_configureCircuitBreaker")]
    ConfigureCircuitBreaker,
    #[serde(rename = "ballast_resetCircuitBreaker")]
    ResetCircuitBreaker,
    #[serde(rename = "ballast_setAuthorizedAttestor")]
    SetAuthorizedAttestor,
    #[serde(rename = "ballast_setAttestationThreshold")]
    SetAttestationThreshold,
    #[serde(rename = "ballast_setMaxChangeBps")]
    SetMaxChangeBps,
    #[serde(rename = "ballast_setMaxDecreaseBps")]
    SetMaxDecreaseBps,
    #[serde(rename = "ballast_setMaxStaleness")]
    SetMaxStaleness,
    #[serde(rename = "ballast_setAttestationExpiry")]
    SetAttestationExpiry,

    // -- Queries --
    #[serde(rename = "ballast_balanceOf")]
    BalanceOf,
    #[serde(rename = "ballast_totalSupply")]
    TotalSupply,
    #[serde(rename = "ballast_navPerShare")]
    NavPerShare,
    #[serde(rename = "ballast_getSharesByAmount")]
    GetSharesByAmount,
    #[serde(rename = "ballast_getAmountByShares")]
    GetAmountByShares,
    #[serde(rename = "ballast_allowance")]
    Allowance,
    #[serde(rename = "ballast_getRedemption")]
    GetRedemption,
    #[serde(rename = "ballast_approvedCollateral")]
    ApprovedCollateral,
    /// Last nonce accepted from `account`, or null.
    #[serde(rename = "ballast_getNonce")]
    GetNonce,
}

impl RpcMethod {
    /// Looks a method up by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_owned())).ok()
    }

    /// Whether the method acts for an account and so needs a signed
    /// envelope.
    pub fn is_signed(self) -> bool {
        use RpcMethod::*;
        matches!(
            self,
            Deposit
                | RequestRedemption
                | CancelRedemption
                | AttestNav
                | Transfer
                | TransferShares
                | Approve
                | TransferFrom
                | SetFees
                | SetRedemptionDelay
                | SetMinDeposit
                | PauseDeposits
                | PauseRedemptions
                | ConfigureCircuitBreaker
                | ResetCircuitBreaker
                | SetAuthorizedAttestor
                | SetAttestationThreshold
                | SetMaxChangeBps
                | SetMaxDecreaseBps
                | SetMaxStaleness
                | SetAttestationExpiry
        )
    }
}

// ---------------------------------------------------------------------------
// Signed Envelopes
// ---------------------------------------------------------------------------

/// The outer parameters of a signed method.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedCall {
    pub signer: Address,
    pub nonce: u64,
    pub signature: Signature,
    #[serde(default)]
    pub args: Value,
}

impl SignedCall {
    /// Signs `args` for `method` as `keypair`'s account.
    pub fn sign(keypair: &Keypair, method: &str, nonce: u64, args: Value) -> Result<Self, JsonRpcError> {
        let args = normalize_args(args);
        let bytes = canonical_args(&args)?;
        Ok(Self {
            signer: keypair.address(),
            nonce,
            signature: sign_call(keypair, method, nonce, &bytes),
            args,
        })
    }
}

/// Missing arguments sign the same as `{}`.
fn normalize_args(args: Value) -> Value {
    if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    }
}

/// The bytes a call signature covers. `serde_json` objects keep their keys
/// sorted, so this encoding doesn't depend on how the client ordered them.
fn canonical_args(args: &Value) -> Result<Vec<u8>, JsonRpcError> {
    serde_json::to_vec(args).map_err(JsonRpcError::internal)
}

/// Highest nonce accepted from each signer.
#[derive(Debug, Default)]
pub struct NonceBook {
    last: Mutex<HashMap<Address, u64>>,
}

impl NonceBook {
    /// Records `nonce` for `signer` if it is above the last one accepted.
    pub fn consume(&self, signer: &Address, nonce: u64) -> Result<(), JsonRpcError> {
        let mut last = self.last.lock();
        if let Some(&previous) = last.get(signer) {
            if nonce <= previous {
                return Err(JsonRpcError::unauthorized(
                    "STALE_NONCE",
                    format!("nonce {nonce} is not above the last accepted nonce {previous}"),
                ));
            }
        }
        last.insert(signer.clone(), nonce);
        Ok(())
    }

    /// Last nonce accepted from `signer`.
    pub fn last(&self, signer: &Address) -> Option<u64> {
        self.last.lock().get(signer).copied()
    }
}

/// Checks a signed envelope and spends its nonce. Returns the acting
/// account and the inner arguments.
fn authenticate(state: &AppState, method: &str, params: Option<Value>) -> Result<(Address, Value), JsonRpcError> {
    let call: SignedCall = parse(params)?;
    let args = normalize_args(call.args);
    let bytes = canonical_args(&args)?;
    let signer = verify_call(&call.signer, method, call.nonce, &bytes, &call.signature).map_err(|e| {
        tracing::warn!(signer = %call.signer, method, error = %e, "rejected call signature");
        JsonRpcError::unauthorized("INVALID_SIGNATURE", format!("call signature rejected: {e}"))
    })?;
    state.nonces.consume(&signer, call.nonce)?;
    Ok((signer, args))
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DepositArgs {
    collateral: CollateralKind,
    #[serde(with = "amount_serde")]
    amount: u128,
    recipient: Option<Address>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestRedemptionArgs {
    #[serde(with = "amount_serde")]
    amount: u128,
    collateral: CollateralKind,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IdParams {
    id: RedemptionId,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchParams {
    ids: Vec<RedemptionId>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttestArgs {
    #[serde(with = "amount_serde")]
    total_assets: u128,
    report_date: u64,
    #[serde(with = "hex::serde")]
    proof_reference: Hash32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferArgs {
    to: Address,
    #[serde(with = "amount_serde")]
    amount: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferSharesArgs {
    to: Address,
    #[serde(with = "amount_serde")]
    shares: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ApproveArgs {
    spender: Address,
    #[serde(with = "amount_serde")]
    amount: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferFromArgs {
    from: Address,
    to: Address,
    #[serde(with = "amount_serde")]
    amount: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FeesArgs {
    mint_fee_bps: u32,
    redeem_fee_bps: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SecondsArgs {
    secs: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BpsArgs {
    bps: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MinDepositArgs {
    #[serde(with = "amount_serde")]
    min_deposit: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PauseArgs {
    paused: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BreakerArgs {
    enabled: bool,
    threshold_bps: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttestorArgs {
    attestor: Address,
    authorized: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdArgs {
    threshold: usize,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountParams {
    account: Address,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AmountParams {
    #[serde(with = "amount_serde")]
    amount: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SharesParams {
    #[serde(with = "amount_serde")]
    shares: u128,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowanceParams {
    owner: Address,
    spender: Address,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

fn amount(value: u128) -> Value {
    Value::String(value.to_string())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Runs one method against the shared treasury. Signed envelopes are
/// checked before the treasury lock is taken; the lock is then held for
/// the whole call.
pub fn dispatch(state: &AppState, name: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let method = RpcMethod::parse(name)
        .ok_or_else(|| JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {name}")))?;
    if method.is_signed() {
        let (caller, args) = authenticate(state, name, params)?;
        dispatch_signed(state, method, &caller, args)
    } else {
        dispatch_open(state, method, params)
    }
}

/// Methods that act for `caller`.
fn dispatch_signed(state: &AppState, method: RpcMethod, caller: &Address, args: Value) -> Result<Value, JsonRpcError> {
    let args = Some(args);
    let mut t = state.treasury.lock();
    match method {
        // -- Vault --
        RpcMethod::Deposit => {
            let p: DepositArgs = parse(args)?;
            let recipient = p.recipient.unwrap_or_else(|| caller.clone());
            to_json(t.deposit(caller, &p.collateral, p.amount, &recipient)?)
        }
        RpcMethod::RequestRedemption => {
            let p: RequestRedemptionArgs = parse(args)?;
            to_json(t.request_redemption(caller, p.amount, &p.collateral)?)
        }
        RpcMethod::CancelRedemption => {
            let p: IdParams = parse(args)?;
            let restored = t.cancel_redemption(caller, p.id)?;
            Ok(json!({ "id": p.id, "restored_shares": amount(restored) }))
        }

        // -- Oracle --
        RpcMethod::AttestNav => {
            let p: AttestArgs = parse(args)?;
            to_json(t.attest_nav(caller, p.total_assets, p.report_date, p.proof_reference)?)
        }

        // -- Ledger --
        RpcMethod::Transfer => {
            let p: TransferArgs = parse(args)?;
            let shares = t.transfer(caller, &p.to, p.amount)?;
            Ok(json!({ "shares": amount(shares) }))
        }
        RpcMethod::TransferShares => {
            let p: TransferSharesArgs = parse(args)?;
            let value = t.transfer_shares(caller, &p.to, p.shares)?;
            Ok(json!({ "amount": amount(value) }))
        }
        RpcMethod::Approve => {
            let p: ApproveArgs = parse(args)?;
            t.approve(caller, &p.spender, p.amount)?;
            Ok(Value::Null)
        }
        RpcMethod::TransferFrom => {
            let p: TransferFromArgs = parse(args)?;
            let shares = t.transfer_from(caller, &p.from, &p.to, p.amount)?;
            Ok(json!({ "shares": amount(shares) }))
        }

        // -- Administration --
        RpcMethod::SetFees => {
            let p: FeesArgs = parse(args)?;
            t.set_fees(caller, p.mint_fee_bps, p.redeem_fee_bps)?;
            Ok(Value::Null)
        }
        RpcMethod::SetRedemptionDelay => {
            let p: SecondsArgs = parse(args)?;
            t.set_redemption_delay(caller, Duration::from_secs(p.secs))?;
            Ok(Value::Null)
        }
        RpcMethod::SetMinDeposit => {
            let p: MinDepositArgs = parse(args)?;
            t.set_min_deposit(caller, p.min_deposit)?;
            Ok(Value::Null)
        }
        RpcMethod::PauseDeposits => {
            let p: PauseArgs = parse(args)?;
            t.pause_deposits(caller, p.paused)?;
            Ok(Value::Null)
        }
        RpcMethod::PauseRedemptions => {
            let p: PauseArgs = parse(args)?;
            t.pause_redemptions(caller, p.paused)?;
            Ok(Value::Null)
        }
        RpcMethod::ConfigureCircuitBreaker => {
            let p: BreakerArgs = parse(args)?;
            t.configure_circuit_breaker(caller, p.enabled, p.threshold_bps)?;
            Ok(Value::Null)
        }
        RpcMethod::ResetCircuitBreaker => {
            let _: NoArgs = parse(args)?;
            t.reset_circuit_breaker(caller)?;
            Ok(Value::Null)
        }
        RpcMethod::SetAuthorizedAttestor => {
            let p: AttestorArgs = parse(args)?;
            t.set_authorized_attestor(caller, &p.attestor, p.authorized)?;
            Ok(Value::Null)
        }
        RpcMethod::SetAttestationThreshold => {
            let p: ThresholdArgs = parse(args)?;
            t.set_attestation_threshold(caller, p.threshold)?;
            Ok(Value::Null)
        }
        RpcMethod::SetMaxChangeBps => {
            let p: BpsArgs = parse(args)?;
            t.set_max_change_bps(caller, p.bps)?;
            Ok(Value::Null)
        }
        RpcMethod::SetMaxDecreaseBps => {
            let p: BpsArgs = parse(args)?;
            t.set_max_decrease_bps(caller, p.bps)?;
            Ok(Value::Null)
        }
        RpcMethod::SetMaxStaleness => {
            let p: SecondsArgs = parse(args)?;
            t.set_max_staleness(caller, Duration::from_secs(p.secs))?;
            Ok(Value::Null)
        }
        RpcMethod::SetAttestationExpiry => {
            let p: SecondsArgs = parse(args)?;
            t.set_attestation_expiry(caller, Duration::from_secs(p.secs))?;
            Ok(Value::Null)
        }

        other => Err(JsonRpcError::internal(format!("{other:?} is not a signed method"))),
    }
}

/// Permissionless methods and queries.
fn dispatch_open(state: &AppState, method: RpcMethod, params: Option<Value>) -> Result<Value, JsonRpcError> {
    if method == RpcMethod::GetNonce {
        let p: AccountParams = parse(params)?;
        return Ok(json!(state.nonces.last(&p.account)));
    }

    let mut t = state.treasury.lock();
    match method {
        RpcMethod::Version => Ok(json!(state.version)),
        RpcMethod::Health => to_json(t.health()?),

        // -- Keeper hooks --
        RpcMethod::ProcessRedemption => {
            let p: IdParams = parse(params)?;
            to_json(t.process_redemption(p.id)?)
        }
        RpcMethod::ProcessBatchRedemptions => {
            let p: BatchParams = parse(params)?;
            to_json(t.process_batch_redemptions(&p.ids)?)
        }
        RpcMethod::CheckCircuitBreaker => Ok(json!({ "tripped": t.check_circuit_breaker()? })),
        RpcMethod::SweepExpiredAttestation => {
            Ok(json!({ "swept": t.sweep_expired_attestation()? }))
        }

        // -- Queries --
        RpcMethod::BalanceOf => {
            let p: AccountParams = parse(params)?;
            Ok(json!({
                "account": p.account,
                "shares": amount(t.shares_of(&p.account)),
                "balance": amount(t.balance_of(&p.account)?),
            }))
        }
        RpcMethod::TotalSupply => Ok(json!({
            "total_supply": amount(t.total_supply()?),
            "total_shares": amount(t.total_shares()),
        })),
        RpcMethod::NavPerShare => Ok(json!({
            "nav_per_share": amount(t.nav_per_share()),
            "fresh": t.is_fresh(),
        })),
        RpcMethod::GetSharesByAmount => {
            let p: AmountParams = parse(params)?;
            Ok(amount(t.get_shares_by_amount(p.amount)?))
        }
        RpcMethod::GetAmountByShares => {
            let p: SharesParams = parse(params)?;
            Ok(amount(t.get_amount_by_shares(p.shares)?))
        }
        RpcMethod::Allowance => {
            let p: AllowanceParams = parse(params)?;
            Ok(amount(t.allowance(&p.owner, &p.spender)))
        }
        RpcMethod::GetRedemption => {
            let p: IdParams = parse(params)?;
            match t.vault().redemption_request(p.id) {
                Some(request) => to_json(request),
                None => Err(JsonRpcError::new(
                    NOT_FOUND,
                    format!("Redemption request {} not found", p.id),
                )),
            }
        }
        RpcMethod::ApprovedCollateral => to_json(t.approved_collateral()),

        other => Err(JsonRpcError::invalid_params(format!(
            "{other:?} needs a signed envelope"
        ))),
    }
}
