use crate::config::{clamp_response_bytes, ControllerConfig};
use crate::domain::types::{PublicKey, SignedDelegation, TransactionReceipt};
use crate::features::abi;
use crate::features::cancellation::CancellationToken;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum ChainLogPriority {
    #[log_level(capacity = 1000, name = "CHAIN_INFO")]
    Info,
    #[log_level(capacity = 500, name = "CHAIN_WARN")]
    Warn,
}

impl GetLogFilter for ChainLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractRead {
    pub address: Address,
    /// Solidity signature, used for diagnostics only.
    pub function: &'static str,
    pub calldata: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractWrite {
    pub address: Address,
    pub function: &'static str,
    pub calldata: Bytes,
    pub value: U256,
    pub authorization_list: Vec<SignedDelegation>,
}

/// Remote chain access. Errors are reason strings; callers never retry.
#[async_trait(?Send)]
pub trait ChainClient {
    async fn read_contract(&self, request: &ContractRead) -> Result<Bytes, String>;

    async fn write_contract(&self, request: &ContractWrite) -> Result<B256, String>;

    /// Resolves once the transaction is mined. Gives up with an error when the
    /// client's own poll budget runs out or `cancel` fires between polls.
    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, String>;
}

/// Byte-level JSON-RPC transport used by `HttpChainClient`.
#[async_trait(?Send)]
pub trait RpcTransport {
    async fn post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// `ureq` transport with a response size cap.
#[derive(Clone, Copy, Debug)]
pub struct UreqTransport {
    max_response_bytes: u64,
}

impl UreqTransport {
    pub fn new(max_response_bytes: u64) -> Self {
        Self {
            max_response_bytes: clamp_response_bytes(max_response_bytes),
        }
    }
}

#[async_trait(?Send)]
impl RpcTransport for UreqTransport {
    async fn post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let response = ureq::post(url)
            .set("content-type", "application/json")
            .send_bytes(body)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => format!("rpc returned status {status}"),
                ureq::Error::Transport(transport) => {
                    format!("rpc transport failed: {transport}")
                }
            })?;

        let mut raw = Vec::new();
        response
            .into_reader()
            .take(self.max_response_bytes.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|error| format!("failed to read rpc response body: {error}"))?;
        if u64::try_from(raw.len()).unwrap_or(u64::MAX) > self.max_response_bytes {
            return Err(format!(
                "rpc response exceeded max_response_bytes={}",
                self.max_response_bytes
            ));
        }
        Ok(raw)
    }
}

/// Suspension between receipt polls.
#[async_trait(?Send)]
pub trait PollDelay {
    async fn wait(&self, duration: Duration);
}

/// Hands control back to the executor on every poll until the deadline
/// passes. Hosts with a timer should inject their own `PollDelay`.
#[derive(Clone, Copy, Debug, Default)]
pub struct YieldingDelay;

#[async_trait(?Send)]
impl PollDelay for YieldingDelay {
    async fn wait(&self, duration: Duration) {
        let now = Instant::now();
        Deadline(now.checked_add(duration).unwrap_or(now)).await
    }
}

struct Deadline(Instant);

impl Future for Deadline {
    type Output = ();

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.0 {
            return Poll::Ready(());
        }
        context.waker().wake_by_ref();
        Poll::Pending
    }
}

/// JSON-RPC chain client.
///
/// Writes use the sponsored `wallet_sendTransaction` method, so the EOA never
/// pays gas and no raw transaction is signed locally.
pub struct HttpChainClient {
    rpc_url: String,
    fallback_rpc_url: Option<String>,
    chain_id: u64,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
    transport: Box<dyn RpcTransport>,
    delay: Box<dyn PollDelay>,
}

impl HttpChainClient {
    pub fn from_config(config: &ControllerConfig) -> Result<Self, String> {
        let rpc_url = config.rpc_url.trim();
        if rpc_url.is_empty() {
            return Err("rpc url is not configured".to_string());
        }
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            fallback_rpc_url: config
                .fallback_rpc_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            chain_id: config.chain_id,
            receipt_poll_attempts: config.receipt_poll_attempts.max(1),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            transport: Box::new(UreqTransport::new(config.clamped_max_response_bytes())),
            delay: Box::new(YieldingDelay),
        })
    }

    pub fn with_transport(mut self, transport: Box<dyn RpcTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_poll_delay(mut self, delay: Box<dyn PollDelay>) -> Self {
        self.delay = delay;
        self
    }

    pub async fn eth_call(&self, address: Address, calldata: &Bytes) -> Result<Bytes, String> {
        let response = self
            .rpc_call(
                "eth_call",
                json!([{"to": address, "data": calldata}, "latest"]),
            )
            .await
            .map_err(|error| format!("eth_call failed: {error}"))?;
        let raw = response
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| "eth_call result was missing".to_string())?;
        decode_hex_blob(raw, "eth_call result")
    }

    pub async fn wallet_send_transaction(&self, request: &ContractWrite) -> Result<B256, String> {
        let authorization_list: Vec<Value> = request
            .authorization_list
            .iter()
            .map(|authorization| {
                json!({
                    "chainId": format!("0x{:x}", authorization.chain_id),
                    "address": authorization.delegate,
                    "nonce": format!("0x{:x}", authorization.nonce),
                    "yParity": format!("0x{:x}", authorization.y_parity),
                    "r": format!("0x{:x}", authorization.r),
                    "s": format!("0x{:x}", authorization.s),
                })
            })
            .collect();

        let mut transaction = serde_json::Map::new();
        transaction.insert(
            "chainId".to_string(),
            Value::String(format!("0x{:x}", self.chain_id)),
        );
        transaction.insert("to".to_string(), json!(request.address));
        transaction.insert("data".to_string(), json!(request.calldata));
        transaction.insert(
            "value".to_string(),
            Value::String(format!("0x{:x}", request.value)),
        );
        if !authorization_list.is_empty() {
            transaction.insert(
                "authorizationList".to_string(),
                Value::Array(authorization_list),
            );
        }

        let response = self
            .rpc_call(
                "wallet_sendTransaction",
                Value::Array(vec![Value::Object(transaction)]),
            )
            .await
            .map_err(|error| format!("wallet_sendTransaction failed: {error}"))?;
        let raw = response
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| "wallet_sendTransaction result was missing".to_string())?;
        parse_hex_b256(raw, "wallet_sendTransaction result")
    }

    pub async fn eth_get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, String> {
        let response = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await
            .map_err(|error| format!("eth_getTransactionReceipt failed: {error}"))?;
        let receipt = match response.get("result") {
            None => return Err("eth_getTransactionReceipt result was missing".to_string()),
            Some(Value::Null) => return Ok(None),
            Some(receipt) => receipt,
        };

        let field = |name: &str| {
            receipt
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("receipt is missing {name}"))
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: parse_hex_b256(field("transactionHash")?, "transactionHash")?,
            block_number: parse_hex_u64(field("blockNumber")?, "blockNumber")?,
            succeeded: parse_hex_u64(field("status")?, "status")? == 1,
        }))
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, String> {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .map_err(|error| format!("failed to serialize {method} request: {error}"))?;

        let raw = self.http_post(&body).await?;
        let value: Value = serde_json::from_slice(&raw)
            .map_err(|error| format!("failed to parse {method} response JSON: {error}"))?;
        if let Some(error) = value.get("error") {
            return Err(format!("rpc returned error for {method}: {error}"));
        }
        Ok(value)
    }

    async fn http_post(&self, body: &[u8]) -> Result<Vec<u8>, String> {
        match self.transport.post(&self.rpc_url, body).await {
            Ok(body) => Ok(body),
            Err(primary_error) => {
                if let Some(fallback_url) = self.fallback_rpc_url.as_deref() {
                    log!(
                        ChainLogPriority::Warn,
                        "rpc_fallback primary_error={primary_error}"
                    );
                    self.transport
                        .post(fallback_url, body)
                        .await
                        .map_err(|fallback_error| {
                            format!(
                                "primary rpc failed: {primary_error}; fallback rpc failed: {fallback_error}"
                            )
                        })
                } else {
                    Err(primary_error)
                }
            }
        }
    }
}

#[async_trait(?Send)]
impl ChainClient for HttpChainClient {
    async fn read_contract(&self, request: &ContractRead) -> Result<Bytes, String> {
        self.eth_call(request.address, &request.calldata)
            .await
            .map_err(|error| format!("{} read failed: {error}", request.function))
    }

    async fn write_contract(&self, request: &ContractWrite) -> Result<B256, String> {
        let tx_hash = self
            .wallet_send_transaction(request)
            .await
            .map_err(|error| format!("{} write failed: {error}", request.function))?;
        log!(
            ChainLogPriority::Info,
            "write_submitted function={} to={} tx_hash={tx_hash} authorizations={}",
            request.function,
            request.address,
            request.authorization_list.len()
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, String> {
        for attempt in 1..=self.receipt_poll_attempts {
            cancel.ensure_active(&format!("receipt poll {attempt} of {tx_hash}"))?;
            if let Some(receipt) = self.eth_get_transaction_receipt(tx_hash).await? {
                log!(
                    ChainLogPriority::Info,
                    "receipt_found tx_hash={tx_hash} block={} succeeded={} attempt={attempt}",
                    receipt.block_number,
                    receipt.succeeded
                );
                return Ok(receipt);
            }
            if attempt < self.receipt_poll_attempts {
                self.delay.wait(self.receipt_poll_interval).await;
            }
        }
        Err(format!(
            "timed out waiting for receipt of {tx_hash} after {} attempts",
            self.receipt_poll_attempts
        ))
    }
}

#[derive(Default)]
struct MockChainState {
    nonces: BTreeMap<Address, U256>,
    keys: BTreeMap<Address, PublicKey>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    receipt_failure: Option<String>,
    revert: bool,
    reads: Vec<ContractRead>,
    writes: Vec<ContractWrite>,
    pending: BTreeMap<B256, ContractWrite>,
}

/// In-memory stand-in for the delegation contract.
///
/// A confirmed `authorize` records the key for the target address and a
/// confirmed `aggregate` bumps its nonce, which is enough to drive the
/// controller end to end without a node.
#[derive(Default)]
pub struct MockChainClient {
    state: RefCell<MockChainState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nonce(self, address: Address, nonce: U256) -> Self {
        self.state.borrow_mut().nonces.insert(address, nonce);
        self
    }

    pub fn with_key(self, address: Address, key: PublicKey) -> Self {
        self.state.borrow_mut().keys.insert(address, key);
        self
    }

    pub fn fail_reads_with(self, reason: &str) -> Self {
        self.state.borrow_mut().read_failure = Some(reason.to_string());
        self
    }

    pub fn fail_writes_with(self, reason: &str) -> Self {
        self.state.borrow_mut().write_failure = Some(reason.to_string());
        self
    }

    pub fn fail_receipts_with(self, reason: &str) -> Self {
        self.state.borrow_mut().receipt_failure = Some(reason.to_string());
        self
    }

    pub fn revert_transactions(self) -> Self {
        self.state.borrow_mut().revert = true;
        self
    }

    pub fn reads(&self) -> Vec<ContractRead> {
        self.state.borrow().reads.clone()
    }

    pub fn writes(&self) -> Vec<ContractWrite> {
        self.state.borrow().writes.clone()
    }

    pub fn nonce_of(&self, address: Address) -> U256 {
        self.state
            .borrow()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn key_of(&self, address: Address) -> Option<PublicKey> {
        self.state.borrow().keys.get(&address).copied()
    }
}

#[async_trait(?Send)]
impl ChainClient for MockChainClient {
    async fn read_contract(&self, request: &ContractRead) -> Result<Bytes, String> {
        let mut state = self.state.borrow_mut();
        state.reads.push(request.clone());
        if let Some(reason) = &state.read_failure {
            return Err(reason.clone());
        }

        let mut out = Vec::with_capacity(64);
        match request.function {
            abi::NONCE_SIGNATURE => {
                let nonce = state
                    .nonces
                    .get(&request.address)
                    .copied()
                    .unwrap_or(U256::ZERO);
                out.extend_from_slice(&nonce.to_be_bytes::<32>());
            }
            abi::KEYS_SIGNATURE => {
                let key = state.keys.get(&request.address).copied().unwrap_or(PublicKey {
                    x: U256::ZERO,
                    y: U256::ZERO,
                });
                out.extend_from_slice(&key.x.to_be_bytes::<32>());
                out.extend_from_slice(&key.y.to_be_bytes::<32>());
            }
            other => return Err(format!("mock chain has no view {other}")),
        }
        Ok(Bytes::from(out))
    }

    async fn write_contract(&self, request: &ContractWrite) -> Result<B256, String> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.write_failure {
            return Err(reason.clone());
        }
        state.writes.push(request.clone());

        let mut preimage = request.calldata.to_vec();
        preimage.extend_from_slice(&(state.writes.len() as u64).to_be_bytes());
        let tx_hash = keccak256(&preimage);
        state.pending.insert(tx_hash, request.clone());
        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<TransactionReceipt, String> {
        cancel.ensure_active(&format!("receipt wait of {tx_hash}"))?;
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.receipt_failure {
            return Err(reason.clone());
        }
        let write = state
            .pending
            .remove(&tx_hash)
            .ok_or_else(|| format!("unknown transaction {tx_hash}"))?;
        let succeeded = !state.revert;

        if succeeded {
            match write.function {
                abi::AUTHORIZE_SIGNATURE => {
                    let key = abi::decode_public_key(write.calldata.get(4..).unwrap_or_default())?;
                    state.keys.insert(write.address, key);
                }
                abi::AGGREGATE_SIGNATURE => {
                    let nonce = state.nonces.entry(write.address).or_insert(U256::ZERO);
                    *nonce += U256::from(1u64);
                }
                _ => {}
            }
        }

        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: state.writes.len() as u64,
            succeeded,
        })
    }
}

fn parse_hex_u64(raw: &str, field: &str) -> Result<u64, String> {
    let value = raw.trim();
    let without_prefix = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    u64::from_str_radix(without_prefix, 16)
        .map_err(|error| format!("failed to parse {field} as hex u64: {error}"))
}

fn parse_hex_b256(raw: &str, field: &str) -> Result<B256, String> {
    let bytes = decode_hex_blob(raw, field)?;
    if bytes.len() != 32 {
        return Err(format!("{field} must be 32 bytes, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

fn decode_hex_blob(raw: &str, field: &str) -> Result<Bytes, String> {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    if without_prefix.len() % 2 != 0 {
        return Err(format!("{field} hex length must be even"));
    }
    hex::decode(without_prefix)
        .map(Bytes::from)
        .map_err(|error| format!("{field} must be valid hex: {error}"))
}
