//! Batched execution through the delegation contract installed on the active
//! account. The credential signs over the contract's current nonce, so a
//! signature is valid for exactly one batch.
use crate::domain::digest::{build_execution_digest, encode_calls};
use crate::domain::types::Call;
use crate::error::{ControllerError, ControllerResult};
use crate::features::abi::{
    aggregate_calldata, decode_uint_word, nonce_calldata, AGGREGATE_SIGNATURE, NONCE_SIGNATURE,
};
use crate::features::authenticator::Authenticator;
use crate::features::cancellation::CancellationToken;
use crate::features::chain::{ChainClient, ContractRead, ContractWrite};
use crate::features::credential::{parse_credential_signature, sign_with_credential};
use crate::storage::account_store::AccountStore;
use alloy_primitives::{Address, B256, U256};
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum ExecutionLogPriority {
    #[log_level(capacity = 1000, name = "EXECUTION_INFO")]
    Info,
    #[log_level(capacity = 500, name = "EXECUTION_ERROR")]
    Error,
}

impl GetLogFilter for ExecutionLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

pub struct ExecutionEngine<'a> {
    chain: &'a dyn ChainClient,
    authenticator: &'a dyn Authenticator,
    store: &'a AccountStore,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        chain: &'a dyn ChainClient,
        authenticator: &'a dyn Authenticator,
        store: &'a AccountStore,
    ) -> Self {
        Self {
            chain,
            authenticator,
            store,
        }
    }

    /// Submit `calls` as one atomic batch and return the transaction hash
    /// once its receipt confirms.
    pub async fn execute(
        &self,
        calls: &[Call],
        cancel: &CancellationToken,
    ) -> ControllerResult<B256> {
        let account = self.store.get().ok_or_else(|| {
            ControllerError::NotAuthorized("no active account is loaded".to_string())
        })?;
        if calls.is_empty() {
            return Err(ControllerError::InvalidArgument(
                "call list cannot be empty".to_string(),
            ));
        }
        cancel
            .ensure_active("execution")
            .map_err(ControllerError::ExecutionAborted)?;

        let address = account.address();
        let nonce = self
            .read_nonce(address)
            .await
            .map_err(ControllerError::ExecutionAborted)?;
        let encoded = encode_calls(calls);
        let digest = build_execution_digest(nonce, &encoded);
        log!(
            ExecutionLogPriority::Info,
            "execution_prepared address={address} nonce={nonce} calls={} digest={digest}",
            calls.len()
        );

        let assertion = sign_with_credential(
            self.authenticator,
            &account.key().id,
            digest.as_slice(),
            cancel,
        )
        .await
        .map_err(ControllerError::ExecutionAborted)?;
        let (r, s) = parse_credential_signature(&assertion.signature)
            .map_err(ControllerError::ExecutionAborted)?;

        cancel
            .ensure_active("execution submission")
            .map_err(ControllerError::ExecutionAborted)?;
        let tx_hash = self
            .chain
            .write_contract(&ContractWrite {
                address,
                function: AGGREGATE_SIGNATURE,
                calldata: aggregate_calldata(calls, r, s),
                value: U256::ZERO,
                authorization_list: Vec::new(),
            })
            .await
            .map_err(|error| self.fail(address, error))?;
        log!(
            ExecutionLogPriority::Info,
            "execution_submitted address={address} tx_hash={tx_hash}"
        );

        let receipt = self
            .chain
            .wait_for_receipt(tx_hash, cancel)
            .await
            .map_err(|error| self.fail(address, error))?;
        if !receipt.succeeded {
            return Err(self.fail(
                address,
                format!(
                    "execute transaction {tx_hash} reverted in block {}",
                    receipt.block_number
                ),
            ));
        }

        log!(
            ExecutionLogPriority::Info,
            "execution_confirmed address={address} tx_hash={tx_hash} block={}",
            receipt.block_number
        );
        Ok(tx_hash)
    }

    async fn read_nonce(&self, address: Address) -> Result<U256, String> {
        let raw = self
            .chain
            .read_contract(&ContractRead {
                address,
                function: NONCE_SIGNATURE,
                calldata: nonce_calldata(),
            })
            .await
            .map_err(|error| format!("nonce read failed: {error}"))?;
        decode_uint_word(&raw, 0, "nonce")
    }

    fn fail(&self, address: Address, reason: String) -> ControllerError {
        log!(
            ExecutionLogPriority::Error,
            "execution_failed address={address} reason={reason}"
        );
        ControllerError::ChainCallFailed(reason)
    }
}
