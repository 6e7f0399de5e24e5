//! Account authorization: bind a fresh EOA to a platform credential and
//! install the delegation contract on it in a single sponsored transaction.
use crate::config::ControllerConfig;
use crate::domain::digest::build_authorization_digest;
use crate::domain::state_machine;
use crate::domain::types::{Account, AuthorizationEvent, AuthorizationStage};
use crate::error::{ControllerError, ControllerResult};
use crate::features::abi::{authorize_calldata, AUTHORIZE_SIGNATURE};
use crate::features::authenticator::Authenticator;
use crate::features::cancellation::CancellationToken;
use crate::features::chain::{ChainClient, ContractWrite};
use crate::features::credential::create_credential;
use crate::features::delegation::{
    eoa_address, generate_eoa_key, sign_delegation, sign_prehash,
};
use crate::storage::account_store::AccountStore;
use alloy_primitives::U256;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use k256::ecdsa::SigningKey;

/// Nonce of the first delegation authorization a fresh EOA signs.
const FRESH_EOA_NONCE: u64 = 0;

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum AuthorizationLogPriority {
    #[log_level(capacity = 1000, name = "AUTHORIZATION_INFO")]
    Info,
    #[log_level(capacity = 500, name = "AUTHORIZATION_ERROR")]
    Error,
}

impl GetLogFilter for AuthorizationLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

pub struct AuthorizationEngine<'a> {
    config: &'a ControllerConfig,
    chain: &'a dyn ChainClient,
    authenticator: &'a dyn Authenticator,
    store: &'a AccountStore,
}

impl<'a> AuthorizationEngine<'a> {
    pub fn new(
        config: &'a ControllerConfig,
        chain: &'a dyn ChainClient,
        authenticator: &'a dyn Authenticator,
        store: &'a AccountStore,
    ) -> Self {
        Self {
            config,
            chain,
            authenticator,
            store,
        }
    }

    pub async fn authorize_new_account(
        &self,
        cancel: &CancellationToken,
    ) -> ControllerResult<Account> {
        self.authorize_with_key(generate_eoa_key(), cancel).await
    }

    /// Authorize a caller-supplied EOA key.
    ///
    /// The key is consumed and dropped when this returns. The store is only
    /// written after the authorization receipt confirms.
    pub async fn authorize_with_key(
        &self,
        eoa_key: SigningKey,
        cancel: &CancellationToken,
    ) -> ControllerResult<Account> {
        let mut stage = AuthorizationStage::Unbound;
        let outcome = self.run(&eoa_key, &mut stage, cancel).await;
        drop(eoa_key);

        match outcome {
            Ok(account) => {
                self.store.set(account.clone());
                log!(
                    AuthorizationLogPriority::Info,
                    "authorization_confirmed address={} tx_hash={}",
                    account.address(),
                    account
                        .auth_transaction_hash()
                        .map(|hash| hash.to_string())
                        .unwrap_or_default()
                );
                Ok(account)
            }
            Err(error) => {
                log!(
                    AuthorizationLogPriority::Error,
                    "authorization_failed stage={stage:?} error={error}"
                );
                let failed = AuthorizationEvent::Failed {
                    reason: error.reason().to_string(),
                };
                if let Err(transition_error) = advance_stage(&mut stage, &failed) {
                    log!(AuthorizationLogPriority::Error, "{transition_error}");
                }
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        eoa_key: &SigningKey,
        stage: &mut AuthorizationStage,
        cancel: &CancellationToken,
    ) -> ControllerResult<Account> {
        let address = eoa_address(eoa_key).map_err(ControllerError::AuthorizationFailed)?;
        log!(
            AuthorizationLogPriority::Info,
            "authorization_started address={address} chain_id={}",
            self.config.chain_id
        );

        let credential = create_credential(
            self.authenticator,
            address,
            &self.config.credential_label,
            cancel,
        )
        .await
        .map_err(into_authorization_failure)?;
        advance_stage(stage, &AuthorizationEvent::CredentialBound)
            .map_err(ControllerError::AuthorizationFailed)?;

        let digest = build_authorization_digest(U256::ZERO, &credential.public_key, U256::ZERO)
            .map_err(into_authorization_failure)?;
        let key_signature =
            sign_prehash(eoa_key, &digest).map_err(ControllerError::AuthorizationFailed)?;
        advance_stage(stage, &AuthorizationEvent::DigestSigned)
            .map_err(ControllerError::AuthorizationFailed)?;

        let delegation = sign_delegation(
            eoa_key,
            self.config.chain_id,
            self.config.delegation_contract,
            FRESH_EOA_NONCE,
        )
        .map_err(ControllerError::AuthorizationFailed)?;

        cancel
            .ensure_active("authorization submission")
            .map_err(ControllerError::AuthorizationFailed)?;
        let tx_hash = self
            .chain
            .write_contract(&ContractWrite {
                address,
                function: AUTHORIZE_SIGNATURE,
                calldata: authorize_calldata(&credential.public_key, U256::ZERO, &key_signature),
                value: U256::ZERO,
                authorization_list: vec![delegation],
            })
            .await
            .map_err(ControllerError::AuthorizationFailed)?;
        advance_stage(stage, &AuthorizationEvent::TransactionSubmitted { tx_hash })
            .map_err(ControllerError::AuthorizationFailed)?;
        log!(
            AuthorizationLogPriority::Info,
            "authorization_submitted address={address} tx_hash={tx_hash}"
        );

        let receipt = self
            .chain
            .wait_for_receipt(tx_hash, cancel)
            .await
            .map_err(ControllerError::ChainCallFailed)?;
        if !receipt.succeeded {
            return Err(ControllerError::AuthorizationFailed(format!(
                "authorize transaction {tx_hash} reverted in block {}",
                receipt.block_number
            )));
        }
        advance_stage(stage, &AuthorizationEvent::ReceiptConfirmed)
            .map_err(ControllerError::AuthorizationFailed)?;

        Ok(Account::new(address, credential).with_auth_transaction(tx_hash))
    }
}

fn into_authorization_failure(error: ControllerError) -> ControllerError {
    match error {
        ControllerError::AuthorizationFailed(_) => error,
        other => ControllerError::AuthorizationFailed(other.to_string()),
    }
}

fn advance_stage(
    stage: &mut AuthorizationStage,
    event: &AuthorizationEvent,
) -> Result<(), String> {
    let next = state_machine::transition(stage, event).map_err(|error| {
        format!(
            "invalid transition from {:?} on {:?}: {}",
            error.from, event, error.reason
        )
    })?;
    log!(
        AuthorizationLogPriority::Info,
        "authorization_stage from={stage:?} to={next:?}"
    );
    *stage = next;
    Ok(())
}
