//! Rebind a previously authorized account from the authenticator alone.
use crate::domain::types::{Account, CredentialKey};
use crate::error::{ControllerError, ControllerResult};
use crate::features::abi::{decode_public_key, keys_calldata, KEYS_SIGNATURE};
use crate::features::authenticator::Authenticator;
use crate::features::cancellation::CancellationToken;
use crate::features::chain::{ChainClient, ContractRead};
use crate::features::credential::{extract_address_from_assertion, load_credential};
use crate::storage::account_store::AccountStore;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};

/// Slot the authorization transaction writes the credential key into.
const PRIMARY_KEY_INDEX: u64 = 0;

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum LoaderLogPriority {
    #[log_level(capacity = 500, name = "LOADER_INFO")]
    Info,
}

impl GetLogFilter for LoaderLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// Ask the authenticator for any credential of this origin, recover the EOA
/// from its user handle and read the registered key back from the contract.
///
/// An EOA whose contract holds no key was never authorized and is reported as
/// `NotAuthorized`. The store is written only on success.
pub async fn load_account(
    chain: &dyn ChainClient,
    authenticator: &dyn Authenticator,
    store: &AccountStore,
    cancel: &CancellationToken,
) -> ControllerResult<Account> {
    let credential = load_credential(authenticator, cancel).await?;
    let address = extract_address_from_assertion(&credential.assertion)?;

    let raw = chain
        .read_contract(&ContractRead {
            address,
            function: KEYS_SIGNATURE,
            calldata: keys_calldata(PRIMARY_KEY_INDEX),
        })
        .await
        .map_err(ControllerError::ChainCallFailed)?;
    let public_key = decode_public_key(&raw).map_err(ControllerError::ChainCallFailed)?;
    if public_key.is_zero() {
        return Err(ControllerError::NotAuthorized(format!(
            "no key is registered for {address}"
        )));
    }

    let account = Account::new(
        address,
        CredentialKey {
            id: credential.id,
            public_key,
        },
    );
    store.set(account.clone());
    log!(
        LoaderLogPriority::Info,
        "account_loaded address={address} credential={}",
        account.key().id
    );
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PublicKey;
    use crate::features::authenticator::{
        CredentialAssertion, CredentialRequest, RawAssertion, RawCredential, SignRequest,
        SoftwareAuthenticator,
    };
    use crate::features::chain::MockChainClient;
    use crate::features::credential::parse_public_key;
    use crate::test_support::block_on_with_spin;
    use alloy_primitives::Address;
    use async_trait::async_trait;

    fn software_credential(address: Address) -> (SoftwareAuthenticator, PublicKey) {
        let authenticator = SoftwareAuthenticator::new();
        let raw = block_on_with_spin(authenticator.create_credential(&CredentialRequest {
            label: "test".to_string(),
            user_handle: address.to_vec(),
            challenge: Vec::new(),
        }))
        .expect("credential should be created");
        let key = parse_public_key(&raw.public_key).expect("key should parse");
        (authenticator, key)
    }

    struct ShortHandleAuthenticator;

    #[async_trait(?Send)]
    impl Authenticator for ShortHandleAuthenticator {
        async fn create_credential(
            &self,
            _request: &CredentialRequest,
        ) -> Result<RawCredential, String> {
            Err("unsupported".to_string())
        }

        async fn sign(&self, _request: &SignRequest) -> Result<CredentialAssertion, String> {
            Ok(CredentialAssertion {
                credential_id: "short".to_string(),
                signature: vec![0u8; 64],
                raw: RawAssertion {
                    user_handle: Some(vec![0x01, 0x02, 0x03]),
                    ..RawAssertion::default()
                },
            })
        }
    }

    #[test]
    fn load_reads_key_slot_zero_and_stores_account() {
        let address = Address::repeat_byte(0x42);
        let (authenticator, key) = software_credential(address);
        let chain = MockChainClient::new().with_key(address, key);
        let store = AccountStore::new();

        let account = block_on_with_spin(load_account(
            &chain,
            &authenticator,
            &store,
            &CancellationToken::new(),
        ))
        .expect("load should succeed");

        assert_eq!(account.address(), address);
        assert_eq!(account.key().public_key, key);
        assert!(account.auth_transaction_hash().is_none());
        assert_eq!(store.get(), Some(account));

        let reads = chain.reads();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].address, address);
        assert_eq!(reads[0].calldata, keys_calldata(0));
    }

    #[test]
    fn unregistered_eoa_is_not_authorized() {
        let address = Address::repeat_byte(0x42);
        let (authenticator, _) = software_credential(address);
        let chain = MockChainClient::new();
        let store = AccountStore::new();

        let error = block_on_with_spin(load_account(
            &chain,
            &authenticator,
            &store,
            &CancellationToken::new(),
        ))
        .expect_err("missing key should fail");

        assert!(matches!(error, ControllerError::NotAuthorized(_)));
        assert!(store.get().is_none());
    }

    #[test]
    fn missing_credential_and_bad_handle_are_reported() {
        let store = AccountStore::new();
        let chain = MockChainClient::new();

        let error = block_on_with_spin(load_account(
            &chain,
            &SoftwareAuthenticator::new(),
            &store,
            &CancellationToken::new(),
        ))
        .expect_err("no credential should fail");
        assert!(matches!(error, ControllerError::CredentialNotFound(_)));

        let error = block_on_with_spin(load_account(
            &chain,
            &ShortHandleAuthenticator,
            &store,
            &CancellationToken::new(),
        ))
        .expect_err("short handle should fail");
        assert!(matches!(error, ControllerError::MalformedAssertion(_)));
        assert!(chain.reads().is_empty());
    }

    #[test]
    fn key_read_failure_is_a_chain_failure() {
        let address = Address::repeat_byte(0x42);
        let (authenticator, _) = software_credential(address);
        let chain = MockChainClient::new().fail_reads_with("rpc unavailable");
        let store = AccountStore::new();

        let error = block_on_with_spin(load_account(
            &chain,
            &authenticator,
            &store,
            &CancellationToken::new(),
        ))
        .expect_err("read failure should fail");

        assert_eq!(
            error,
            ControllerError::ChainCallFailed("rpc unavailable".to_string())
        );
    }
}
