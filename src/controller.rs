use crate::config::ControllerConfig;
use crate::domain::types::{Account, Call};
use crate::error::{ControllerError, ControllerResult};
use crate::features::account_loader;
use crate::features::authenticator::Authenticator;
use crate::features::authorization::AuthorizationEngine;
use crate::features::cancellation::CancellationToken;
use crate::features::chain::{ChainClient, HttpChainClient};
use crate::features::execution::ExecutionEngine;
use crate::storage::account_store::AccountStore;
use alloy_primitives::B256;
use k256::ecdsa::SigningKey;

/// Owns the configuration, both capabilities and the active account.
///
/// Operations on one controller are expected to run one at a time; the store
/// is replaced whole at the end of a successful authorize or load.
pub struct DelegatedAccountController {
    config: ControllerConfig,
    chain: Box<dyn ChainClient>,
    authenticator: Box<dyn Authenticator>,
    store: AccountStore,
}

impl DelegatedAccountController {
    pub fn new(
        config: ControllerConfig,
        chain: Box<dyn ChainClient>,
        authenticator: Box<dyn Authenticator>,
    ) -> ControllerResult<Self> {
        Self::with_store(config, chain, authenticator, AccountStore::new())
    }

    /// Build with a caller-provided store, e.g. one restored from a cache.
    pub fn with_store(
        config: ControllerConfig,
        chain: Box<dyn ChainClient>,
        authenticator: Box<dyn Authenticator>,
        store: AccountStore,
    ) -> ControllerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chain,
            authenticator,
            store,
        })
    }

    /// Wire the JSON-RPC chain client from `config`.
    pub fn with_http_chain(
        config: ControllerConfig,
        authenticator: Box<dyn Authenticator>,
    ) -> ControllerResult<Self> {
        let chain = HttpChainClient::from_config(&config).map_err(ControllerError::Config)?;
        Self::new(config, Box::new(chain), authenticator)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn account(&self) -> Option<Account> {
        self.store.get()
    }

    /// Forget the active account. On-chain state is untouched.
    pub fn clear_account(&self) {
        self.store.clear();
    }

    pub async fn authorize_new_account(
        &self,
        cancel: &CancellationToken,
    ) -> ControllerResult<Account> {
        self.authorization().authorize_new_account(cancel).await
    }

    pub async fn authorize_with_key(
        &self,
        eoa_key: SigningKey,
        cancel: &CancellationToken,
    ) -> ControllerResult<Account> {
        self.authorization()
            .authorize_with_key(eoa_key, cancel)
            .await
    }

    pub async fn load_account(&self, cancel: &CancellationToken) -> ControllerResult<Account> {
        account_loader::load_account(
            self.chain.as_ref(),
            self.authenticator.as_ref(),
            &self.store,
            cancel,
        )
        .await
    }

    pub async fn execute(
        &self,
        calls: &[Call],
        cancel: &CancellationToken,
    ) -> ControllerResult<B256> {
        ExecutionEngine::new(self.chain.as_ref(), self.authenticator.as_ref(), &self.store)
            .execute(calls, cancel)
            .await
    }

    fn authorization(&self) -> AuthorizationEngine<'_> {
        AuthorizationEngine::new(
            &self.config,
            self.chain.as_ref(),
            self.authenticator.as_ref(),
            &self.store,
        )
    }
}
