//! Controller for EOAs delegated to a batching contract and operated through a
//! platform passkey.
//!
//! A fresh EOA key is generated once, used to bind a P-256 credential to the
//! account on chain together with the delegation authorization, and then
//! discarded. Every later batch is authorized by the credential alone.
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod features;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::ControllerConfig;
pub use controller::DelegatedAccountController;
pub use domain::types::{Account, Call, CredentialKey, PublicKey};
pub use error::{ControllerError, ControllerResult};
pub use features::{
    Authenticator, CancellationToken, ChainClient, HttpChainClient, MockChainClient, PollDelay,
    RpcTransport, SoftwareAuthenticator, UreqTransport, YieldingDelay,
};
pub use storage::account_store::{AccountCache, AccountStore, InMemoryAccountCache};
