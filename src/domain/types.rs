use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Affine coordinates of a P-256 credential public key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub x: U256,
    pub y: U256,
}

impl PublicKey {
    pub fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }
}

/// Authenticator credential bound to an account.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CredentialKey {
    pub id: String,
    pub public_key: PublicKey,
}

/// A usable delegated wallet.
///
/// Only constructible with both an address and a credential key, so a
/// half-built account can never reach the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    address: Address,
    #[serde(default)]
    auth_transaction_hash: Option<B256>,
    key: CredentialKey,
}

impl Account {
    pub fn new(address: Address, key: CredentialKey) -> Self {
        Self {
            address,
            auth_transaction_hash: None,
            key,
        }
    }

    pub fn with_auth_transaction(mut self, tx_hash: B256) -> Self {
        self.auth_transaction_hash = Some(tx_hash);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn auth_transaction_hash(&self) -> Option<B256> {
        self.auth_transaction_hash
    }

    pub fn key(&self) -> &CredentialKey {
        &self.key
    }
}

/// One unit of on-chain execution inside a batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

impl Call {
    pub fn new(to: Address) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: Bytes::new(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }
}

/// Recoverable secp256k1 signature produced by the EOA key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: U256,
    pub s: U256,
    pub y_parity: u8,
}

/// Delegation authorization signed by the EOA, carried in the authorization
/// list of the transaction that installs the delegate code.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedDelegation {
    pub chain_id: u64,
    pub delegate: Address,
    pub nonce: u64,
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub succeeded: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationStage {
    Unbound,
    CredentialCreated,
    DigestSigned,
    AuthorizationSubmitted,
    Confirmed,
}

#[derive(Clone, Debug)]
pub enum AuthorizationEvent {
    CredentialBound,
    DigestSigned,
    TransactionSubmitted { tx_hash: B256 },
    ReceiptConfirmed,
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: AuthorizationStage,
    pub event: String,
    pub reason: String,
}
