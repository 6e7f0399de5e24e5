use crate::error::{ControllerError, ControllerResult};
use alloy_primitives::Address;
use serde::Deserialize;

pub const DEFAULT_CHAIN_ID: u64 = 911_867;
pub const DEFAULT_CREDENTIAL_LABEL: &str = "Delegated Account";
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 64 * 1024;
pub const MIN_RESPONSE_BYTES: u64 = 256;
pub const MAX_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;
pub const DEFAULT_RECEIPT_POLL_ATTEMPTS: u32 = 60;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;

/// Runtime settings for the controller and its JSON-RPC chain client.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    pub chain_id: u64,
    /// Contract whose code is installed on every authorized EOA.
    pub delegation_contract: Address,
    pub credential_label: String,
    pub rpc_url: String,
    pub fallback_rpc_url: Option<String>,
    pub max_response_bytes: u64,
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            delegation_contract: Address::ZERO,
            credential_label: DEFAULT_CREDENTIAL_LABEL.to_string(),
            rpc_url: String::new(),
            fallback_rpc_url: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            receipt_poll_attempts: DEFAULT_RECEIPT_POLL_ATTEMPTS,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
        }
    }
}

impl ControllerConfig {
    pub fn new(chain_id: u64, delegation_contract: Address) -> Self {
        Self {
            chain_id,
            delegation_contract,
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> ControllerResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| ControllerError::Config(format!("invalid config json: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.chain_id == 0 {
            return Err(ControllerError::Config(
                "chain_id must be greater than zero".to_string(),
            ));
        }
        if self.delegation_contract == Address::ZERO {
            return Err(ControllerError::Config(
                "delegation_contract must be a non-zero address".to_string(),
            ));
        }
        if self.credential_label.trim().is_empty() {
            return Err(ControllerError::Config(
                "credential_label cannot be empty".to_string(),
            ));
        }
        if self.receipt_poll_attempts == 0 {
            return Err(ControllerError::Config(
                "receipt_poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clamped_max_response_bytes(&self) -> u64 {
        clamp_response_bytes(self.max_response_bytes)
    }
}

pub fn clamp_response_bytes(max_response_bytes: u64) -> u64 {
    max_response_bytes.clamp(MIN_RESPONSE_BYTES, MAX_RESPONSE_BYTES)
}
