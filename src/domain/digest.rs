//! Signing payloads for authorization and batched execution.
//!
//! Both digests are keccak-256 over tightly packed big-endian words, so the
//! delegation contract can rebuild them with `abi.encodePacked`.

use crate::domain::types::{Call, PublicKey};
use crate::error::{ControllerError, ControllerResult};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

/// Only call type understood by the delegation contract.
pub const CALL_TYPE_CALL: u8 = 0;

const WORD_LEN: usize = 32;
const CALL_HEADER_LEN: usize = 1 + 20 + WORD_LEN + WORD_LEN;

pub fn build_authorization_digest(
    nonce: U256,
    public_key: &PublicKey,
    expiry: U256,
) -> ControllerResult<B256> {
    if !nonce.is_zero() || !expiry.is_zero() {
        return Err(ControllerError::InvalidArgument(format!(
            "authorization digest supports only the initial key (nonce=0, expiry=0), got nonce={nonce} expiry={expiry}"
        )));
    }

    let mut packed = Vec::with_capacity(WORD_LEN * 4);
    packed.extend_from_slice(&nonce.to_be_bytes::<32>());
    packed.extend_from_slice(&public_key.x.to_be_bytes::<32>());
    packed.extend_from_slice(&public_key.y.to_be_bytes::<32>());
    packed.extend_from_slice(&expiry.to_be_bytes::<32>());
    Ok(keccak256(&packed))
}

pub fn encode_calls(calls: &[Call]) -> Bytes {
    let total = calls
        .iter()
        .map(|call| CALL_HEADER_LEN + call.data.len())
        .sum();
    let mut out = Vec::with_capacity(total);
    for call in calls {
        out.push(CALL_TYPE_CALL);
        out.extend_from_slice(call.to.as_slice());
        out.extend_from_slice(&call.value.to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(call.data.len()).to_be_bytes::<32>());
        out.extend_from_slice(&call.data);
    }
    Bytes::from(out)
}

pub fn decode_calls(encoded: &[u8]) -> ControllerResult<Vec<Call>> {
    let mut calls = Vec::new();
    let mut cursor = 0usize;
    while cursor < encoded.len() {
        let header = encoded
            .get(cursor..cursor + CALL_HEADER_LEN)
            .ok_or_else(|| {
                ControllerError::InvalidArgument(format!(
                    "encoded call at offset {cursor} is truncated"
                ))
            })?;
        if header[0] != CALL_TYPE_CALL {
            return Err(ControllerError::InvalidArgument(format!(
                "unsupported call type {} at offset {cursor}",
                header[0]
            )));
        }
        let to = Address::from_slice(&header[1..21]);
        let value = U256::from_be_slice(&header[21..53]);
        let data_len = usize::try_from(U256::from_be_slice(&header[53..85])).map_err(|_| {
            ControllerError::InvalidArgument(format!(
                "call data length at offset {cursor} does not fit in memory"
            ))
        })?;

        let data_start = cursor + CALL_HEADER_LEN;
        let data_end = data_start.checked_add(data_len).ok_or_else(|| {
            ControllerError::InvalidArgument("call data length overflows".to_string())
        })?;
        let data = encoded.get(data_start..data_end).ok_or_else(|| {
            ControllerError::InvalidArgument(format!(
                "call data at offset {data_start} is truncated: want {data_len} bytes"
            ))
        })?;

        calls.push(Call {
            to,
            value,
            data: Bytes::copy_from_slice(data),
        });
        cursor = data_end;
    }
    Ok(calls)
}

pub fn build_execution_digest(nonce: U256, encoded_calls: &[u8]) -> B256 {
    let mut packed = Vec::with_capacity(WORD_LEN + encoded_calls.len());
    packed.extend_from_slice(&nonce.to_be_bytes::<32>());
    packed.extend_from_slice(encoded_calls);
    keccak256(&packed)
}
