//! Calldata for the delegation contract's entry points.
//!
//! The contract surface is small and fixed, so values are described by a
//! closed `AbiToken` set instead of JSON ABI artifacts.

use crate::domain::types::{Call, EcdsaSignature, PublicKey};
use alloy_primitives::{keccak256, Address, Bytes, U256};

pub const AUTHORIZE_SIGNATURE: &str = "authorize(uint256,uint256,uint256,uint256,uint256,uint8)";
pub const NONCE_SIGNATURE: &str = "nonce()";
pub const KEYS_SIGNATURE: &str = "keys(uint256)";
pub const AGGREGATE_SIGNATURE: &str = "aggregate((address,uint256,bytes)[],uint256,uint256)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiToken {
    Uint(U256),
    Address(Address),
    Bytes(Vec<u8>),
    Array(Vec<AbiToken>),
    Tuple(Vec<AbiToken>),
}

impl AbiToken {
    fn is_dynamic(&self) -> bool {
        match self {
            Self::Uint(_) | Self::Address(_) => false,
            Self::Bytes(_) | Self::Array(_) => true,
            Self::Tuple(components) => components.iter().any(AbiToken::is_dynamic),
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Self::Tuple(components) if !self.is_dynamic() => {
                components.iter().map(AbiToken::head_size).sum()
            }
            _ => 32,
        }
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn encode_function_call(signature: &str, args: &[AbiToken]) -> Bytes {
    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&encode_params(args));
    Bytes::from(out)
}

/// Solidity ABI head/tail layout: dynamic values leave an offset word in the
/// head and append their payload to the tail.
pub fn encode_params(tokens: &[AbiToken]) -> Vec<u8> {
    let head_size: usize = tokens.iter().map(AbiToken::head_size).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&encode_u256_word(U256::from(head_size + tail.len())));
            tail.extend_from_slice(&encode_token(token));
        } else {
            head.extend_from_slice(&encode_token(token));
        }
    }

    head.extend_from_slice(&tail);
    head
}

fn encode_token(token: &AbiToken) -> Vec<u8> {
    match token {
        AbiToken::Uint(value) => encode_u256_word(*value).to_vec(),
        AbiToken::Address(address) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            word.to_vec()
        }
        AbiToken::Bytes(bytes) => encode_dynamic_bytes(bytes),
        AbiToken::Array(items) => {
            let mut out = encode_u256_word(U256::from(items.len())).to_vec();
            out.extend_from_slice(&encode_params(items));
            out
        }
        AbiToken::Tuple(components) => encode_params(components),
    }
}

fn encode_dynamic_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = encode_u256_word(U256::from(bytes.len())).to_vec();
    out.extend_from_slice(bytes);
    let padding = (32 - bytes.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

fn encode_u256_word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

pub fn authorize_calldata(
    public_key: &PublicKey,
    expiry: U256,
    signature: &EcdsaSignature,
) -> Bytes {
    encode_function_call(
        AUTHORIZE_SIGNATURE,
        &[
            AbiToken::Uint(public_key.x),
            AbiToken::Uint(public_key.y),
            AbiToken::Uint(expiry),
            AbiToken::Uint(signature.r),
            AbiToken::Uint(signature.s),
            AbiToken::Uint(U256::from(signature.y_parity)),
        ],
    )
}

pub fn nonce_calldata() -> Bytes {
    encode_function_call(NONCE_SIGNATURE, &[])
}

pub fn keys_calldata(index: u64) -> Bytes {
    encode_function_call(KEYS_SIGNATURE, &[AbiToken::Uint(U256::from(index))])
}

/// Calls are submitted as `(target, value, data)` triples so the value leg
/// that the execution digest commits to actually reaches the contract.
pub fn aggregate_calldata(calls: &[Call], r: U256, s: U256) -> Bytes {
    let items = calls
        .iter()
        .map(|call| {
            AbiToken::Tuple(vec![
                AbiToken::Address(call.to),
                AbiToken::Uint(call.value),
                AbiToken::Bytes(call.data.to_vec()),
            ])
        })
        .collect();
    encode_function_call(
        AGGREGATE_SIGNATURE,
        &[AbiToken::Array(items), AbiToken::Uint(r), AbiToken::Uint(s)],
    )
}

pub fn decode_uint_word(raw: &[u8], index: usize, field: &str) -> Result<U256, String> {
    let start = index * 32;
    let word = raw
        .get(start..start + 32)
        .ok_or_else(|| format!("{field} return data too short: {} bytes", raw.len()))?;
    Ok(U256::from_be_slice(word))
}

pub fn decode_public_key(raw: &[u8]) -> Result<PublicKey, String> {
    Ok(PublicKey {
        x: decode_uint_word(raw, 0, "keys")?,
        y: decode_uint_word(raw, 1, "keys")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64) -> String {
        format!("{value:064x}")
    }

    #[test]
    fn selector_matches_known_erc20_transfer() {
        assert_eq!(
            hex::encode(selector("transfer(address,uint256)")),
            "a9059cbb"
        );
    }

    #[test]
    fn authorize_calldata_is_six_static_words() {
        let calldata = authorize_calldata(
            &PublicKey {
                x: U256::from(1u64),
                y: U256::from(2u64),
            },
            U256::ZERO,
            &EcdsaSignature {
                r: U256::from(3u64),
                s: U256::from(4u64),
                y_parity: 1,
            },
        );
        assert_eq!(calldata.len(), 4 + 6 * 32);
        assert_eq!(&calldata[..4], &selector(AUTHORIZE_SIGNATURE));
        let body = hex::encode(&calldata[4..]);
        let expected = [1u64, 2, 0, 3, 4, 1]
            .iter()
            .map(|value| word(*value))
            .collect::<String>();
        assert_eq!(body, expected);
    }

    #[test]
    fn aggregate_calldata_uses_head_tail_layout() {
        let target = Address::repeat_byte(0x11);
        let calls = vec![Call::new(target)
            .with_value(U256::from(5u64))
            .with_data(vec![0xab, 0xcd])];
        let calldata = aggregate_calldata(&calls, U256::from(9u64), U256::from(10u64));
        let body = hex::encode(&calldata[4..]);
        let words: Vec<&str> = (0..body.len() / 64)
            .map(|index| &body[index * 64..(index + 1) * 64])
            .collect();

        // head: array offset, r, s
        assert_eq!(words[0], word(0x60));
        assert_eq!(words[1], word(9));
        assert_eq!(words[2], word(10));
        // array: length, offset of element 0 relative to the element area
        assert_eq!(words[3], word(1));
        assert_eq!(words[4], word(0x20));
        // tuple: target, value, bytes offset, bytes length, padded payload
        assert_eq!(words[5], format!("{:0>64}", "11".repeat(20)));
        assert_eq!(words[6], word(5));
        assert_eq!(words[7], word(0x60));
        assert_eq!(words[8], word(2));
        assert_eq!(words[9], format!("abcd{}", "0".repeat(60)));
        assert_eq!(words.len(), 10);
    }

    #[test]
    fn nested_offsets_account_for_previous_tails() {
        let calls = vec![
            Call::new(Address::repeat_byte(0x01)).with_data(vec![0u8; 33]),
            Call::new(Address::repeat_byte(0x02)),
        ];
        let calldata = aggregate_calldata(&calls, U256::ZERO, U256::ZERO);
        let body = &calldata[4..];
        // element offsets start after the length word at 0x60
        let first = decode_uint_word(body, 4, "offset").expect("offset word");
        let second = decode_uint_word(body, 5, "offset").expect("offset word");
        assert_eq!(first, U256::from(0x40u64));
        // first tuple: 3 head words + length word + 64 padded bytes
        assert_eq!(second, U256::from(0x40u64 + 3 * 32 + 32 + 64));
    }

    #[test]
    fn decode_public_key_reads_two_words() {
        let mut raw = vec![0u8; 64];
        raw[31] = 7;
        raw[63] = 8;
        let key = decode_public_key(&raw).expect("two words decode");
        assert_eq!(key.x, U256::from(7u64));
        assert_eq!(key.y, U256::from(8u64));
        assert!(decode_public_key(&raw[..40]).is_err());
    }
}
