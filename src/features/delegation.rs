//! Raw EOA key handling: address derivation, prehash signing and the
//! delegation authorization tuple that installs the delegate code.
use crate::domain::types::{EcdsaSignature, SignedDelegation};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Encodable, Header};
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

/// Prefix byte of the delegation authorization signing payload.
pub const DELEGATION_MAGIC: u8 = 0x05;

pub fn generate_eoa_key() -> SigningKey {
    SigningKey::random(&mut rand_core::OsRng)
}

pub fn eoa_address(key: &SigningKey) -> Result<Address, String> {
    let uncompressed = key.verifying_key().to_encoded_point(false);
    let bytes = uncompressed.as_bytes();
    if bytes.len() != 65 || bytes.first().copied() != Some(0x04) {
        return Err("unexpected uncompressed public key format".to_string());
    }

    let digest = Keccak256::digest(&bytes[1..]);
    Ok(Address::from_slice(&digest[12..32]))
}

/// Sign a 32-byte digest directly, without any message prefix.
pub fn sign_prehash(key: &SigningKey, digest: &B256) -> Result<EcdsaSignature, String> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|error| format!("eoa prehash signing failed: {error}"))?;
    let compact = signature.to_bytes();
    Ok(EcdsaSignature {
        r: U256::from_be_slice(&compact[..32]),
        s: U256::from_be_slice(&compact[32..]),
        y_parity: u8::from(recovery_id.is_y_odd()),
    })
}

#[derive(Clone, Debug)]
struct DelegationTuple {
    chain_id: u64,
    delegate: Address,
    nonce: u64,
}

impl DelegationTuple {
    fn payload_length(&self) -> usize {
        self.chain_id.length() + self.delegate.length() + self.nonce.length()
    }
}

impl Encodable for DelegationTuple {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.chain_id.encode(out);
        self.delegate.encode(out);
        self.nonce.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + length_of_length(payload_length)
    }
}

pub fn delegation_signing_hash(chain_id: u64, delegate: Address, nonce: u64) -> B256 {
    let payload = alloy_rlp::encode(DelegationTuple {
        chain_id,
        delegate,
        nonce,
    });
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(DELEGATION_MAGIC);
    out.extend_from_slice(&payload);
    keccak256(&out)
}

pub fn sign_delegation(
    key: &SigningKey,
    chain_id: u64,
    delegate: Address,
    nonce: u64,
) -> Result<SignedDelegation, String> {
    let hash = delegation_signing_hash(chain_id, delegate, nonce);
    let signature = sign_prehash(key, &hash)?;
    Ok(SignedDelegation {
        chain_id,
        delegate,
        nonce,
        y_parity: signature.y_parity,
        r: signature.r,
        s: signature.s,
    })
}
