//! Credential binding.
//!
//! The account address is stored as the credential's user handle at creation
//! time, so the authenticator itself remembers which EOA a credential belongs
//! to and no external index is needed to recover it.
use crate::domain::types::{CredentialKey, PublicKey};
use crate::error::{ControllerError, ControllerResult};
use crate::features::authenticator::{
    Authenticator, CredentialAssertion, CredentialRequest, RawAssertion, SignRequest,
};
use crate::features::cancellation::CancellationToken;
use alloy_primitives::{Address, U256};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;

const ADDRESS_LEN: usize = 20;
const COMPACT_SIGNATURE_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedCredential {
    pub id: String,
    pub assertion: RawAssertion,
}

pub async fn create_credential(
    authenticator: &dyn Authenticator,
    address: Address,
    label: &str,
    cancel: &CancellationToken,
) -> ControllerResult<CredentialKey> {
    cancel
        .ensure_active("credential creation")
        .map_err(ControllerError::CredentialCreationFailed)?;
    let request = CredentialRequest {
        label: label.to_string(),
        user_handle: address.to_vec(),
        challenge: Vec::new(),
    };
    let raw = authenticator
        .create_credential(&request)
        .await
        .map_err(ControllerError::CredentialCreationFailed)?;
    cancel
        .ensure_active("credential binding")
        .map_err(ControllerError::CredentialCreationFailed)?;

    if raw.id.trim().is_empty() {
        return Err(ControllerError::CredentialCreationFailed(
            "authenticator returned an empty credential id".to_string(),
        ));
    }
    let public_key =
        parse_public_key(&raw.public_key).map_err(ControllerError::CredentialCreationFailed)?;
    Ok(CredentialKey {
        id: raw.id,
        public_key,
    })
}

pub async fn load_credential(
    authenticator: &dyn Authenticator,
    cancel: &CancellationToken,
) -> ControllerResult<LoadedCredential> {
    cancel
        .ensure_active("credential lookup")
        .map_err(ControllerError::CredentialNotFound)?;
    let assertion = authenticator
        .sign(&SignRequest {
            challenge: Vec::new(),
            credential_id: None,
        })
        .await
        .map_err(ControllerError::CredentialNotFound)?;
    cancel
        .ensure_active("credential lookup completion")
        .map_err(ControllerError::CredentialNotFound)?;

    if assertion.credential_id.trim().is_empty() {
        return Err(ControllerError::CredentialNotFound(
            "authenticator returned an empty credential id".to_string(),
        ));
    }
    Ok(LoadedCredential {
        id: assertion.credential_id,
        assertion: assertion.raw,
    })
}

pub fn extract_address_from_assertion(assertion: &RawAssertion) -> ControllerResult<Address> {
    let handle = assertion.user_handle.as_deref().ok_or_else(|| {
        ControllerError::MalformedAssertion("assertion has no user handle".to_string())
    })?;
    if handle.len() != ADDRESS_LEN {
        return Err(ControllerError::MalformedAssertion(format!(
            "user handle must be {ADDRESS_LEN} bytes, got {}",
            handle.len()
        )));
    }
    Ok(Address::from_slice(handle))
}

/// Request a credential signature over `digest`.
pub async fn sign_with_credential(
    authenticator: &dyn Authenticator,
    credential_id: &str,
    digest: &[u8],
    cancel: &CancellationToken,
) -> Result<CredentialAssertion, String> {
    cancel.ensure_active("credential signature")?;
    let assertion = authenticator
        .sign(&SignRequest {
            challenge: digest.to_vec(),
            credential_id: Some(credential_id.to_string()),
        })
        .await?;
    if cancel.is_cancelled() {
        return Err("cancelled while awaiting credential signature".to_string());
    }
    if assertion.credential_id != credential_id {
        return Err(format!(
            "authenticator answered with credential {} instead of {credential_id}",
            assertion.credential_id
        ));
    }
    Ok(assertion)
}

/// Accepts a SEC1 point (compressed or uncompressed) or a DER
/// SubjectPublicKeyInfo and returns its affine coordinates.
pub fn parse_public_key(raw: &[u8]) -> Result<PublicKey, String> {
    let key = match p256::PublicKey::from_sec1_bytes(raw) {
        Ok(key) => key,
        Err(_) => p256::PublicKey::from_public_key_der(raw).map_err(|error| {
            format!(
                "public key is neither a SEC1 point nor SPKI DER ({} bytes): {error}",
                raw.len()
            )
        })?,
    };
    let point = key.to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| "public key point has no x coordinate".to_string())?;
    let y = point
        .y()
        .ok_or_else(|| "public key point has no y coordinate".to_string())?;
    Ok(PublicKey {
        x: U256::from_be_slice(x),
        y: U256::from_be_slice(y),
    })
}

/// Split a credential signature into `(r, s)`.
///
/// 64 raw bytes are read as `r ‖ s`, both big-endian. DER-encoded ECDSA
/// signatures are normalized to the same form first.
pub fn parse_credential_signature(raw: &[u8]) -> Result<(U256, U256), String> {
    if raw.len() == COMPACT_SIGNATURE_LEN {
        return Ok((
            U256::from_be_slice(&raw[..32]),
            U256::from_be_slice(&raw[32..]),
        ));
    }

    let signature = p256::ecdsa::Signature::from_der(raw).map_err(|error| {
        format!(
            "signature must be 64 bytes (r||s) or DER encoded, got {} bytes: {error}",
            raw.len()
        )
    })?;
    let compact = signature.to_bytes();
    Ok((
        U256::from_be_slice(&compact[..32]),
        U256::from_be_slice(&compact[32..]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::authenticator::{RawCredential, SoftwareAuthenticator};
    use crate::test_support::block_on_with_spin;
    use async_trait::async_trait;
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::EncodePublicKey;
    use std::cell::Cell;

    struct RefusingAuthenticator {
        calls: Cell<u32>,
    }

    #[async_trait(?Send)]
    impl Authenticator for RefusingAuthenticator {
        async fn create_credential(
            &self,
            _request: &CredentialRequest,
        ) -> Result<RawCredential, String> {
            self.calls.set(self.calls.get() + 1);
            Err("NotAllowedError: The operation either timed out or was not allowed".to_string())
        }

        async fn sign(&self, _request: &SignRequest) -> Result<CredentialAssertion, String> {
            self.calls.set(self.calls.get() + 1);
            Err("NotAllowedError: no matching credential".to_string())
        }
    }

    struct FixedKeyAuthenticator {
        public_key: Vec<u8>,
    }

    #[async_trait(?Send)]
    impl Authenticator for FixedKeyAuthenticator {
        async fn create_credential(
            &self,
            _request: &CredentialRequest,
        ) -> Result<RawCredential, String> {
            Ok(RawCredential {
                id: "fixed".to_string(),
                public_key: self.public_key.clone(),
            })
        }

        async fn sign(&self, _request: &SignRequest) -> Result<CredentialAssertion, String> {
            Err("unused".to_string())
        }
    }

    fn refusing() -> RefusingAuthenticator {
        RefusingAuthenticator {
            calls: Cell::new(0),
        }
    }

    #[test]
    fn create_credential_binds_address_as_user_handle() {
        let authenticator = SoftwareAuthenticator::new();
        let address = Address::repeat_byte(0x3c);
        let key = block_on_with_spin(create_credential(
            &authenticator,
            address,
            "Delegated Account",
            &CancellationToken::new(),
        ))
        .expect("credential should be created");
        assert!(!key.public_key.is_zero());

        let loaded = block_on_with_spin(load_credential(&authenticator, &CancellationToken::new()))
            .expect("credential should load");
        assert_eq!(loaded.id, key.id);
        assert_eq!(
            extract_address_from_assertion(&loaded.assertion).expect("address"),
            address
        );
    }

    #[test]
    fn refusal_surfaces_reason_verbatim() {
        let authenticator = refusing();
        let error = block_on_with_spin(create_credential(
            &authenticator,
            Address::ZERO,
            "label",
            &CancellationToken::new(),
        ))
        .expect_err("refusal must fail");
        assert_eq!(
            error,
            ControllerError::CredentialCreationFailed(
                "NotAllowedError: The operation either timed out or was not allowed".to_string()
            )
        );

        let error = block_on_with_spin(load_credential(&authenticator, &CancellationToken::new()))
            .expect_err("lookup must fail");
        assert!(matches!(error, ControllerError::CredentialNotFound(reason) if reason.contains("no matching credential")));
    }

    #[test]
    fn cancelled_token_prevents_authenticator_prompt() {
        let authenticator = refusing();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = block_on_with_spin(create_credential(
            &authenticator,
            Address::ZERO,
            "label",
            &cancel,
        ))
        .expect_err("cancelled operation must fail");
        assert_eq!(
            error,
            ControllerError::CredentialCreationFailed(
                "cancelled before credential creation".to_string()
            )
        );

        let error = block_on_with_spin(load_credential(&authenticator, &cancel))
            .expect_err("cancelled lookup must fail");
        assert!(matches!(error, ControllerError::CredentialNotFound(_)));
        assert_eq!(authenticator.calls.get(), 0);
    }

    #[test]
    fn unusable_public_key_fails_creation() {
        let authenticator = FixedKeyAuthenticator {
            public_key: vec![0x04; 12],
        };
        let error = block_on_with_spin(create_credential(
            &authenticator,
            Address::ZERO,
            "label",
            &CancellationToken::new(),
        ))
        .expect_err("garbage key must be rejected");
        assert!(matches!(error, ControllerError::CredentialCreationFailed(_)));
    }

    #[test]
    fn public_key_parses_sec1_and_spki_forms_identically() {
        let key = SigningKey::random(&mut rand_core::OsRng);
        let verifying = key.verifying_key();
        let uncompressed = verifying.to_encoded_point(false);
        let compressed = verifying.to_encoded_point(true);
        let spki = verifying
            .to_public_key_der()
            .expect("spki encoding")
            .as_bytes()
            .to_vec();

        let from_uncompressed = parse_public_key(uncompressed.as_bytes()).expect("sec1");
        let from_compressed = parse_public_key(compressed.as_bytes()).expect("compressed");
        let from_spki = parse_public_key(&spki).expect("spki");
        assert_eq!(from_uncompressed, from_compressed);
        assert_eq!(from_uncompressed, from_spki);
        assert_eq!(
            from_uncompressed.x,
            U256::from_be_slice(&uncompressed.as_bytes()[1..33])
        );
    }

    #[test]
    fn user_handle_must_be_an_address() {
        let missing = RawAssertion::default();
        assert!(matches!(
            extract_address_from_assertion(&missing),
            Err(ControllerError::MalformedAssertion(_))
        ));

        let short = RawAssertion {
            user_handle: Some(vec![0x01; 19]),
            ..RawAssertion::default()
        };
        assert!(matches!(
            extract_address_from_assertion(&short),
            Err(ControllerError::MalformedAssertion(_))
        ));

        let long = RawAssertion {
            user_handle: Some(vec![0x01; 32]),
            ..RawAssertion::default()
        };
        assert!(extract_address_from_assertion(&long).is_err());
    }

    #[test]
    fn compact_signature_splits_into_big_endian_halves() {
        let mut raw = [0u8; 64];
        raw[31] = 0x01;
        raw[63] = 0x02;
        let (r, s) = parse_credential_signature(&raw).expect("64 bytes parse");
        assert_eq!(r, U256::from(1u64));
        assert_eq!(s, U256::from(2u64));

        let filled = [[0x01u8; 32], [0x02u8; 32]].concat();
        let (r, s) = parse_credential_signature(&filled).expect("64 bytes parse");
        assert_eq!(r, U256::from_be_slice(&[0x01; 32]));
        assert_eq!(s, U256::from_be_slice(&[0x02; 32]));
    }

    #[test]
    fn der_signature_normalizes_to_compact_halves() {
        let mut compact = [0u8; 64];
        compact[31] = 0x07;
        compact[63] = 0x09;
        let signature = p256::ecdsa::Signature::from_slice(&compact).expect("valid scalars");
        let der = signature.to_der();
        let (r, s) = parse_credential_signature(der.as_bytes()).expect("der parses");
        assert_eq!(r, U256::from(7u64));
        assert_eq!(s, U256::from(9u64));

        assert!(parse_credential_signature(&[0u8; 63]).is_err());
    }
}
