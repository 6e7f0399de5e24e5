//! Platform authenticator port.
//!
//! `SoftwareAuthenticator` keeps P-256 credentials in process memory. It never
//! asks for user presence and is meant for tests and local development.
use alloy_primitives::keccak256;
use async_trait::async_trait;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use rand_core::{OsRng, RngCore};
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRequest {
    /// User-visible name shown by the authenticator prompt.
    pub label: String,
    /// Opaque handle stored with the credential and echoed on every assertion.
    pub user_handle: Vec<u8>,
    pub challenge: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCredential {
    pub id: String,
    /// SEC1 point or DER SubjectPublicKeyInfo, as the authenticator reports it.
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub challenge: Vec<u8>,
    pub credential_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawAssertion {
    pub user_handle: Option<Vec<u8>>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialAssertion {
    pub credential_id: String,
    pub signature: Vec<u8>,
    pub raw: RawAssertion,
}

#[async_trait(?Send)]
pub trait Authenticator {
    async fn create_credential(&self, request: &CredentialRequest)
        -> Result<RawCredential, String>;

    async fn sign(&self, request: &SignRequest) -> Result<CredentialAssertion, String>;
}

struct StoredCredential {
    key: SigningKey,
    user_handle: Vec<u8>,
}

pub struct SoftwareAuthenticator {
    credentials: RefCell<BTreeMap<String, StoredCredential>>,
    last_created: RefCell<Option<String>>,
    der_signatures: bool,
}

impl SoftwareAuthenticator {
    pub fn new() -> Self {
        Self {
            credentials: RefCell::new(BTreeMap::new()),
            last_created: RefCell::new(None),
            der_signatures: false,
        }
    }

    /// Emit ASN.1 DER signatures, the way browser authenticators do.
    pub fn with_der_signatures(mut self) -> Self {
        self.der_signatures = true;
        self
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.borrow().len()
    }
}

impl Default for SoftwareAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Authenticator for SoftwareAuthenticator {
    async fn create_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<RawCredential, String> {
        if request.user_handle.is_empty() {
            return Err("user handle cannot be empty".to_string());
        }

        let key = SigningKey::random(&mut OsRng);
        let public_key = key.verifying_key().to_encoded_point(false).as_bytes().to_vec();

        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);
        let id = hex::encode(id_bytes);

        self.credentials.borrow_mut().insert(
            id.clone(),
            StoredCredential {
                key,
                user_handle: request.user_handle.clone(),
            },
        );
        *self.last_created.borrow_mut() = Some(id.clone());

        Ok(RawCredential { id, public_key })
    }

    /// Challenges of exactly 32 bytes are signed as-is; anything else is
    /// hashed with keccak-256 first.
    async fn sign(&self, request: &SignRequest) -> Result<CredentialAssertion, String> {
        let credential_id = match request.credential_id.clone() {
            Some(id) => id,
            None => self
                .last_created
                .borrow()
                .clone()
                .ok_or_else(|| "no credential available for this origin".to_string())?,
        };

        let credentials = self.credentials.borrow();
        let stored = credentials
            .get(&credential_id)
            .ok_or_else(|| format!("unknown credential {credential_id}"))?;

        let prehash = if request.challenge.len() == 32 {
            request.challenge.clone()
        } else {
            keccak256(&request.challenge).to_vec()
        };
        let signature: Signature = stored
            .key
            .sign_prehash(&prehash)
            .map_err(|error| format!("software authenticator signing failed: {error}"))?;
        let signature = if self.der_signatures {
            signature.to_der().as_bytes().to_vec()
        } else {
            signature.to_bytes().to_vec()
        };

        Ok(CredentialAssertion {
            credential_id,
            signature,
            raw: RawAssertion {
                user_handle: Some(stored.user_handle.clone()),
                authenticator_data: Vec::new(),
                client_data_json: Vec::new(),
            },
        })
    }
}
