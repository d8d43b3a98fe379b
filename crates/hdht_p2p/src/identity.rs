//! Node signing identity and signed hold receipts.

use crate::types::{HdhtP2pError, HdhtP2pResult};
use ed25519_dalek::{Signer, Verifier};
use hdht_types::prelude::*;
use serde::{Deserialize, Serialize};

/// A node's ed25519 signing key. The node's [`PeerId`] is the hash of the
/// public half.
#[derive(Clone)]
pub struct AgentKey {
    signing: ed25519_dalek::SigningKey,
    id: PeerId,
}

impl std::fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKey").field("id", &self.id).finish()
    }
}

impl AgentKey {
    /// Generate a fresh key from the OS rng.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self::from_signing_key(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Deterministic key from a 32 byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(signing: ed25519_dalek::SigningKey) -> Self {
        let id = PeerId::with_data(signing.verifying_key().as_bytes());
        Self { signing, id }
    }

    /// This node's id.
    pub fn peer_id(&self) -> &PeerId {
        &self.id
    }

    /// The raw public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign arbitrary bytes.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing.sign(data).to_bytes().to_vec()
    }
}

/// Whether a node accepted a change it was asked to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldCode {
    /// Validated and stored.
    Ok,
    /// Failed validation.
    Rejected,
}

/// A holder's signed statement that it processed a change message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The outcome.
    pub code: HoldCode,
    /// The holder's public key.
    #[serde(with = "serde_bytes")]
    pub signer: Vec<u8>,
    /// Signature over the encoded `(message, code)`.
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl Receipt {
    fn signed_bytes(msg: &Message, code: HoldCode) -> SerializationResult<Vec<u8>> {
        encode(&(msg, code))
    }

    /// Sign a receipt for `msg`.
    pub fn sign(key: &AgentKey, msg: &Message, code: HoldCode) -> HdhtP2pResult<Self> {
        let data = Self::signed_bytes(msg, code)?;
        Ok(Self {
            code,
            signer: key.public_key().to_vec(),
            signature: key.sign(&data),
        })
    }

    /// The id of the node that signed this receipt.
    pub fn signer_id(&self) -> PeerId {
        PeerId::with_data(&self.signer)
    }

    /// Check the receipt was signed over `msg` by the node `holder`.
    pub fn verify(&self, msg: &Message, holder: &PeerId) -> HdhtP2pResult<()> {
        if &self.signer_id() != holder {
            return Err(format!("receipt signed by {} not {}", self.signer_id(), holder).into());
        }
        let signer: [u8; 32] = self
            .signer
            .as_slice()
            .try_into()
            .map_err(|_| HdhtP2pError::from("bad receipt signer length"))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&signer).map_err(HdhtP2pError::other)?;
        let signature =
            ed25519_dalek::Signature::from_slice(&self.signature).map_err(HdhtP2pError::other)?;
        key.verify(&Self::signed_bytes(msg, self.code)?, &signature)
            .map_err(HdhtP2pError::other)
    }
}
