//! Transaction signing.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use k256::{
    ecdsa::SigningKey,
    elliptic_curve::sec1::ToEncodedPoint,
};
use pisa_primitives::{SignatureParts, TransactionFields};
use thiserror::Error;

/// Errors raised while producing a signed transaction.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The key material is not a valid secp256k1 scalar.
    #[error("invalid signing key")]
    InvalidKey,

    /// The ECDSA signing operation failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Produces chain-ready signed transactions for one address.
pub trait Signer: Send + Sync + 'static {
    /// Address the signatures recover to.
    fn address(&self) -> Address;

    /// Chain this signer is bound to.
    fn chain_id(&self) -> u64;

    /// Signs the fields into a raw transaction ready for submission.
    fn sign_transaction(&self, fields: &TransactionFields) -> Result<Bytes, SignerError>;
}

/// In-process signer over a raw secp256k1 key.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
    chain_id: u64,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Wraps a signing key for the given chain.
    pub fn new(key: SigningKey, chain_id: u64) -> Self {
        let address = address_of(&key);
        Self {
            key,
            address,
            chain_id,
        }
    }

    /// Parses a raw 32-byte private key.
    pub fn from_bytes(bytes: &[u8; 32], chain_id: u64) -> Result<Self, SignerError> {
        let key = SigningKey::from_bytes(bytes.into()).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(key, chain_id))
    }
}

fn address_of(key: &SigningKey) -> Address {
    let public = key.verifying_key().to_encoded_point(false);
    let digest = keccak256(&public.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sign_transaction(&self, fields: &TransactionFields) -> Result<Bytes, SignerError> {
        let digest = fields.signing_hash();
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|err| SignerError::Signing(err.to_string()))?;

        let r = U256::from_be_slice(&signature.r().to_bytes());
        let s = U256::from_be_slice(&signature.s().to_bytes());
        let parts =
            SignatureParts::from_recovery(fields.chain_id, recovery_id.to_byte(), r, s);

        Ok(fields.encode_signed(&parts))
    }
}
