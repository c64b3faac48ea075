//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use super::{hash_to_eth_signed_msg_hash, split_eth_signature, Error};
use crate::encoding::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as _},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

pub struct Signer {
    key: SigningKey,
    addr: Address,
}

// Never print the secret key.
impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer").field("addr", &self.addr).finish()
    }
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);

        // Throw away the first byte (the SEC1 tag), which is not part of the
        // public key.
        let hash: [u8; 32] = Keccak256::digest(&point.as_bytes()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

impl Signer {
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_key(SigningKey::random(rng))
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(bytes).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: SigningKey) -> Self {
        let addr = key.verifying_key().into();
        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self
            .key
            .sign_prehash(&hash.0)
            .map_err(|_| Error::SigningFailed)?;

        // The recoverable signature is already laid out as r, s, v. Ethereum
        // expects v to be offset by 27.
        let mut sig_bytes: [u8; 65] = sig
            .as_bytes()
            .try_into()
            .map_err(|_| Error::SigningFailed)?;
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }
}

/// Recover the [Address] of whoever produced `eth_sig` over `msg`.
///
/// `msg` is the hash given to [Signer::sign_eth()], without the `Ethereum
/// Signed Message` prefix.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    let (rs, v) = split_eth_signature(&eth_sig).ok_or(Error::MalformedSignature)?;
    let mut sig_bytes = [0u8; 65];
    sig_bytes[..64].copy_from_slice(&rs);
    sig_bytes[64] = v;

    let sig =
        recoverable::Signature::from_bytes(&sig_bytes).map_err(|_| Error::MalformedSignature)?;

    let verifying_key = sig
        .recover_verifying_key_from_digest_bytes(&hash.0.into())
        .map_err(|_| Error::RecoveryFailed)?;
    Ok(verifying_key.into())
}
