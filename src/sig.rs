//! Handles the creation and verification of (Ethereum-style) Signatures.
//!
//! Values are signed over the keccak256 hash of their canonical encoding,
//! wrapped in the `\x19Ethereum Signed Message:\n32` prefix. Signatures are
//! 65 bytes (`r`, `s`, `v + 27`) so the signer's [Address] can be recovered
//! from them.

use crate::encoding::{
    self,
    types::{Address, Hash, Signature},
};
use serde::Serialize;
use sha3::{Digest, Keccak256};

#[cfg(not(any(feature = "k256", feature = "secp256k1")))]
compile_error!("enable at least one signature backend: `k256` or `secp256k1`");

#[cfg(feature = "k256")]
pub mod k256;
#[cfg(feature = "k256")]
pub use self::k256::{recover_signer, Signer};

#[cfg(feature = "secp256k1")]
pub mod secp256k1;
#[cfg(all(feature = "secp256k1", not(feature = "k256")))]
pub use self::secp256k1::{recover_signer, Signer};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("could not recover the signer from the signature")]
    RecoveryFailed,
    #[error("signing failed")]
    SigningFailed,
    #[error(transparent)]
    Encoding(#[from] encoding::Error),
}

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Split the `v` byte off a signature and undo the +27 offset.
///
/// Returns `None` for any `v` that is not 27 or 28, so garbage never reaches
/// the curve libraries.
fn split_eth_signature(sig: &Signature) -> Option<([u8; 64], u8)> {
    let v = sig.0[64].checked_sub(27).filter(|v| *v <= 1)?;
    let mut rs = [0u8; 64];
    rs.copy_from_slice(&sig.0[..64]);
    Some((rs, v))
}

impl Signer {
    /// Sign the canonical encoding of `value`.
    pub fn sign<T>(&self, value: &T) -> Result<Signature, Error>
    where
        T: Serialize + ?Sized,
    {
        let hash = encoding::to_hash(value)?;
        self.sign_eth(hash)
    }
}

/// Check that `sig` is a signature by `signer` over the canonical encoding of
/// `value`.
///
/// Fails closed: encoding errors, malformed signatures and signatures from
/// any other key all return `false`.
pub fn verify<T>(value: &T, sig: Signature, signer: Address) -> bool
where
    T: Serialize + ?Sized,
{
    let hash = match encoding::to_hash(value) {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    matches!(recover_signer(hash, sig), Ok(recovered) if recovered == signer)
}
