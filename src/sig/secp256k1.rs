//! Signer using libsecp256k1 through the `secp256k1` crate.

use super::{hash_to_eth_signed_msg_hash, split_eth_signature, Error};
use crate::encoding::types::{Address, Hash, Signature};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha3::{Digest, Keccak256};

pub struct Signer {
    secp: Secp256k1<All>,
    key: SecretKey,
    addr: Address,
}

impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer").field("addr", &self.addr).finish()
    }
}

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        // Throw away the first byte, which is not part of the public key. It is
        // added by serialize_uncompressed due to the encoding used.
        let hash: [u8; 32] = Keccak256::digest(&pk.serialize_uncompressed()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

impl Signer {
    pub fn new<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_key(SecretKey::new(rng))
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let key = SecretKey::from_slice(bytes).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let addr = PublicKey::from_secret_key(&secp, &key).into();
        Self { secp, key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using a Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);
        let message = Message::from_slice(&hash.0).map_err(|_| Error::SigningFailed)?;

        // The smart contract must be able to recover the address, which needs
        // the recovery id (v).
        let sig = self.secp.sign_ecdsa_recoverable(&message, &self.key);
        let (v, rs) = sig.serialize_compact();

        // libsecp256k1 only produces low-s (EIP-2 canonical) signatures.
        debug_assert!(rs[32] & 0x80 == 0);

        let v: u8 = 27 + v.to_i32() as u8;
        Ok(Signature::new(&rs, v))
    }
}

/// Recover the [Address] of whoever produced `eth_sig` over `msg`.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);
    let secp = Secp256k1::verification_only();

    let (rs, v) = split_eth_signature(&eth_sig).ok_or(Error::MalformedSignature)?;
    let recid = RecoveryId::from_i32(v.into()).map_err(|_| Error::MalformedSignature)?;
    let sig =
        RecoverableSignature::from_compact(&rs, recid).map_err(|_| Error::MalformedSignature)?;
    let message = Message::from_slice(&hash.0).map_err(|_| Error::RecoveryFailed)?;

    let pk = secp
        .recover_ecdsa(&message, &sig)
        .map_err(|_| Error::RecoveryFailed)?;
    Ok(pk.into())
}
