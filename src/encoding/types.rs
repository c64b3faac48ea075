use core::fmt::Debug;

use rand::{distributions::Standard, prelude::Distribution};
use serde::Serialize;
use uint::construct_uint;

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

macro_rules! bytesN {
    ( $T:ident, $N:literal ) => {
        #[derive(PartialEq, Eq, Copy, Clone, Hash)]
        pub struct $T(pub [u8; $N]);

        impl Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                let mut buf = [0u8; $N];
                rng.fill(&mut buf[..]);
                $T(buf)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl TryFrom<&[u8]> for $T {
            type Error = core::array::TryFromSliceError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(value.try_into()?))
            }
        }

        impl_hex_debug!($T);
    };
}

bytesN!(Bytes4, 4);
bytesN!(Hash, 32);

bytesN!(Signature, 65);
impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig: Signature = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }
}

// Balances and channel ids are 256-bit unsigned integers. The serialization is
// the big-endian 32-byte representation, which is exactly one slot.
construct_uint! {
    pub struct U256(4);
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&u256_to_bytes(*self))
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}

pub(crate) fn u256_to_bytes(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// Parse a big-endian integer of at most 32 bytes.
pub(crate) fn u256_from_bytes(bytes: &[u8]) -> Option<U256> {
    if bytes.len() > 32 {
        None
    } else {
        Some(U256::from_big_endian(bytes))
    }
}

/// Identifies a signer (derived from its public key) or an on-chain account.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);
impl_hex_debug!(Address);

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Addresses are right aligned in their slot, like integers.
        let mut bytes = [0u8; 32];
        bytes[32 - 20..].copy_from_slice(self.0.as_slice());
        serializer.serialize_bytes(&bytes)
    }
}

impl Distribution<Address> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Address {
        Address(rng.gen())
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(value.try_into()?))
    }
}
