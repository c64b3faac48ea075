use super::{to_writer, types::Hash, Error, Writer};

use serde::Serialize;
use sha3::{Digest, Keccak256};

/// Feeds slots straight into the hasher.
struct Hasher(Keccak256);

impl Writer for Hasher {
    fn write(&mut self, slot: &[u8]) {
        self.0.update(slot);
    }
}

/// Keccak256 over the canonical encoding, without materializing the bytes.
pub fn to_hash<T>(value: &T) -> Result<Hash, Error>
where
    T: Serialize + ?Sized,
{
    let mut hasher = Hasher(Keccak256::new());
    to_writer(value, &mut hasher)?;
    Ok(Hash(hasher.0.finalize().into()))
}
