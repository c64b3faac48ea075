use super::verify;
use crate::encoding::{
    self,
    types::{Address, Hash, Signature, U256},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy)]
struct Payload {
    id: U256,
    amount: U256,
    seq: u64,
}

fn data() -> Payload {
    Payload {
        id: 130.into(),
        amount: 100_000_000u64.into(),
        seq: 1,
    }
}

fn msg() -> Hash {
    encoding::to_hash(&data()).unwrap()
}

macro_rules! make_a_to_b {
    ($name:ident, $signer:ty, $recover:path) => {
        #[test]
        fn $name() {
            // Do not use that on any real device, this is just for testing.
            let mut rng = StdRng::seed_from_u64(0);
            let signer = <$signer>::new(&mut rng);
            let sig = signer.sign_eth(msg()).unwrap();

            let address = $recover(msg(), sig).unwrap();
            assert_eq!(address, signer.address());
        }
    };
}

macro_rules! make_deterministic {
    ($name:ident, $signer:ty) => {
        #[test]
        fn $name() {
            // Same key + same message => same signature (RFC 6979 nonces).
            let secret = [0x24u8; 32];
            let a = <$signer>::from_secret_bytes(&secret).unwrap();
            let b = <$signer>::from_secret_bytes(&secret).unwrap();
            assert_eq!(a.address(), b.address());
            assert_eq!(a.sign_eth(msg()).unwrap(), b.sign_eth(msg()).unwrap());
        }
    };
}

#[cfg(feature = "k256")]
make_a_to_b!(k256_to_k256, super::k256::Signer, super::k256::recover_signer);
#[cfg(feature = "k256")]
make_deterministic!(k256_deterministic, super::k256::Signer);

#[cfg(feature = "secp256k1")]
make_a_to_b!(
    secp256k1_to_secp256k1,
    super::secp256k1::Signer,
    super::secp256k1::recover_signer
);
#[cfg(feature = "secp256k1")]
make_deterministic!(secp256k1_deterministic, super::secp256k1::Signer);

#[cfg(all(feature = "secp256k1", feature = "k256"))]
make_a_to_b!(
    secp256k1_to_k256,
    super::secp256k1::Signer,
    super::k256::recover_signer
);

#[cfg(all(feature = "secp256k1", feature = "k256"))]
make_a_to_b!(
    k256_to_secp256k1,
    super::k256::Signer,
    super::secp256k1::recover_signer
);

#[cfg(all(feature = "secp256k1", feature = "k256"))]
#[test]
fn backends_agree_on_address() {
    let secret = [0x42u8; 32];
    let a = super::k256::Signer::from_secret_bytes(&secret).unwrap();
    let b = super::secp256k1::Signer::from_secret_bytes(&secret).unwrap();
    assert_eq!(a.address(), b.address());
}

#[test]
fn verify_accepts_matching_key() {
    let signer = super::Signer::new(&mut StdRng::seed_from_u64(1));
    let sig = signer.sign(&data()).unwrap();
    assert!(verify(&data(), sig, signer.address()));
}

#[test]
fn verify_rejects_other_key() {
    let mut rng = StdRng::seed_from_u64(2);
    let signer = super::Signer::new(&mut rng);
    let other = super::Signer::new(&mut rng);
    let sig = signer.sign(&data()).unwrap();
    assert!(!verify(&data(), sig, other.address()));
}

#[test]
fn verify_rejects_mutated_fields() {
    let signer = super::Signer::new(&mut StdRng::seed_from_u64(3));
    let sig = signer.sign(&data()).unwrap();

    let mut changed = data();
    changed.id = 131.into();
    assert!(!verify(&changed, sig, signer.address()));

    let mut changed = data();
    changed.amount = changed.amount + U256::one();
    assert!(!verify(&changed, sig, signer.address()));

    let mut changed = data();
    changed.seq = 2;
    assert!(!verify(&changed, sig, signer.address()));
}

#[test]
fn verify_fails_closed_on_malformed_signatures() {
    let signer = super::Signer::new(&mut StdRng::seed_from_u64(4));
    let addr: Address = signer.address();

    // v out of range in both directions, must not underflow or panic.
    let mut sig = signer.sign(&data()).unwrap();
    sig.0[64] = 0;
    assert!(!verify(&data(), sig, addr));
    sig.0[64] = 200;
    assert!(!verify(&data(), sig, addr));

    // r = s = 0 is never a valid signature.
    assert!(!verify(&data(), Signature::new(&[0u8; 64], 27), addr));
    assert!(!verify(&data(), Signature::default(), addr));

    // Values that cannot be encoded are never verified.
    assert!(!verify(&"not encodable", sig, addr));
}
