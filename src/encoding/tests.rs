use super::*;
use serde::Serialize;
use sha3::{Digest, Keccak256};

use types::{Address, Bytes4, Signature, U256};

/// Compare the encoding of `value` with `expected`: one slot per line as 64
/// hex digits, optionally followed by a comment.
fn serialize_and_compare<T>(value: &T, expected: &str)
where
    T: Serialize,
{
    let expected: Vec<&str> = expected
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    let bytes = to_bytes(value).unwrap();
    assert_eq!(bytes.len() % 32, 0, "encoding is not slot aligned");

    let actual: Vec<String> = bytes.chunks(32).map(hex::encode).collect();
    assert_eq!(actual, expected);
}

#[test]
fn u64() {
    let d: u64 = 0x1337000012341111;

    let expected = "
    0000000000000000000000000000000000000000000000001337000012341111
    ";

    serialize_and_compare(&d, expected)
}

#[test]
fn tuple_of_bool_and_u128() {
    let d = (true, u128::MAX);

    let expected = "
    0000000000000000000000000000000000000000000000000000000000000001 // true
    00000000000000000000000000000000ffffffffffffffffffffffffffffffff // u128::MAX
    ";

    serialize_and_compare(&d, expected)
}

#[derive(Serialize)]
struct Inner {
    id: U256,
    owner: Address,
}

#[derive(Serialize)]
struct Outer {
    tag: Bytes4,
    inner: Inner,
    flag: bool,
    seq: u64,
}

#[test]
fn nested_struct_is_flat() {
    let d = Outer {
        tag: Bytes4([0xa1, 0xa2, 0xa3, 0xa4]),
        inner: Inner {
            id: U256::from(0x1337),
            owner: Address([0x11; 20]),
        },
        flag: true,
        seq: 7,
    };

    let expected = "
    a1a2a3a400000000000000000000000000000000000000000000000000000000 // tag
    0000000000000000000000000000000000000000000000000000000000001337 // inner.id
    0000000000000000000000001111111111111111111111111111111111111111 // inner.owner
    0000000000000000000000000000000000000000000000000000000000000001 // flag
    0000000000000000000000000000000000000000000000000000000000000007 // seq
    ";

    serialize_and_compare(&d, expected)
}

#[test]
fn long_bytes_are_padded() {
    let mut sig = Signature([0u8; 65]);
    sig.0[0] = 0x01;
    sig.0[64] = 0x1b;

    let expected = "
    0100000000000000000000000000000000000000000000000000000000000000
    0000000000000000000000000000000000000000000000000000000000000000
    1b00000000000000000000000000000000000000000000000000000000000000
    ";

    serialize_and_compare(&sig, expected)
}

#[test]
fn dynamic_types_are_rejected() {
    assert_eq!(
        to_bytes(&"abc").unwrap_err(),
        Error::TypeNotRepresentable("str")
    );
    assert_eq!(
        to_bytes(&Some(1u8)).unwrap_err(),
        Error::TypeNotRepresentable("Option")
    );
    assert_eq!(
        to_bytes(&vec![1u8, 2]).unwrap_err(),
        Error::TypeNotRepresentable("dynamic sequence")
    );
    assert_eq!(
        to_bytes(&-2i64).unwrap_err(),
        Error::TypeNotRepresentable("i64")
    );
    assert_eq!(
        to_bytes(&1.5f64).unwrap_err(),
        Error::TypeNotRepresentable("f64")
    );
}

#[test]
fn hash_matches_keccak_of_bytes() {
    let d = Inner {
        id: U256::from(130),
        owner: Address([0xab; 20]),
    };
    let bytes = to_bytes(&d).unwrap();
    assert_eq!(bytes.len(), 64);

    let expected: [u8; 32] = Keccak256::digest(&bytes).into();
    assert_eq!(to_hash(&d).unwrap().0, expected);
}
