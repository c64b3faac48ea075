//! Error type and Return values used by the Serialization.

use serde::ser;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The value contains a type that has no fixed-size slot representation.
    ///
    /// For example floats, signed integers, strings, options and sequences.
    /// States and configs only contain unsigned integers, fixed-size byte
    /// arrays and nested structs of those.
    #[error("type is not representable in the canonical encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Raised through [ser::Error::custom] by a `Serialize` implementation.
    #[error("custom serialization error: {0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;
