//! Text serialization of state values.

mod json;

pub use json::JsonCodec;

use crate::error::CodecError;

/// Converts a state value to a transportable text form and back.
///
/// Implementations must round-trip: `decode(&encode(v)?)? == v`.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    fn decode(&self, text: &str) -> Result<T, CodecError>;
}
