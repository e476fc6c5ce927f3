//! Centralized encoding and decoding of opaque payloads.
//!
//! Everything the registry treats as opaque bytes (member metadata, publish
//! payloads, call payloads) goes through these helpers so the whole crate
//! agrees on a single format. Currently uses `postcard`.

use {
	bytes::Bytes,
	serde::{Serialize, de::DeserializeOwned},
};

pub fn serialize<T: Serialize>(value: &T) -> Bytes {
	postcard::to_allocvec(value)
		.expect("serialization should never fail")
		.into()
}

pub fn deserialize<T: DeserializeOwned>(
	bytes: impl AsRef<[u8]>,
) -> Result<T, postcard::Error> {
	postcard::from_bytes(bytes.as_ref())
}
