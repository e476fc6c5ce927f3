use {
	crate::primitives::encoding,
	bytes::Bytes,
	core::fmt,
	serde::{Deserialize, Serialize, de::DeserializeOwned},
};

/// Opaque per-membership metadata.
///
/// Every group membership carries a metadata value chosen by the caller at
/// join time. The registry never interprets it; it only stores, replicates
/// and compares it. Two joins with byte-identical metadata are the same
/// membership, a join with different metadata is an update.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta(Bytes);

impl Meta {
	/// Encodes any serializable value as membership metadata.
	pub fn of<T: Serialize>(value: &T) -> Self {
		Self(encoding::serialize(value))
	}

	/// Metadata with no payload.
	pub fn none() -> Self {
		Self(Bytes::new())
	}

	/// Decodes the metadata back into a typed value.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, postcard::Error> {
		encoding::deserialize(&self.0)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Bytes> for Meta {
	fn from(bytes: Bytes) -> Self {
		Self(bytes)
	}
}

impl From<Vec<u8>> for Meta {
	fn from(bytes: Vec<u8>) -> Self {
		Self(bytes.into())
	}
}

impl fmt::Debug for Meta {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Meta({} bytes)", self.0.len())
	}
}
