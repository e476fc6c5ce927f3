use {
	core::{convert::Infallible, fmt, str::FromStr},
	derive_more::{Deref, Display, From, Into},
	rand::{Rng, distr::Alphanumeric},
	serde::{Deserialize, Serialize},
};

/// Uniquely identifies a registry scope by its name.
///
/// Scopes are independent instances of the registry. Two scopes with the same
/// name on different nodes replicate to each other; scopes with different
/// names never interact.
#[derive(
	Debug,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Deref,
	From,
	Into,
	Display,
)]
pub struct ScopeName(String);

impl ScopeName {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	/// Generates a random scope name for testing purposes.
	pub fn random() -> Self {
		Self(format!("scope-{}", random_suffix()))
	}
}

impl From<&str> for ScopeName {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl FromStr for ScopeName {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::new(s))
	}
}

/// Names an ad-hoc set of members within a scope.
///
/// Groups are implicit: a group exists while at least one member is joined to
/// it and vanishes when its last member leaves.
#[derive(
	Debug,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Deref,
	From,
	Into,
	Display,
)]
pub struct GroupName(String);

impl GroupName {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	/// Generates a random group name for testing purposes.
	pub fn random() -> Self {
		Self(format!("group-{}", random_suffix()))
	}
}

impl From<&str> for GroupName {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl FromStr for GroupName {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::new(s))
	}
}

/// Uniquely identifies a node in the cluster.
#[derive(
	Debug,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Deref,
	From,
	Into,
	Display,
)]
pub struct NodeId(String);

impl NodeId {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	/// Generates a random node id for testing purposes.
	pub fn random() -> Self {
		Self(format!("node-{}", random_suffix()))
	}
}

impl From<&str> for NodeId {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl FromStr for NodeId {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::new(s))
	}
}

/// Cluster-unique identity of a member.
///
/// The owning node is part of the identity, so ownership of any member is
/// derivable from its id alone. Ordering is node-major, which keeps all
/// members of one node adjacent in ordered collections.
#[derive(
	Debug,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
)]
pub struct MemberId {
	node: NodeId,
	serial: u64,
}

impl MemberId {
	pub fn new(node: NodeId, serial: u64) -> Self {
		Self { node, serial }
	}

	/// The node that owns this member.
	pub fn node(&self) -> &NodeId {
		&self.node
	}

	pub fn serial(&self) -> u64 {
		self.serial
	}
}

impl fmt::Display for MemberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.node(), self.serial())
	}
}

/// Opaque reference to an active liveness-monitor subscription.
///
/// References are only meaningful on the node that created them and are never
/// sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub struct MonitorRef(pub(crate) u64);

fn random_suffix() -> String {
	rand::rng()
		.sample_iter(&Alphanumeric)
		.take(8)
		.map(char::from)
		.collect()
}
