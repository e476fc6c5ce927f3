//! Messages exchanged between scope instances on different nodes.
//!
//! All inter-node traffic for a scope flows through these types: the
//! owner-routed join/leave RPCs, the replication broadcasts, and the
//! full-state snapshot exchange performed when a peer comes up.

use {
	crate::{
		id::{GroupName, NodeId},
		member::Member,
		meta::Meta,
		scope::events::Reason,
	},
	core::fmt,
};

/// The protocol version this node speaks. Carried on every wire message;
/// receivers drop traffic tagged with any other version.
pub const PROTOCOL: &str = "/roster/scope/3";

/// Wire envelope: every request, reply and broadcast travels under a
/// protocol tag so receivers can reject cross-version traffic.
#[derive(Debug, Clone)]
pub struct Tagged<T> {
	pub protocol: String,
	pub message: T,
}

impl<T> Tagged<T> {
	/// Tags a message with the current protocol version.
	pub fn new(message: T) -> Self {
		Self {
			protocol: PROTOCOL.into(),
			message,
		}
	}

	/// `true` if the tag matches the protocol version this node speaks.
	pub fn matches(&self) -> bool {
		self.protocol == PROTOCOL
	}
}

impl<T: fmt::Display> fmt::Display for Tagged<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.protocol, self.message)
	}
}

/// RPCs addressed to the scope instance on a specific node.
#[derive(Debug, Clone)]
pub enum Request {
	/// Routed to the owner of `member`: register the membership there.
	///
	/// `requester` is the node the call originated on; the owner excludes it
	/// from the resulting broadcast because the requester applies the
	/// mutation eagerly from the reply.
	Join {
		requester: NodeId,
		group: GroupName,
		member: Member,
		meta: Meta,
	},

	/// Routed to the owner of `member`: drop the membership there.
	Leave {
		requester: NodeId,
		group: GroupName,
		member: Member,
	},

	/// Full-state exchange on peer-up. Carries every entry owned by `from`;
	/// the reply carries every entry owned by the receiver.
	Snapshot {
		from: NodeId,
		entries: Vec<SyncEntry>,
	},
}

/// Replies to [`Request`]s.
#[derive(Debug, Clone)]
pub enum Reply {
	/// Successful join. Carries what the requester needs for eager apply.
	Joined(JoinOutcome),

	/// Successful leave; `meta` is the metadata the membership held.
	Left { meta: Meta },

	/// The receiver's side of a snapshot exchange.
	Snapshot { entries: Vec<SyncEntry> },

	/// Join refused: the member is not alive on its owner node.
	NotAlive,

	/// Leave refused: no such membership on the owner node.
	NotInGroup,
}

/// What a successful join did on the owner node.
///
/// The assigned timestamp is carried back so the requester's eager local
/// apply writes exactly what the owner wrote, keeping the racing broadcast
/// recognizable as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
	/// First join of this member to this group.
	Joined { stamp: u64 },

	/// Existing membership, new metadata.
	Updated { stamp: u64 },

	/// Existing membership with identical metadata; nothing changed.
	Noop,
}

/// Replication broadcasts fanned out to every peer after a local mutation.
#[derive(Debug, Clone)]
pub enum Broadcast {
	/// A membership was created or updated on its owner node.
	SyncJoin {
		group: GroupName,
		member: Member,
		meta: Meta,
		stamp: u64,
		reason: Reason,
	},

	/// A membership was dropped on its owner node, either explicitly or
	/// because the member died.
	SyncLeave {
		group: GroupName,
		member: Member,
		meta: Meta,
		reason: Reason,
	},
}

impl fmt::Display for Broadcast {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::SyncJoin { group, member, stamp, .. } => {
				write!(f, "sync_join({group}, {member}, t={stamp})")
			}
			Self::SyncLeave { group, member, reason, .. } => {
				write!(f, "sync_leave({group}, {member}, {reason})")
			}
		}
	}
}

/// One owned membership inside a snapshot exchange.
#[derive(Debug, Clone)]
pub struct SyncEntry {
	pub group: GroupName,
	pub member: Member,
	pub meta: Meta,
	pub stamp: u64,
}
