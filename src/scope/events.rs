use {
	crate::{
		id::{GroupName, NodeId, ScopeName},
		member::{ExitReason, Member},
		meta::Meta,
	},
	core::fmt,
	serde::{Deserialize, Serialize},
};

/// Lifecycle callbacks fired by a scope.
///
/// Each observable transition of the local view fires exactly one callback,
/// in the order the local indexes change. Callbacks run on the scope worker;
/// implementations should hand off anything slow.
///
/// All methods default to no-ops so implementors only override what they
/// observe.
pub trait ScopeEvents: Send + Sync + 'static {
	/// A member appeared in a group.
	fn on_joined(
		&self,
		_scope: &ScopeName,
		_group: &GroupName,
		_member: &Member,
		_meta: &Meta,
		_reason: &Reason,
	) {
	}

	/// A member disappeared from a group.
	fn on_left(
		&self,
		_scope: &ScopeName,
		_group: &GroupName,
		_member: &Member,
		_meta: &Meta,
		_reason: &Reason,
	) {
	}

	/// An existing membership changed its metadata.
	fn on_updated(
		&self,
		_scope: &ScopeName,
		_group: &GroupName,
		_member: &Member,
		_meta: &Meta,
		_reason: &Reason,
	) {
	}
}

/// The no-op event handler.
impl ScopeEvents for () {}

/// Why a lifecycle transition happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
	/// A direct user join or leave.
	Normal,

	/// The member exited; carries its exit reason.
	Exit(ExitReason),

	/// The entry arrived through the snapshot exchange with a peer that
	/// came up.
	NodeUp(NodeId),

	/// The entry was purged because its owner node went down.
	NodeDown(NodeId),

	/// The member was found dead while a restarted scope rebuilt its
	/// monitors; the exit reason was not observed.
	Undefined,
}

impl fmt::Display for Reason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Normal => f.write_str("normal"),
			Self::Exit(reason) => write!(f, "exit({reason})"),
			Self::NodeUp(node) => write!(f, "node_up({node})"),
			Self::NodeDown(node) => write!(f, "node_down({node})"),
			Self::Undefined => f.write_str("undefined"),
		}
	}
}
