use crate::{id::ScopeName, transport::TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// No scope with this name is running on the local node.
	#[error("no scope named {0} is running on this node")]
	InvalidScope(ScopeName),

	/// Join refused: the member is not alive on its owner node.
	#[error("member is not alive on its owner node")]
	NotAlive,

	/// Leave refused: the member is not in the group on its owner node.
	#[error("member is not in the group")]
	NotInGroup,

	/// The request could not reach the owning node. Local state is
	/// unchanged when this surfaces.
	#[error("transport failure: {0}")]
	Transport(#[from] TransportError),

	/// The scope worker is gone; the handle is stale.
	#[error("scope worker has terminated")]
	ScopeTerminated,

	/// A remote scope answered with a reply that does not match the
	/// request.
	#[error("unexpected reply from remote scope")]
	UnexpectedReply,

	/// A node was built without a transport.
	#[error("node builder requires a transport")]
	NoTransport,
}
