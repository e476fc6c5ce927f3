//! The seam between scope workers and whatever moves messages between nodes.
//!
//! The registry assumes a message-oriented primitive that is reliable while
//! two nodes stay connected and best-effort across partitions, preserves
//! per-node delivery order, and signals peer arrival and departure. This
//! module captures that contract; [`crate::builtin::Mesh`] implements it
//! in-process.

use {
	crate::{
		id::{NodeId, ScopeName},
		scope::wire::{Broadcast, Reply, Request, Tagged},
	},
	core::time::Duration,
	futures::future::BoxFuture,
	tokio::sync::{mpsc, oneshot},
};

/// Upper bound a transport applies to [`Transport::call`] round-trips.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Moves scope traffic between nodes.
///
/// Implementations demultiplex inbound traffic per scope: everything
/// addressed to a scope is pushed into the sink that scope registered, in
/// arrival order. Peer-up/peer-down signals for a scope mean "a scope with
/// the same name became reachable/unreachable on that node".
///
/// Requests, replies and broadcasts move inside [`Tagged`] envelopes; the
/// transport carries the tag verbatim and the receiving scope drops
/// cross-version traffic.
pub trait Transport: Send + Sync + 'static {
	/// Identity of the local node.
	fn node_id(&self) -> &NodeId;

	/// Remote nodes currently reachable that run the given scope.
	fn peers(&self, scope: &ScopeName) -> Vec<NodeId>;

	/// Routes all inbound traffic for `scope` to `sink`, and announces the
	/// scope to reachable peers (delivering initial peer-up signals both
	/// ways).
	fn register(&self, scope: ScopeName, sink: mpsc::UnboundedSender<Inbound>);

	/// Withdraws the scope; peers observe it as a peer-down.
	fn unregister(&self, scope: &ScopeName);

	/// Sends a request to the scope instance on `to` and awaits its reply,
	/// bounded by [`CALL_TIMEOUT`].
	fn call(
		&self,
		to: NodeId,
		scope: ScopeName,
		request: Tagged<Request>,
	) -> BoxFuture<'static, Result<Tagged<Reply>, TransportError>>;

	/// Fans a broadcast out to every reachable peer running the scope,
	/// best-effort, optionally excluding one node.
	fn broadcast(
		&self,
		scope: ScopeName,
		message: Tagged<Broadcast>,
		except: Option<&NodeId>,
	);
}

/// Inbound traffic delivered to a scope's registered sink.
#[derive(Debug)]
pub enum Inbound {
	/// A peer running this scope became reachable.
	PeerUp(NodeId),

	/// A peer running this scope became unreachable.
	PeerDown(NodeId),

	/// An RPC from a peer; the reply goes back through `responder`.
	Request {
		from: NodeId,
		request: Tagged<Request>,
		responder: oneshot::Sender<Tagged<Reply>>,
	},

	/// A replication broadcast from a peer.
	Broadcast {
		from: NodeId,
		message: Tagged<Broadcast>,
	},
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("node {0} is not reachable")]
	Unreachable(NodeId),

	#[error("scope {0} is not running on node {1}")]
	ScopeUnavailable(ScopeName, NodeId),

	#[error("request to node {0} timed out")]
	Timeout(NodeId),
}
