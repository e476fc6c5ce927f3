use {
	crate::{
		id::{NodeId, ScopeName},
		scope::wire::{Broadcast, Reply, Request, Tagged},
		transport::{CALL_TIMEOUT, Inbound, Transport, TransportError},
	},
	futures::{FutureExt, future::BoxFuture},
	parking_lot::RwLock,
	std::{
		collections::{HashMap, HashSet},
		sync::Arc,
	},
	tokio::sync::{mpsc, oneshot},
	tracing::trace,
};

/// An in-process cluster of mesh endpoints.
///
/// Notes:
///
/// - This type is cheap to clone; all clones refer to the same mesh.
///
/// - Every named endpoint models one node. Endpoints are fully connected by
///   default; [`Mesh::disconnect`] and [`Mesh::connect`] sever and restore
///   individual links to simulate partitions and heals, delivering
///   peer-down/peer-up signals to the scopes on both sides.
///
/// - Traffic addressed to one scope on one node flows through a single
///   channel, so per-node delivery order is preserved: a peer-up signal
///   always precedes requests sent by that peer afterwards.
pub struct Mesh {
	state: Arc<RwLock<MeshState>>,
}

impl Clone for Mesh {
	fn clone(&self) -> Self {
		Self {
			state: Arc::clone(&self.state),
		}
	}
}

impl Default for Mesh {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Default)]
struct MeshState {
	nodes: HashMap<NodeId, NodeSlot>,
}

#[derive(Default)]
struct NodeSlot {
	sinks: HashMap<ScopeName, mpsc::UnboundedSender<Inbound>>,
	blocked: HashSet<NodeId>,
}

impl MeshState {
	fn connected(&self, a: &NodeId, b: &NodeId) -> bool {
		a != b
			&& self.nodes.contains_key(a)
			&& self.nodes.contains_key(b)
			&& !self.nodes[a].blocked.contains(b)
	}

	fn sink(
		&self,
		node: &NodeId,
		scope: &ScopeName,
	) -> Option<mpsc::UnboundedSender<Inbound>> {
		self.nodes.get(node)?.sinks.get(scope).cloned()
	}
}

/// Public API
impl Mesh {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(MeshState::default())),
		}
	}

	/// Returns the transport endpoint for the named node, creating the node
	/// on first use. Endpoints for the same name share the node's state.
	pub fn endpoint(&self, node: impl Into<NodeId>) -> MeshEndpoint {
		let id = node.into();
		self.state.write().nodes.entry(id.clone()).or_default();
		MeshEndpoint {
			state: Arc::clone(&self.state),
			id,
		}
	}

	/// Severs the link between two nodes. Scopes running on both observe
	/// each other as peer-down.
	pub fn disconnect(&self, a: impl Into<NodeId>, b: impl Into<NodeId>) {
		let (a, b) = (a.into(), b.into());
		let mut state = self.state.write();

		if let Some(slot) = state.nodes.get_mut(&a) {
			slot.blocked.insert(b.clone());
		}
		if let Some(slot) = state.nodes.get_mut(&b) {
			slot.blocked.insert(a.clone());
		}

		for scope in shared_scopes(&state, &a, &b) {
			signal(&state, &a, &scope, Inbound::PeerDown(b.clone()));
			signal(&state, &b, &scope, Inbound::PeerDown(a.clone()));
		}
	}

	/// Restores the link between two nodes. Scopes running on both observe
	/// each other as peer-up and re-exchange state.
	pub fn connect(&self, a: impl Into<NodeId>, b: impl Into<NodeId>) {
		let (a, b) = (a.into(), b.into());
		let mut state = self.state.write();

		if let Some(slot) = state.nodes.get_mut(&a) {
			slot.blocked.remove(&b);
		}
		if let Some(slot) = state.nodes.get_mut(&b) {
			slot.blocked.remove(&a);
		}

		for scope in shared_scopes(&state, &a, &b) {
			signal(&state, &a, &scope, Inbound::PeerUp(b.clone()));
			signal(&state, &b, &scope, Inbound::PeerUp(a.clone()));
		}
	}

	/// Test hook: delivers a broadcast to one node directly, bypassing
	/// connectivity. Simulates delayed, reordered or cross-version
	/// replication traffic.
	pub fn inject(
		&self,
		from: impl Into<NodeId>,
		to: impl Into<NodeId>,
		scope: impl Into<ScopeName>,
		message: Tagged<Broadcast>,
	) {
		let state = self.state.read();
		if let Some(sink) = state.sink(&to.into(), &scope.into()) {
			let _ = sink.send(Inbound::Broadcast {
				from: from.into(),
				message,
			});
		}
	}
}

fn shared_scopes(
	state: &MeshState,
	a: &NodeId,
	b: &NodeId,
) -> Vec<ScopeName> {
	let Some(slot_a) = state.nodes.get(a) else {
		return Vec::new();
	};
	let Some(slot_b) = state.nodes.get(b) else {
		return Vec::new();
	};
	slot_a
		.sinks
		.keys()
		.filter(|scope| slot_b.sinks.contains_key(*scope))
		.cloned()
		.collect()
}

fn signal(
	state: &MeshState,
	node: &NodeId,
	scope: &ScopeName,
	inbound: Inbound,
) {
	if let Some(sink) = state.sink(node, scope) {
		let _ = sink.send(inbound);
	}
}

/// One node's connection to a [`Mesh`].
pub struct MeshEndpoint {
	state: Arc<RwLock<MeshState>>,
	id: NodeId,
}

impl Transport for MeshEndpoint {
	fn node_id(&self) -> &NodeId {
		&self.id
	}

	fn peers(&self, scope: &ScopeName) -> Vec<NodeId> {
		let state = self.state.read();
		state
			.nodes
			.iter()
			.filter(|(id, slot)| {
				slot.sinks.contains_key(scope)
					&& state.connected(&self.id, id)
			})
			.map(|(id, _)| id.clone())
			.collect()
	}

	fn register(
		&self,
		scope: ScopeName,
		sink: mpsc::UnboundedSender<Inbound>,
	) {
		let mut state = self.state.write();
		state
			.nodes
			.entry(self.id.clone())
			.or_default()
			.sinks
			.insert(scope.clone(), sink.clone());

		let state = &*state;
		for (peer, slot) in &state.nodes {
			if *peer == self.id
				|| !slot.sinks.contains_key(&scope)
				|| !state.connected(&self.id, peer)
			{
				continue;
			}
			if let Some(peer_sink) = slot.sinks.get(&scope) {
				let _ = peer_sink.send(Inbound::PeerUp(self.id.clone()));
			}
			let _ = sink.send(Inbound::PeerUp(peer.clone()));
		}
	}

	fn unregister(&self, scope: &ScopeName) {
		let mut state = self.state.write();
		let removed = state
			.nodes
			.get_mut(&self.id)
			.and_then(|slot| slot.sinks.remove(scope));
		if removed.is_none() {
			return;
		}

		let state = &*state;
		for (peer, slot) in &state.nodes {
			if *peer == self.id || !state.connected(&self.id, peer) {
				continue;
			}
			if let Some(peer_sink) = slot.sinks.get(scope) {
				let _ = peer_sink.send(Inbound::PeerDown(self.id.clone()));
			}
		}
	}

	fn call(
		&self,
		to: NodeId,
		scope: ScopeName,
		request: Tagged<Request>,
	) -> BoxFuture<'static, Result<Tagged<Reply>, TransportError>> {
		let state = Arc::clone(&self.state);
		let from = self.id.clone();

		async move {
			let responder_rx = {
				let state = state.read();
				if !state.connected(&from, &to) {
					return Err(TransportError::Unreachable(to));
				}
				let Some(sink) = state.sink(&to, &scope) else {
					return Err(TransportError::ScopeUnavailable(scope, to));
				};

				let (responder, responder_rx) = oneshot::channel();
				let delivered = sink.send(Inbound::Request {
					from: from.clone(),
					request,
					responder,
				});
				if delivered.is_err() {
					return Err(TransportError::Unreachable(to));
				}
				responder_rx
			};

			match tokio::time::timeout(CALL_TIMEOUT, responder_rx).await {
				Ok(Ok(reply)) => Ok(reply),
				Ok(Err(_)) => Err(TransportError::Unreachable(to)),
				Err(_) => Err(TransportError::Timeout(to)),
			}
		}
		.boxed()
	}

	fn broadcast(
		&self,
		scope: ScopeName,
		message: Tagged<Broadcast>,
		except: Option<&NodeId>,
	) {
		let state = self.state.read();
		for (peer, slot) in &state.nodes {
			if *peer == self.id
				|| Some(peer) == except
				|| !state.connected(&self.id, peer)
			{
				continue;
			}
			if let Some(sink) = slot.sinks.get(&scope) {
				trace!(
					from = %self.id,
					to = %peer,
					%message,
					"mesh broadcast",
				);
				let _ = sink.send(Inbound::Broadcast {
					from: self.id.clone(),
					message: message.clone(),
				});
			}
		}
	}
}
