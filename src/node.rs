use {
	crate::{
		error::Error,
		id::{MemberId, NodeId, ScopeName},
		member::{Mailbox, Member},
		scope::{Scope, events::ScopeEvents},
		transport::Transport,
	},
	core::sync::atomic::{AtomicU64, Ordering},
	parking_lot::RwLock,
	std::{collections::HashMap, sync::Arc},
};

/// The entrypoint to the registry on one node.
///
/// Notes:
///
/// - This type is cheap to clone; all clones refer to the same node.
///
/// - A node owns the transport connection to the rest of the cluster, the
///   scopes created on it, and the serial counter for members it spawns.
///
/// - Scopes are created explicitly and looked up by name; operations against
///   a name with no scope instance fail with [`Error::InvalidScope`].
#[derive(Clone)]
pub struct Node {
	inner: Arc<NodeInner>,
}

struct NodeInner {
	id: NodeId,
	transport: Arc<dyn Transport>,
	scopes: RwLock<HashMap<ScopeName, Scope>>,
	serials: AtomicU64,
}

/// Public construction API
impl Node {
	/// Creates a node builder.
	pub fn builder() -> NodeBuilder {
		NodeBuilder::default()
	}

	/// Creates a node over the given transport with no scopes.
	pub fn new(transport: impl Transport) -> Self {
		let transport: Arc<dyn Transport> = Arc::new(transport);
		Self {
			inner: Arc::new(NodeInner {
				id: transport.node_id().clone(),
				transport,
				scopes: RwLock::new(HashMap::new()),
				serials: AtomicU64::new(0),
			}),
		}
	}
}

/// Public API
impl Node {
	/// The cluster-wide identity of this node.
	pub fn id(&self) -> &NodeId {
		&self.inner.id
	}

	/// Returns a builder for a scope on this node.
	pub fn build_scope(&self, name: impl Into<ScopeName>) -> ScopeBuilder {
		ScopeBuilder {
			node: self.clone(),
			name: name.into(),
			events: Arc::new(()),
		}
	}

	/// Creates a scope with no event handler, or returns the existing
	/// instance if the name is already taken.
	pub fn create_scope(&self, name: impl Into<ScopeName>) -> Scope {
		self.build_scope(name).spawn()
	}

	/// Looks up a scope by name.
	pub fn scope(&self, name: impl Into<ScopeName>) -> Result<Scope, Error> {
		let name = name.into();
		self
			.inner
			.scopes
			.read()
			.get(&name)
			.cloned()
			.ok_or(Error::InvalidScope(name))
	}

	/// Removes a scope from this node. Its worker terminates once every
	/// outstanding handle is dropped; peers observe the scope going down.
	pub fn remove_scope(&self, name: &ScopeName) -> bool {
		self.inner.scopes.write().remove(name).is_some()
	}

	/// Spawns a member owned by this node, returning the addressable handle
	/// and the receiving-side mailbox.
	pub fn spawn_member(&self) -> (Member, Mailbox) {
		let serial = self.inner.serials.fetch_add(1, Ordering::Relaxed) + 1;
		Member::channel(MemberId::new(self.inner.id.clone(), serial))
	}
}

/// Internal API
impl Node {
	fn install(&self, name: ScopeName, events: Arc<dyn ScopeEvents>) -> Scope {
		let mut scopes = self.inner.scopes.write();
		if let Some(existing) = scopes.get(&name) {
			return existing.clone();
		}

		let scope = Scope::spawn(
			name.clone(),
			Arc::clone(&self.inner.transport),
			events,
		);
		scopes.insert(name, scope.clone());
		scope
	}
}

impl core::fmt::Debug for Node {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Node")
			.field("id", &self.inner.id)
			.finish_non_exhaustive()
	}
}

/// Builds a [`Node`].
#[derive(Default)]
pub struct NodeBuilder {
	transport: Option<Arc<dyn Transport>>,
	scopes: Vec<ScopeName>,
}

impl NodeBuilder {
	/// Sets the transport connecting this node to the cluster. Required.
	#[must_use]
	pub fn with_transport(mut self, transport: impl Transport) -> Self {
		self.transport = Some(Arc::new(transport));
		self
	}

	/// Declares a scope to create as soon as the node is built.
	#[must_use]
	pub fn with_scope(mut self, name: impl Into<ScopeName>) -> Self {
		self.scopes.push(name.into());
		self
	}

	pub fn build(self) -> Result<Node, Error> {
		let transport = self.transport.ok_or(Error::NoTransport)?;
		let node = Node {
			inner: Arc::new(NodeInner {
				id: transport.node_id().clone(),
				transport,
				scopes: RwLock::new(HashMap::new()),
				serials: AtomicU64::new(0),
			}),
		};

		for name in self.scopes {
			node.create_scope(name);
		}

		Ok(node)
	}
}

/// Builds a [`Scope`] on a node.
pub struct ScopeBuilder {
	node: Node,
	name: ScopeName,
	events: Arc<dyn ScopeEvents>,
}

impl ScopeBuilder {
	/// Attaches a lifecycle event handler to the scope.
	#[must_use]
	pub fn with_events(mut self, events: impl ScopeEvents) -> Self {
		self.events = Arc::new(events);
		self
	}

	/// Spawns the scope worker, or returns the existing instance if the
	/// name is already taken on this node (the event handler of the
	/// existing instance is kept).
	pub fn spawn(self) -> Scope {
		self.node.install(self.name, self.events)
	}
}
