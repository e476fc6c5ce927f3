//! Scoped process-group registry.
//!
//! A scope is one independent instance of the registry. Every node that
//! participates runs one scope worker per scope name; workers replicate
//! group memberships to each other and converge on the same view.

use {
	crate::{
		error::Error,
		id::{GroupName, NodeId, ScopeName},
		member::Member,
		meta::Meta,
		scope::{
			events::ScopeEvents,
			store::Store,
			wire::{JoinOutcome, Reply, Request, Tagged},
			worker::{Command, Worker},
		},
		transport::Transport,
	},
	std::sync::Arc,
	tokio::sync::{mpsc, oneshot},
	tokio_util::sync::{CancellationToken, DropGuard},
};

pub mod events;
pub mod wire;

mod fanout;
mod store;
mod worker;

pub use fanout::MultiCall;

/// Handle to one scope instance on the local node.
///
/// Notes:
///
/// - This type is cheap to clone; all clones refer to the same underlying
///   scope instance. The scope worker keeps running while any clone lives
///   (the [`crate::Node`] that created the scope holds one).
///
/// - Mutations ([`Scope::join`], [`Scope::leave`]) are routed to the scope
///   worker on the member's owning node; everything else reads the local,
///   eventually consistent view without cross-node traffic.
#[derive(Clone)]
pub struct Scope {
	shared: Arc<Shared>,
	_terminate: Arc<DropGuard>,
}

/// State shared between scope handles and the scope worker.
pub(crate) struct Shared {
	pub name: ScopeName,
	pub node: NodeId,
	pub store: Store,
	pub events: Arc<dyn ScopeEvents>,
	pub transport: Arc<dyn Transport>,
	pub commands: mpsc::UnboundedSender<Command>,
}

/// Public API
impl Scope {
	/// The name of this scope.
	pub fn name(&self) -> &ScopeName {
		&self.shared.name
	}

	/// The local node's identity.
	pub fn node(&self) -> &NodeId {
		&self.shared.node
	}

	/// Registers `member` in `group` with the given metadata.
	///
	/// Callable from any node; the request is routed to the member's owner.
	/// Re-joining with identical metadata is a no-op, re-joining with
	/// different metadata updates the membership in place.
	///
	/// Fails with [`Error::NotAlive`] if the member is dead on its owner
	/// node, or with a transport error when the owner is unreachable.
	pub async fn join(
		&self,
		group: impl Into<GroupName>,
		member: &Member,
		meta: Meta,
	) -> Result<(), Error> {
		let group = group.into();
		let owner = member.node().clone();

		if owner == self.shared.node {
			let (respond, done) = oneshot::channel();
			self.send(Command::Join {
				group,
				member: member.clone(),
				meta,
				requester: self.shared.node.clone(),
				respond,
			})?;
			return match done.await {
				Ok(Ok(_)) => Ok(()),
				Ok(Err(_)) => Err(Error::NotAlive),
				Err(_) => Err(Error::ScopeTerminated),
			};
		}

		let request = Tagged::new(Request::Join {
			requester: self.shared.node.clone(),
			group: group.clone(),
			member: member.clone(),
			meta: meta.clone(),
		});
		let reply = self
			.shared
			.transport
			.call(owner, self.shared.name.clone(), request)
			.await?;
		if !reply.matches() {
			return Err(Error::UnexpectedReply);
		}

		match reply.message {
			Reply::Joined(
				JoinOutcome::Joined { stamp } | JoinOutcome::Updated { stamp },
			) => {
				// apply what the owner wrote before returning, so local
				// reads see the join without waiting for the broadcast
				let (applied, done) = oneshot::channel();
				self.send(Command::ApplyJoin {
					group,
					member: member.clone(),
					meta,
					stamp,
					applied,
				})?;
				let _ = done.await;
				Ok(())
			}
			Reply::Joined(JoinOutcome::Noop) => Ok(()),
			Reply::NotAlive => Err(Error::NotAlive),
			_ => Err(Error::UnexpectedReply),
		}
	}

	/// Removes `member` from `group`.
	///
	/// Callable from any node; the request is routed to the member's owner.
	/// Fails with [`Error::NotInGroup`] if no such membership exists there.
	pub async fn leave(
		&self,
		group: impl Into<GroupName>,
		member: &Member,
	) -> Result<(), Error> {
		let group = group.into();
		let owner = member.node().clone();

		if owner == self.shared.node {
			let (respond, done) = oneshot::channel();
			self.send(Command::Leave {
				group,
				member: member.clone(),
				requester: self.shared.node.clone(),
				respond,
			})?;
			return match done.await {
				Ok(Ok(_)) => Ok(()),
				Ok(Err(_)) => Err(Error::NotInGroup),
				Err(_) => Err(Error::ScopeTerminated),
			};
		}

		let request = Tagged::new(Request::Leave {
			requester: self.shared.node.clone(),
			group: group.clone(),
			member: member.clone(),
		});
		let reply = self
			.shared
			.transport
			.call(owner, self.shared.name.clone(), request)
			.await?;
		if !reply.matches() {
			return Err(Error::UnexpectedReply);
		}

		match reply.message {
			Reply::Left { .. } => {
				let (applied, done) = oneshot::channel();
				self.send(Command::ApplyLeave {
					group,
					member: member.clone(),
					applied,
				})?;
				let _ = done.await;
				Ok(())
			}
			Reply::NotInGroup => Err(Error::NotInGroup),
			_ => Err(Error::UnexpectedReply),
		}
	}
}

/// Query surface. All queries read the local indexes directly and reflect
/// the eventually consistent view; none of them produce cross-node traffic.
impl Scope {
	/// All members of a group with their metadata, any owner, ordered by
	/// member id.
	pub fn members(&self, group: impl Into<GroupName>) -> Vec<(Member, Meta)> {
		self.member_snapshot(&group.into(), false)
	}

	/// Members of a group owned by the local node.
	pub fn local_members(
		&self,
		group: impl Into<GroupName>,
	) -> Vec<(Member, Meta)> {
		self.member_snapshot(&group.into(), true)
	}

	/// `true` if the member is currently in the group, any owner.
	pub fn is_member(
		&self,
		group: impl Into<GroupName>,
		member: &Member,
	) -> bool {
		self.shared.store.get(&group.into(), member.id()).is_some()
	}

	/// `true` if the member is in the group and owned by the local node.
	pub fn is_local_member(
		&self,
		group: impl Into<GroupName>,
		member: &Member,
	) -> bool {
		member.node() == &self.shared.node
			&& self.is_member(group, member)
	}

	/// Names of all non-empty groups.
	pub fn group_names(&self) -> Vec<GroupName> {
		self.shared.store.group_names()
	}

	/// Names of groups with at least one member owned by `node`.
	pub fn group_names_on(&self, node: &NodeId) -> Vec<GroupName> {
		self.shared.store.group_names_on(node)
	}

	/// Number of non-empty groups.
	pub fn count(&self) -> usize {
		self.shared.store.count()
	}

	/// Number of groups with at least one member owned by `node`.
	pub fn count_on(&self, node: &NodeId) -> usize {
		self.shared.store.count_on(node)
	}
}

/// Internal API
impl Scope {
	/// Spawns the scope worker and returns the first handle to it. Called
	/// by [`crate::Node`] when a scope is created.
	pub(crate) fn spawn(
		name: ScopeName,
		transport: Arc<dyn Transport>,
		events: Arc<dyn ScopeEvents>,
	) -> Self {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

		let shared = Arc::new(Shared {
			name: name.clone(),
			node: transport.node_id().clone(),
			store: Store::default(),
			events,
			transport: Arc::clone(&transport),
			commands: commands_tx,
		});

		// register before the worker runs: initial peer-up signals queue in
		// the inbound channel and are processed right after recovery
		transport.register(name, inbound_tx);

		let cancel = CancellationToken::new();
		let worker = Worker::new(
			Arc::clone(&shared),
			cancel.clone(),
			commands_rx,
			inbound_rx,
		);
		tokio::spawn(worker.run());

		Self {
			shared,
			_terminate: Arc::new(cancel.drop_guard()),
		}
	}

	pub(crate) fn send(&self, command: Command) -> Result<(), Error> {
		self
			.shared
			.commands
			.send(command)
			.map_err(|_| Error::ScopeTerminated)
	}

	pub(crate) fn member_snapshot(
		&self,
		group: &GroupName,
		local_only: bool,
	) -> Vec<(Member, Meta)> {
		let node = &self.shared.node;
		self
			.shared
			.store
			.members(group)
			.into_iter()
			.filter(|entry| !local_only || entry.owner() == node)
			.map(|entry| (entry.member, entry.meta))
			.collect()
	}
}

impl core::fmt::Debug for Scope {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Scope")
			.field("name", &self.shared.name)
			.field("node", &self.shared.node)
			.finish_non_exhaustive()
	}
}
