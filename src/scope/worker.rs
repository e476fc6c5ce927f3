use {
	super::{
		Shared,
		events::Reason,
		store::Entry,
		wire::{Broadcast, JoinOutcome, Reply, Request, SyncEntry, Tagged},
	},
	crate::{
		id::{GroupName, MemberId, NodeId},
		member::Member,
		meta::Meta,
		monitor::{DeathNotice, Monitors},
		primitives::WorkQueue,
		transport::Inbound,
	},
	chrono::Utc,
	futures::StreamExt,
	std::{collections::BTreeSet, sync::Arc},
	tokio::sync::{mpsc, oneshot},
	tokio_util::sync::CancellationToken,
	tracing::{debug, info, trace, warn},
};

/// Requests handed to the worker loop by scope handles.
pub(crate) enum Command {
	/// Owner-side join of a member this node owns.
	Join {
		group: GroupName,
		member: Member,
		meta: Meta,
		requester: NodeId,
		respond: oneshot::Sender<Result<JoinOutcome, NotAlive>>,
	},

	/// Owner-side leave of a member this node owns.
	Leave {
		group: GroupName,
		member: Member,
		requester: NodeId,
		respond: oneshot::Sender<Result<Meta, NotInGroup>>,
	},

	/// Eager local apply of a join that a remote owner acknowledged.
	/// `applied` resolves once the write is visible to local reads.
	ApplyJoin {
		group: GroupName,
		member: Member,
		meta: Meta,
		stamp: u64,
		applied: oneshot::Sender<()>,
	},

	/// Eager local apply of a leave that a remote owner acknowledged.
	ApplyLeave {
		group: GroupName,
		member: Member,
		applied: oneshot::Sender<()>,
	},

	/// A peer's half of a snapshot exchange arrived on the work queue.
	ApplySnapshot {
		from: NodeId,
		entries: Vec<SyncEntry>,
	},
}

/// Join refused: the member is not alive.
#[derive(Debug)]
pub(crate) struct NotAlive;

/// Leave refused: no such membership.
#[derive(Debug)]
pub(crate) struct NotInGroup;

/// The scope task: the single serialization point for one scope on one node.
///
/// All index mutations, monitor subscriptions and replication broadcasts
/// happen here, so they never interleave. Queries bypass the worker and read
/// the store directly.
pub(crate) struct Worker {
	shared: Arc<Shared>,
	cancel: CancellationToken,
	commands: mpsc::UnboundedReceiver<Command>,
	inbound: mpsc::UnboundedReceiver<Inbound>,
	deaths: mpsc::UnboundedReceiver<DeathNotice>,
	monitors: Monitors,

	/// Remote nodes currently running this scope, as observed through
	/// transport peer events. Consulted when applying replication traffic.
	peers: BTreeSet<NodeId>,

	/// Outbound RPCs in flight (snapshot exchanges). Driven from the loop so
	/// the worker never awaits the transport inline.
	work: WorkQueue,
}

impl Worker {
	pub fn new(
		shared: Arc<Shared>,
		cancel: CancellationToken,
		commands: mpsc::UnboundedReceiver<Command>,
		inbound: mpsc::UnboundedReceiver<Inbound>,
	) -> Self {
		let (deaths_tx, deaths_rx) = mpsc::unbounded_channel();

		Self {
			shared,
			cancel,
			commands,
			inbound,
			deaths: deaths_rx,
			monitors: Monitors::new(deaths_tx),
			peers: BTreeSet::new(),
			work: WorkQueue::new(),
		}
	}

	pub async fn run(mut self) {
		self.recover();

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => {
					self.on_terminated();
					break;
				}

				// drives in-flight snapshot exchanges
				_ = self.work.next() => {}

				Some(command) = self.commands.recv() => {
					self.on_command(command);
				}

				Some(notice) = self.deaths.recv() => {
					self.on_death(&notice);
				}

				Some(inbound) = self.inbound.recv() => {
					self.on_inbound(inbound);
				}
			}
		}
	}

	/// Brings a (re)started worker to a trustworthy baseline.
	///
	/// Remote entries are purged outright; their stamps predate whatever
	/// this worker missed and peer-up exchanges will repopulate them. Local
	/// entries are kept if the member still lives (with a fresh monitor,
	/// one per member) and dropped with an undefined reason otherwise.
	fn recover(&mut self) {
		let store = &self.shared.store;

		for (group, entry) in store.foreign(&self.shared.node) {
			store.remove(&group, entry.member.id());
		}

		for (group, entry) in store.owned_by(&self.shared.node) {
			if entry.member.is_alive() {
				let monitor = self.monitors.subscribe(&entry.member);
				store.insert(
					group,
					Entry {
						monitor: Some(monitor),
						..entry
					},
				);
			} else {
				store.remove(&group, entry.member.id());
				self.fire_left(
					&group,
					&entry.member,
					&entry.meta,
					&Reason::Undefined,
				);
			}
		}
	}

	fn on_terminated(&mut self) {
		self.shared.transport.unregister(&self.shared.name);
		debug!(
			scope = %self.shared.name,
			node = %self.shared.node,
			"scope worker terminated",
		);
	}

	fn on_command(&mut self, command: Command) {
		match command {
			Command::Join { group, member, meta, requester, respond } => {
				let result = self.local_join(group, member, meta, &requester);
				let _ = respond.send(result);
			}
			Command::Leave { group, member, requester, respond } => {
				let result = self.local_leave(&group, &member, &requester);
				let _ = respond.send(result);
			}
			Command::ApplyJoin { group, member, meta, stamp, applied } => {
				self.apply_sync_join(
					group,
					member,
					meta,
					stamp,
					Reason::Normal,
					PeerCheck::Skip,
				);
				let _ = applied.send(());
			}
			Command::ApplyLeave { group, member, applied } => {
				self.apply_sync_leave(&group, member.id(), &Reason::Normal);
				let _ = applied.send(());
			}
			Command::ApplySnapshot { from, entries } => {
				self.on_snapshot(from, entries);
			}
		}
	}

	fn on_inbound(&mut self, inbound: Inbound) {
		match inbound {
			Inbound::PeerUp(peer) => self.on_peer_up(peer),
			Inbound::PeerDown(peer) => self.on_peer_down(&peer),
			Inbound::Request { from, request, responder } => {
				if !request.matches() {
					warn!(
						scope = %self.shared.name,
						node = %self.shared.node,
						from = %from,
						protocol = %request.protocol,
						"dropping request with an unsupported protocol tag",
					);
					return;
				}
				trace!(
					scope = %self.shared.name,
					node = %self.shared.node,
					from = %from,
					"scope request",
				);
				let reply = self.on_request(request.message);
				let _ = responder.send(Tagged::new(reply));
			}
			Inbound::Broadcast { from, message } => {
				if !message.matches() {
					warn!(
						scope = %self.shared.name,
						node = %self.shared.node,
						from = %from,
						protocol = %message.protocol,
						"dropping broadcast with an unsupported protocol tag",
					);
					return;
				}
				trace!(
					scope = %self.shared.name,
					node = %self.shared.node,
					from = %from,
					%message,
					"replication broadcast",
				);
				self.on_broadcast(message.message);
			}
		}
	}

	/// Owner-side join. Assigns the timestamp, manages the monitor, fires
	/// the callback and replicates, in that order; the broadcast only goes
	/// out once the local mutation is complete.
	fn local_join(
		&mut self,
		group: GroupName,
		member: Member,
		meta: Meta,
		requester: &NodeId,
	) -> Result<JoinOutcome, NotAlive> {
		if !member.is_alive() {
			return Err(NotAlive);
		}

		let (outcome, stamp) =
			match self.shared.store.get(&group, member.id()) {
				// re-join with identical metadata: nothing to do, nothing
				// to replicate
				Some(existing) if existing.meta == meta => {
					return Ok(JoinOutcome::Noop);
				}
				Some(existing) => {
					let stamp = stamp_after(existing.stamp);
					self.shared.store.insert(
						group.clone(),
						Entry {
							member: member.clone(),
							meta: meta.clone(),
							stamp,
							monitor: existing.monitor,
						},
					);
					self.fire_updated(
						&group,
						&member,
						&meta,
						&Reason::Normal,
					);
					(JoinOutcome::Updated { stamp }, stamp)
				}
				None => {
					let stamp = stamp_now();
					let monitor = self.monitors.subscribe(&member);
					self.shared.store.insert(
						group.clone(),
						Entry {
							member: member.clone(),
							meta: meta.clone(),
							stamp,
							monitor: Some(monitor),
						},
					);
					self.fire_joined(&group, &member, &meta, &Reason::Normal);
					(JoinOutcome::Joined { stamp }, stamp)
				}
			};

		self.replicate(
			Broadcast::SyncJoin {
				group,
				member,
				meta,
				stamp,
				reason: Reason::Normal,
			},
			Some(requester),
		);

		Ok(outcome)
	}

	/// Owner-side leave.
	fn local_leave(
		&mut self,
		group: &GroupName,
		member: &Member,
		requester: &NodeId,
	) -> Result<Meta, NotInGroup> {
		let Some(entry) = self.shared.store.remove(group, member.id())
		else {
			return Err(NotInGroup);
		};

		self.maybe_demonitor(member.id());
		self.fire_left(group, &entry.member, &entry.meta, &Reason::Normal);
		self.replicate(
			Broadcast::SyncLeave {
				group: group.clone(),
				member: entry.member.clone(),
				meta: entry.meta.clone(),
				reason: Reason::Normal,
			},
			Some(requester),
		);

		Ok(entry.meta)
	}

	/// Drops the member's monitor once its last local entry is gone.
	fn maybe_demonitor(&mut self, member: &MemberId) {
		if !self.shared.store.has_member(member) {
			self.monitors.unsubscribe(member);
		}
	}

	/// Applies an incoming membership through the last-writer-wins
	/// comparator. Shared by replication broadcasts, snapshot entries and
	/// eager applies; only the first two consult the peer set.
	fn apply_sync_join(
		&mut self,
		group: GroupName,
		member: Member,
		meta: Meta,
		stamp: u64,
		reason: Reason,
		peer_check: PeerCheck,
	) {
		if peer_check == PeerCheck::Require
			&& !self.peers.contains(member.node())
		{
			// the owner has disappeared since this was sent; the peer-down
			// path cleans up, or already has
			trace!(
				scope = %self.shared.name,
				node = %self.shared.node,
				group = %group,
				member = %member,
				"dropping sync_join from an unknown owner",
			);
			return;
		}

		match self.shared.store.get(&group, member.id()) {
			None => {
				self.shared.store.insert(
					group.clone(),
					Entry {
						member: member.clone(),
						meta: meta.clone(),
						stamp,
						monitor: None,
					},
				);
				self.fire_joined(&group, &member, &meta, &reason);
			}
			Some(existing) if existing.stamp < stamp => {
				let changed = existing.meta != meta;
				self.shared.store.insert(
					group.clone(),
					Entry {
						member: member.clone(),
						meta: meta.clone(),
						stamp,
						monitor: existing.monitor,
					},
				);
				if changed {
					self.fire_updated(&group, &member, &meta, &reason);
				}
			}
			Some(_) => {
				trace!(
					scope = %self.shared.name,
					node = %self.shared.node,
					group = %group,
					member = %member,
					stamp,
					"dropping stale sync_join",
				);
			}
		}
	}

	fn apply_sync_leave(
		&mut self,
		group: &GroupName,
		member: &MemberId,
		reason: &Reason,
	) {
		if let Some(entry) = self.shared.store.remove(group, member) {
			self.maybe_demonitor(member);
			self.fire_left(group, &entry.member, &entry.meta, reason);
		}
		// no entry: the leave overtook the join or we never saw it; drop
	}

	/// A monitored local member exited: purge every group it was in and
	/// replicate each removal to the full peer set.
	fn on_death(&mut self, notice: &DeathNotice) {
		if !self.monitors.consume(notice) {
			debug!(
				scope = %self.shared.name,
				node = %self.shared.node,
				member = %notice.member,
				"ignoring flushed death notice",
			);
			return;
		}

		let memberships = self.shared.store.memberships(&notice.member);
		if memberships.is_empty() {
			warn!(
				scope = %self.shared.name,
				node = %self.shared.node,
				member = %notice.member,
				"death notice for a member with no entries",
			);
			return;
		}

		let reason = Reason::Exit(notice.reason.clone());
		for (group, entry) in memberships {
			self.shared.store.remove(&group, &notice.member);
			self.fire_left(&group, &entry.member, &entry.meta, &reason);
			self.replicate(
				Broadcast::SyncLeave {
					group,
					member: entry.member,
					meta: entry.meta,
					reason: reason.clone(),
				},
				None,
			);
		}
	}

	fn on_request(&mut self, request: Request) -> Reply {
		match request {
			Request::Join { requester, group, member, meta } => {
				match self.local_join(group, member, meta, &requester) {
					Ok(outcome) => Reply::Joined(outcome),
					Err(NotAlive) => Reply::NotAlive,
				}
			}
			Request::Leave { requester, group, member } => {
				match self.local_leave(&group, &member, &requester) {
					Ok(meta) => Reply::Left { meta },
					Err(NotInGroup) => Reply::NotInGroup,
				}
			}
			Request::Snapshot { from, entries } => {
				self.on_snapshot(from, entries);
				Reply::Snapshot {
					entries: self.local_snapshot(),
				}
			}
		}
	}

	fn on_broadcast(&mut self, message: Broadcast) {
		match message {
			Broadcast::SyncJoin { group, member, meta, stamp, reason } => {
				self.apply_sync_join(
					group,
					member,
					meta,
					stamp,
					reason,
					PeerCheck::Require,
				);
			}
			Broadcast::SyncLeave { group, member, reason, .. } => {
				self.apply_sync_leave(&group, member.id(), &reason);
			}
		}
	}

	/// A peer started running this scope: remember it and exchange full
	/// local snapshots. Our half goes out as a request on the work queue;
	/// the peer's half comes back in the reply and is applied through the
	/// same path as replication traffic.
	fn on_peer_up(&mut self, peer: NodeId) {
		if !self.peers.insert(peer.clone()) {
			return;
		}

		info!(
			scope = %self.shared.name,
			node = %self.shared.node,
			peer = %peer,
			"peer scope up",
		);

		let entries = self.local_snapshot();
		let transport = Arc::clone(&self.shared.transport);
		let commands = self.shared.commands.clone();
		let scope = self.shared.name.clone();
		let node = self.shared.node.clone();

		self.work.enqueue(async move {
			let request =
				Tagged::new(Request::Snapshot { from: node, entries });
			match transport.call(peer.clone(), scope.clone(), request).await {
				Ok(reply) if !reply.matches() => {
					warn!(
						scope = %scope,
						peer = %peer,
						protocol = %reply.protocol,
						"snapshot reply with an unsupported protocol tag",
					);
				}
				Ok(reply) => match reply.message {
					Reply::Snapshot { entries } => {
						let _ = commands.send(Command::ApplySnapshot {
							from: peer,
							entries,
						});
					}
					other => {
						warn!(
							scope = %scope,
							peer = %peer,
							reply = ?other,
							"unexpected snapshot exchange reply",
						);
					}
				},
				Err(error) => {
					// the peer went away again; its peer-down cleans up
					debug!(
						scope = %scope,
						peer = %peer,
						%error,
						"snapshot exchange failed",
					);
				}
			}
		});
	}

	/// A peer stopped running this scope: purge everything it owned. Every
	/// node observes the departure on its own, so nothing is broadcast.
	fn on_peer_down(&mut self, peer: &NodeId) {
		if !self.peers.remove(peer) {
			return;
		}

		info!(
			scope = %self.shared.name,
			node = %self.shared.node,
			peer = %peer,
			"peer scope down",
		);

		let reason = Reason::NodeDown(peer.clone());
		for (group, entry) in self.shared.store.owned_by(peer) {
			self.shared.store.remove(&group, entry.member.id());
			self.fire_left(&group, &entry.member, &entry.meta, &reason);
		}
	}

	fn on_snapshot(&mut self, from: NodeId, entries: Vec<SyncEntry>) {
		debug!(
			scope = %self.shared.name,
			node = %self.shared.node,
			peer = %from,
			entries = entries.len(),
			"applying membership snapshot",
		);

		let reason = Reason::NodeUp(from);
		for entry in entries {
			self.apply_sync_join(
				entry.group,
				entry.member,
				entry.meta,
				entry.stamp,
				reason.clone(),
				PeerCheck::Require,
			);
		}
	}

	/// Everything this node owns, in snapshot form.
	fn local_snapshot(&self) -> Vec<SyncEntry> {
		self
			.shared
			.store
			.owned_by(&self.shared.node)
			.into_iter()
			.map(|(group, entry)| SyncEntry {
				group,
				member: entry.member,
				meta: entry.meta,
				stamp: entry.stamp,
			})
			.collect()
	}

	fn replicate(&self, message: Broadcast, except: Option<&NodeId>) {
		// requester exclusion only applies to remote requesters
		let except = except.filter(|node| **node != self.shared.node);
		self.shared.transport.broadcast(
			self.shared.name.clone(),
			Tagged::new(message),
			except,
		);
	}

	fn fire_joined(
		&self,
		group: &GroupName,
		member: &Member,
		meta: &Meta,
		reason: &Reason,
	) {
		debug!(
			scope = %self.shared.name,
			node = %self.shared.node,
			group = %group,
			member = %member,
			reason = %reason,
			"member joined",
		);
		self
			.shared
			.events
			.on_joined(&self.shared.name, group, member, meta, reason);
	}

	fn fire_left(
		&self,
		group: &GroupName,
		member: &Member,
		meta: &Meta,
		reason: &Reason,
	) {
		debug!(
			scope = %self.shared.name,
			node = %self.shared.node,
			group = %group,
			member = %member,
			reason = %reason,
			"member left",
		);
		self
			.shared
			.events
			.on_left(&self.shared.name, group, member, meta, reason);
	}

	fn fire_updated(
		&self,
		group: &GroupName,
		member: &Member,
		meta: &Meta,
		reason: &Reason,
	) {
		debug!(
			scope = %self.shared.name,
			node = %self.shared.node,
			group = %group,
			member = %member,
			reason = %reason,
			"membership updated",
		);
		self
			.shared
			.events
			.on_updated(&self.shared.name, group, member, meta, reason);
	}
}

/// Whether an applied membership must come from a currently-known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerCheck {
	/// Replication traffic: drop when the owner left the peer set.
	Require,

	/// Eager applies: we just heard from the owner directly.
	Skip,
}

#[allow(clippy::cast_sign_loss)]
fn stamp_now() -> u64 {
	Utc::now().timestamp_micros() as u64
}

/// Next stamp for an entry that already has one. Strictly increasing per
/// entry even when the clock has not advanced past the previous stamp.
fn stamp_after(previous: u64) -> u64 {
	stamp_now().max(previous + 1)
}
