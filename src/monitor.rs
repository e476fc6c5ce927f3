use {
	crate::{
		id::{MemberId, MonitorRef},
		member::{ExitReason, Member},
	},
	std::collections::HashMap,
	tokio::sync::mpsc,
	tokio_util::sync::CancellationToken,
};

/// Delivered to a scope worker when a monitored member exits.
#[derive(Debug)]
pub(crate) struct DeathNotice {
	pub monitor: MonitorRef,
	pub member: MemberId,
	pub reason: ExitReason,
}

/// The set of liveness subscriptions held by one scope worker.
///
/// One subscription exists per locally-present member no matter how many
/// groups it is in; the shared [`MonitorRef`] is stored in every one of that
/// member's entries. Each subscription delivers exactly one [`DeathNotice`]
/// to the worker's sink, unless it is cancelled first.
///
/// Cancellation has flush semantics: a notice that was already emitted by a
/// watcher races the cancellation, so [`Monitors::consume`] validates every
/// incoming notice against the live subscription set and stale notices are
/// discarded by the worker.
pub(crate) struct Monitors {
	sink: mpsc::UnboundedSender<DeathNotice>,
	active: HashMap<MemberId, Watcher>,
	next_ref: u64,
}

struct Watcher {
	monitor: MonitorRef,
	cancel: CancellationToken,
}

impl Monitors {
	pub fn new(sink: mpsc::UnboundedSender<DeathNotice>) -> Self {
		Self {
			sink,
			active: HashMap::new(),
			next_ref: 1,
		}
	}

	/// Subscribes to the member's liveness, or returns the reference of the
	/// existing subscription.
	pub fn subscribe(&mut self, member: &Member) -> MonitorRef {
		if let Some(watcher) = self.active.get(member.id()) {
			return watcher.monitor;
		}

		let monitor = MonitorRef(self.next_ref);
		self.next_ref += 1;

		let cancel = CancellationToken::new();
		tokio::spawn({
			let member = member.clone();
			let sink = self.sink.clone();
			let cancel = cancel.clone();
			async move {
				tokio::select! {
					() = cancel.cancelled() => {}
					reason = member.exited() => {
						let _ = sink.send(DeathNotice {
							monitor,
							member: member.id().clone(),
							reason,
						});
					}
				}
			}
		});

		self
			.active
			.insert(member.id().clone(), Watcher { monitor, cancel });

		monitor
	}

	/// Cancels the member's subscription if one exists. Idempotent.
	pub fn unsubscribe(&mut self, member: &MemberId) {
		if let Some(watcher) = self.active.remove(member) {
			watcher.cancel.cancel();
		}
	}

	/// Validates an incoming notice against the live subscription set and
	/// retires the subscription it belongs to.
	///
	/// Returns `false` for notices whose subscription was cancelled or
	/// superseded; the caller drops those.
	pub fn consume(&mut self, notice: &DeathNotice) -> bool {
		match self.active.get(&notice.member) {
			Some(watcher) if watcher.monitor == notice.monitor => {
				self.active.remove(&notice.member);
				true
			}
			_ => false,
		}
	}

	/// Number of active subscriptions.
	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.active.len()
	}
}

impl Drop for Monitors {
	fn drop(&mut self) {
		for watcher in self.active.values() {
			watcher.cancel.cancel();
		}
	}
}
