//! Group fan-out: fire-and-forget publishes and scatter/gather calls.

use {
	super::Scope,
	crate::{
		id::GroupName,
		member::{Member, Replier},
		meta::Meta,
	},
	bytes::Bytes,
	core::time::Duration,
	tokio::task::JoinSet,
	tracing::warn,
};

/// Result of a [`Scope::multi_call`]: one outcome per member snapshotted at
/// call time. Members that replied in time are in `replies`; dead members
/// and members that did not reply before the timeout are in `bad_replies`.
/// Ordering within either list is unspecified.
#[derive(Debug, Default)]
pub struct MultiCall {
	pub replies: Vec<((Member, Meta), Bytes)>,
	pub bad_replies: Vec<(Member, Meta)>,
}

/// Fan-out API
impl Scope {
	/// Delivers `payload` to every member of the group, fire-and-forget,
	/// and returns how many members were targeted.
	///
	/// Delivery order across members is unspecified and per-member delivery
	/// is best-effort: a member that dies mid-publish simply misses it.
	pub fn publish(
		&self,
		group: impl Into<GroupName>,
		payload: impl Into<Bytes>,
	) -> usize {
		self.fan_out(&group.into(), payload.into(), false)
	}

	/// Like [`Scope::publish`], restricted to members the local node owns.
	pub fn local_publish(
		&self,
		group: impl Into<GroupName>,
		payload: impl Into<Bytes>,
	) -> usize {
		self.fan_out(&group.into(), payload.into(), true)
	}

	/// Scatter/gather over the group: sends a call envelope to every member
	/// and collects replies for up to `timeout`.
	///
	/// Each member is driven by its own short-lived worker, so one slow or
	/// dead target never delays the others and total wall time is bounded
	/// by `timeout` regardless of group size. A worker resolves on the
	/// first of: a reply correlated to its envelope, the target's death, or
	/// the timeout; the latter two make the target a bad reply.
	pub async fn multi_call(
		&self,
		group: impl Into<GroupName>,
		payload: impl Into<Bytes>,
		timeout: Duration,
	) -> MultiCall {
		let targets = self.member_snapshot(&group.into(), false);
		let payload = payload.into();

		let mut calls = JoinSet::new();
		for (member, meta) in targets {
			let payload = payload.clone();
			calls.spawn(async move {
				let reply =
					call_one(&member, payload, meta.clone(), timeout).await;
				(member, meta, reply)
			});
		}

		let mut result = MultiCall::default();
		while let Some(outcome) = calls.join_next().await {
			match outcome {
				Ok((member, meta, Some(reply))) => {
					result.replies.push(((member, meta), reply));
				}
				Ok((member, meta, None)) => {
					result.bad_replies.push((member, meta));
				}
				Err(error) => {
					warn!(%error, "multi_call worker failed");
				}
			}
		}

		result
	}

	fn fan_out(
		&self,
		group: &GroupName,
		payload: Bytes,
		local_only: bool,
	) -> usize {
		let targets = self.member_snapshot(group, local_only);
		for (member, _) in &targets {
			member.cast(payload.clone());
		}
		targets.len()
	}
}

/// Drives one target of a multi_call.
async fn call_one(
	member: &Member,
	payload: Bytes,
	meta: Meta,
	timeout: Duration,
) -> Option<Bytes> {
	let (replier, reply_rx) = Replier::channel();
	let token = replier.token();
	if !member.call(payload, meta, replier) {
		return None;
	}

	tokio::select! {
		reply = reply_rx => match reply {
			Ok((replied, payload)) if replied == token => Some(payload),
			_ => None,
		},
		_ = member.exited() => None,
		() = tokio::time::sleep(timeout) => None,
	}
}
