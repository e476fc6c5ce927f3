use {
	crate::utils::{EventKind, Recorder, cluster, eventually, never},
	anyhow::Result,
	roster::{
		ExitReason,
		Meta,
		Node,
		Reason,
		builtin::Mesh,
		wire::{Broadcast, Tagged},
	},
};

#[tokio::test]
async fn joins_replicate_to_peers() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_a = a.scope("users")?;
	let scope_b = b.scope("users")?;

	let (member, _mailbox) = a.spawn_member();
	scope_a.join("chat", &member, Meta::of(&1u32)).await?;

	eventually("join visible on the peer", || {
		scope_b.is_member("chat", &member)
	})
	.await?;

	let members = scope_b.members("chat");
	assert_eq!(members.len(), 1);
	assert_eq!(members[0].0, member);
	assert_eq!(members[0].1.decode::<u32>()?, 1);

	// the peer sees the membership but does not own it
	assert!(!scope_b.is_local_member("chat", &member));
	assert!(scope_b.local_members("chat").is_empty());
	assert_eq!(scope_b.count(), 1);
	assert_eq!(scope_b.count_on(a.id()), 1);
	assert_eq!(scope_b.count_on(b.id()), 0);

	Ok(())
}

/// A join for a remotely-owned member is routed to the owner and applied
/// eagerly on the calling node: the effect is visible to local reads as soon
/// as the call returns, without waiting for the broadcast.
#[tokio::test]
async fn remote_joins_apply_eagerly_on_the_caller() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_a = a.scope("users")?;
	let scope_b = b.scope("users")?;

	let (member, _mailbox) = a.spawn_member();

	// join a member owned by node a through node b's handle
	scope_b.join("chat", &member, Meta::of(&"m")).await?;
	assert!(scope_b.is_member("chat", &member));
	assert!(scope_a.is_member("chat", &member));

	// and leave again, also through node b
	scope_b.leave("chat", &member).await?;
	assert!(!scope_b.is_member("chat", &member));
	assert!(!scope_a.is_member("chat", &member));

	Ok(())
}

/// The owner fires joined then updated; a peer observes the same two
/// callbacks in the same order.
#[tokio::test]
async fn meta_updates_fire_ordered_callbacks_everywhere() -> Result<()> {
	let mesh = Mesh::new();
	let recorder_a = Recorder::default();
	let recorder_b = Recorder::default();

	let a = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let b = Node::builder().with_transport(mesh.endpoint("b")).build()?;
	let scope_a = a
		.build_scope("users")
		.with_events(recorder_a.clone())
		.spawn();
	let scope_b = b
		.build_scope("users")
		.with_events(recorder_b.clone())
		.spawn();

	let (member, _mailbox) = a.spawn_member();
	scope_a.join("g", &member, Meta::of(&"v1")).await?;
	scope_a.join("g", &member, Meta::of(&"v2")).await?;

	let kinds = |recorder: &Recorder| {
		recorder
			.events()
			.iter()
			.map(|event| event.kind)
			.collect::<Vec<_>>()
	};

	assert_eq!(kinds(&recorder_a), vec![EventKind::Joined, EventKind::Updated]);

	eventually("peer observed both transitions", || {
		recorder_b.count(EventKind::Updated) == 1
	})
	.await?;
	assert_eq!(kinds(&recorder_b), vec![EventKind::Joined, EventKind::Updated]);

	let members = scope_b.members("g");
	assert_eq!(members[0].1.decode::<String>()?, "v2");

	Ok(())
}

/// A delayed replication message with an older timestamp must lose against
/// the newer state and fire no callback.
#[tokio::test]
async fn stale_sync_joins_are_dropped() -> Result<()> {
	let mesh = Mesh::new();
	let recorder_b = Recorder::default();

	let a = Node::builder()
		.with_transport(mesh.endpoint("a"))
		.with_scope("users")
		.build()?;
	let b = Node::builder().with_transport(mesh.endpoint("b")).build()?;
	let scope_a = a.scope("users")?;
	let scope_b = b
		.build_scope("users")
		.with_events(recorder_b.clone())
		.spawn();

	let (member, _mailbox) = a.spawn_member();
	scope_a.join("g", &member, Meta::of(&"v1")).await?;
	eventually("replicated", || scope_b.is_member("g", &member)).await?;
	let before = recorder_b.events().len();

	// a delayed duplicate from the past: older stamp, older meta
	mesh.inject(
		"a",
		"b",
		"users",
		Tagged::new(Broadcast::SyncJoin {
			group: "g".into(),
			member: member.clone(),
			meta: Meta::of(&"old"),
			stamp: 50,
			reason: Reason::Normal,
		}),
	);

	never("stale meta overwrote the membership", || {
		scope_b.members("g")[0].1 == Meta::of(&"old")
	})
	.await?;
	assert_eq!(recorder_b.events().len(), before);

	Ok(())
}

/// Replaying the same replication traffic in different orders converges to
/// the same membership on every receiver.
#[tokio::test]
async fn replication_is_order_independent() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b, c] = cluster(&mesh, "users", ["a", "b", "c"])?;
	let scope_b = b.scope("users")?;
	let scope_c = c.scope("users")?;

	let (member, _mailbox) = a.spawn_member();
	let older = Tagged::new(Broadcast::SyncJoin {
		group: "g".into(),
		member: member.clone(),
		meta: Meta::of(&"old"),
		stamp: 1_000,
		reason: Reason::Normal,
	});
	let newer = Tagged::new(Broadcast::SyncJoin {
		group: "g".into(),
		member: member.clone(),
		meta: Meta::of(&"new"),
		stamp: 2_000,
		reason: Reason::Normal,
	});

	// b sees old then new, c sees new then old
	mesh.inject("a", "b", "users", older.clone());
	mesh.inject("a", "b", "users", newer.clone());
	mesh.inject("a", "c", "users", newer);
	mesh.inject("a", "c", "users", older);

	for scope in [&scope_b, &scope_c] {
		eventually("converged on the newer meta", || {
			scope
				.members("g")
				.first()
				.is_some_and(|(_, meta)| *meta == Meta::of(&"new"))
		})
		.await?;
	}

	Ok(())
}

/// Replication traffic tagged with a different protocol version is dropped
/// without touching the indexes.
#[tokio::test]
async fn mismatched_protocol_tags_are_rejected() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_b = b.scope("users")?;

	let (member, _mailbox) = a.spawn_member();
	let mut message = Tagged::new(Broadcast::SyncJoin {
		group: "g".into(),
		member: member.clone(),
		meta: Meta::none(),
		stamp: 1_000,
		reason: Reason::Normal,
	});
	message.protocol = "/roster/scope/2".into();
	mesh.inject("a", "b", "users", message);

	never("cross-version traffic was applied", || {
		scope_b.is_member("g", &member)
	})
	.await?;

	Ok(())
}

/// A member dying is equivalent to it leaving every group it was in, with
/// the exit reason, on the owner and on every peer.
#[tokio::test]
async fn death_cascades_to_every_group_and_peer() -> Result<()> {
	let mesh = Mesh::new();
	let recorder_a = Recorder::default();
	let recorder_b = Recorder::default();

	let a = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let b = Node::builder().with_transport(mesh.endpoint("b")).build()?;
	let scope_a = a
		.build_scope("users")
		.with_events(recorder_a.clone())
		.spawn();
	let scope_b = b
		.build_scope("users")
		.with_events(recorder_b.clone())
		.spawn();

	let (member, mailbox) = a.spawn_member();
	for group in ["g1", "g2", "g3"] {
		scope_a.join(group, &member, Meta::none()).await?;
	}
	eventually("memberships replicated", || scope_b.count() == 3).await?;

	mailbox.close(ExitReason::Abnormal("took the day off".into()));

	for scope in [&scope_a, &scope_b] {
		eventually("every membership purged", || {
			scope.group_names().is_empty()
		})
		.await?;
	}

	let exit = Reason::Exit(ExitReason::Abnormal("took the day off".into()));
	for recorder in [&recorder_a, &recorder_b] {
		let exits: Vec<_> = recorder
			.of_member(member.id())
			.into_iter()
			.filter(|event| {
				event.kind == EventKind::Left && event.reason == exit
			})
			.collect();
		assert_eq!(exits.len(), 3);
	}

	Ok(())
}
