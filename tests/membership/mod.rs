use {
	crate::utils::{EventKind, Recorder, eventually},
	anyhow::Result,
	roster::{Error, ExitReason, Meta, Node, Reason, builtin::Mesh},
};

#[tokio::test]
async fn join_and_query_on_one_node() -> Result<()> {
	let mesh = Mesh::new();
	let node = Node::builder()
		.with_transport(mesh.endpoint("a"))
		.with_scope("users")
		.build()?;
	let scope = node.scope("users")?;
	let (member, _mailbox) = node.spawn_member();

	scope.join("chat", &member, Meta::of(&1u32)).await?;

	assert!(scope.is_member("chat", &member));
	assert!(scope.is_local_member("chat", &member));

	let members = scope.members("chat");
	assert_eq!(members.len(), 1);
	assert_eq!(members[0].0, member);
	assert_eq!(members[0].1.decode::<u32>()?, 1);
	assert_eq!(scope.local_members("chat"), members);

	assert_eq!(scope.group_names(), vec!["chat".into()]);
	assert_eq!(scope.group_names_on(node.id()), vec!["chat".into()]);
	assert_eq!(scope.count(), 1);
	assert_eq!(scope.count_on(node.id()), 1);

	Ok(())
}

#[tokio::test]
async fn looking_up_an_unknown_scope_fails() -> Result<()> {
	let mesh = Mesh::new();
	let node = Node::builder().with_transport(mesh.endpoint("a")).build()?;

	assert!(matches!(
		node.scope("nowhere"),
		Err(Error::InvalidScope(_))
	));

	Ok(())
}

#[tokio::test]
async fn rejoining_with_identical_meta_is_a_noop() -> Result<()> {
	let mesh = Mesh::new();
	let recorder = Recorder::default();
	let node = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let scope = node
		.build_scope("users")
		.with_events(recorder.clone())
		.spawn();
	let (member, _mailbox) = node.spawn_member();

	scope.join("g", &member, Meta::of(&"m")).await?;
	scope.join("g", &member, Meta::of(&"m")).await?;

	// one membership, one callback
	assert_eq!(scope.members("g").len(), 1);
	assert_eq!(recorder.count(EventKind::Joined), 1);
	assert_eq!(recorder.count(EventKind::Updated), 0);

	Ok(())
}

#[tokio::test]
async fn rejoining_with_new_meta_updates_in_place() -> Result<()> {
	let mesh = Mesh::new();
	let recorder = Recorder::default();
	let node = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let scope = node
		.build_scope("users")
		.with_events(recorder.clone())
		.spawn();
	let (member, _mailbox) = node.spawn_member();

	scope.join("g", &member, Meta::of(&"v1")).await?;
	scope.join("g", &member, Meta::of(&"v2")).await?;

	let members = scope.members("g");
	assert_eq!(members.len(), 1);
	assert_eq!(members[0].1.decode::<String>()?, "v2");

	let events = recorder.events();
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].kind, EventKind::Joined);
	assert_eq!(events[1].kind, EventKind::Updated);
	assert_eq!(events[1].meta.decode::<String>()?, "v2");

	Ok(())
}

#[tokio::test]
async fn dead_members_cannot_join() -> Result<()> {
	let mesh = Mesh::new();
	let node = Node::builder()
		.with_transport(mesh.endpoint("a"))
		.with_scope("users")
		.build()?;
	let scope = node.scope("users")?;

	let (member, mailbox) = node.spawn_member();
	drop(mailbox);

	let result = scope.join("g", &member, Meta::none()).await;
	assert!(matches!(result, Err(Error::NotAlive)));
	assert!(scope.group_names().is_empty());

	Ok(())
}

#[tokio::test]
async fn leaving_without_membership_fails() -> Result<()> {
	let mesh = Mesh::new();
	let node = Node::builder()
		.with_transport(mesh.endpoint("a"))
		.with_scope("users")
		.build()?;
	let scope = node.scope("users")?;
	let (member, _mailbox) = node.spawn_member();

	let result = scope.leave("g", &member).await;
	assert!(matches!(result, Err(Error::NotInGroup)));

	Ok(())
}

#[tokio::test]
async fn leave_removes_a_single_membership() -> Result<()> {
	let mesh = Mesh::new();
	let recorder = Recorder::default();
	let node = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let scope = node
		.build_scope("users")
		.with_events(recorder.clone())
		.spawn();
	let (member, _mailbox) = node.spawn_member();

	scope.join("g1", &member, Meta::of(&1u8)).await?;
	scope.join("g2", &member, Meta::of(&2u8)).await?;
	scope.leave("g1", &member).await?;

	assert!(!scope.is_member("g1", &member));
	assert!(scope.is_member("g2", &member));
	assert_eq!(scope.group_names(), vec!["g2".into()]);

	let left: Vec<_> = recorder
		.events()
		.into_iter()
		.filter(|event| event.kind == EventKind::Left)
		.collect();
	assert_eq!(left.len(), 1);
	assert_eq!(left[0].group, "g1".into());
	assert_eq!(left[0].reason, Reason::Normal);

	Ok(())
}

/// The liveness monitor is shared across a member's groups: leaving some of
/// them must not stop death tracking for the rest.
#[tokio::test]
async fn monitor_survives_partial_leaves() -> Result<()> {
	let mesh = Mesh::new();
	let recorder = Recorder::default();
	let node = Node::builder().with_transport(mesh.endpoint("a")).build()?;
	let scope = node
		.build_scope("users")
		.with_events(recorder.clone())
		.spawn();
	let (member, mailbox) = node.spawn_member();

	for group in ["g1", "g2", "g3"] {
		scope.join(group, &member, Meta::none()).await?;
	}
	scope.leave("g1", &member).await?;
	scope.leave("g2", &member).await?;

	mailbox.close(ExitReason::Abnormal("crash".into()));

	eventually("death purges the remaining membership", || {
		scope.group_names().is_empty()
	})
	.await?;

	let exits: Vec<_> = recorder
		.events()
		.into_iter()
		.filter(|event| {
			event.kind == EventKind::Left
				&& event.reason
					== Reason::Exit(ExitReason::Abnormal("crash".into()))
		})
		.collect();
	assert_eq!(exits.len(), 1);
	assert_eq!(exits[0].group, "g3".into());

	Ok(())
}
