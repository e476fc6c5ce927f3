use {
	crate::utils::{cluster, eventually, millis, secs},
	anyhow::Result,
	bytes::Bytes,
	roster::{Delivery, Mailbox, Meta, builtin::Mesh},
	tokio::sync::mpsc,
};

/// Drives a member task that forwards every cast payload to a channel.
fn collect_casts(
	mut mailbox: Mailbox,
	sink: mpsc::UnboundedSender<Bytes>,
) {
	tokio::spawn(async move {
		while let Some(delivery) = mailbox.recv().await {
			if let Delivery::Cast(payload) = delivery {
				let _ = sink.send(payload);
			}
		}
	});
}

/// Drives a member task that answers every call after a delay.
fn answer_calls(mut mailbox: Mailbox, answer: &'static [u8], delay_ms: u64) {
	tokio::spawn(async move {
		while let Some(delivery) = mailbox.recv().await {
			if let Delivery::Call { reply, .. } = delivery {
				tokio::time::sleep(millis(delay_ms)).await;
				reply.send(Bytes::from_static(answer));
			}
		}
	});
}

#[tokio::test]
async fn publish_reaches_every_member_on_every_node() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_a = a.scope("users")?;
	let scope_b = b.scope("users")?;

	let (member_a, mailbox_a) = a.spawn_member();
	let (member_b, mailbox_b) = b.spawn_member();
	let (tx_a, mut rx_a) = mpsc::unbounded_channel();
	let (tx_b, mut rx_b) = mpsc::unbounded_channel();
	collect_casts(mailbox_a, tx_a);
	collect_casts(mailbox_b, tx_b);

	scope_a.join("room", &member_a, Meta::none()).await?;
	scope_b.join("room", &member_b, Meta::none()).await?;
	eventually("memberships replicated", || {
		scope_a.members("room").len() == 2
			&& scope_b.members("room").len() == 2
	})
	.await?;

	// published from a, received by the local and the remote member
	let reached = scope_a.publish("room", Bytes::from_static(b"hello"));
	assert_eq!(reached, 2);

	assert_eq!(&rx_a.recv().await.unwrap()[..], b"hello");
	assert_eq!(&rx_b.recv().await.unwrap()[..], b"hello");

	Ok(())
}

#[tokio::test]
async fn local_publish_skips_remote_members() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_a = a.scope("users")?;
	let scope_b = b.scope("users")?;

	let (member_a, mailbox_a) = a.spawn_member();
	let (member_b, mailbox_b) = b.spawn_member();
	let (tx_a, mut rx_a) = mpsc::unbounded_channel();
	let (tx_b, mut rx_b) = mpsc::unbounded_channel();
	collect_casts(mailbox_a, tx_a);
	collect_casts(mailbox_b, tx_b);

	scope_a.join("room", &member_a, Meta::none()).await?;
	scope_b.join("room", &member_b, Meta::none()).await?;
	eventually("memberships replicated", || {
		scope_a.members("room").len() == 2
	})
	.await?;

	let reached = scope_a.local_publish("room", Bytes::from_static(b"ping"));
	assert_eq!(reached, 1);

	assert_eq!(&rx_a.recv().await.unwrap()[..], b"ping");
	tokio::time::sleep(millis(100)).await;
	assert!(rx_b.try_recv().is_err());

	Ok(())
}

/// One member answers, one dies mid-call, one never answers. The answer is
/// collected, the other two come back as bad replies, and the whole call is
/// bounded by the timeout rather than by the slowest member.
#[tokio::test]
async fn multi_call_collects_replies_and_failures() -> Result<()> {
	let mesh = Mesh::new();
	let [a, b] = cluster(&mesh, "users", ["a", "b"])?;
	let scope_a = a.scope("users")?;
	let scope_b = b.scope("users")?;

	// answers quickly
	let (responsive, mailbox) = a.spawn_member();
	answer_calls(mailbox, b"ok", 10);

	// dies on first contact without replying
	let (doomed, mut doomed_mailbox) = b.spawn_member();
	tokio::spawn(async move {
		if let Some(Delivery::Call { reply, .. }) = doomed_mailbox.recv().await
		{
			drop(reply);
			drop(doomed_mailbox);
		}
	});

	// stays silent
	let (silent, _silent_mailbox) = a.spawn_member();

	scope_a.join("room", &responsive, Meta::of(&"r")).await?;
	scope_b.join("room", &doomed, Meta::of(&"d")).await?;
	scope_a.join("room", &silent, Meta::of(&"s")).await?;
	eventually("memberships replicated", || {
		scope_a.members("room").len() == 3
	})
	.await?;

	let started = tokio::time::Instant::now();
	let result = scope_a
		.multi_call("room", Bytes::from_static(b"status?"), millis(300))
		.await;
	assert!(started.elapsed() < secs(2));

	assert_eq!(result.replies.len(), 1);
	let ((replied, meta), payload) = &result.replies[0];
	assert_eq!(replied, &responsive);
	assert_eq!(meta.decode::<String>()?, "r");
	assert_eq!(&payload[..], b"ok");

	let mut bad: Vec<_> = result
		.bad_replies
		.iter()
		.map(|(member, _)| member.clone())
		.collect();
	bad.sort_by(|x, y| x.id().cmp(y.id()));
	let mut expected = vec![doomed.clone(), silent.clone()];
	expected.sort_by(|x, y| x.id().cmp(y.id()));
	assert_eq!(bad, expected);

	Ok(())
}

#[tokio::test]
async fn multi_call_on_an_empty_group_returns_nothing() -> Result<()> {
	let mesh = Mesh::new();
	let [a] = cluster(&mesh, "users", ["a"])?;
	let scope = a.scope("users")?;

	let result = scope
		.multi_call("void", Bytes::from_static(b"anyone?"), millis(100))
		.await;
	assert!(result.replies.is_empty());
	assert!(result.bad_replies.is_empty());

	Ok(())
}
