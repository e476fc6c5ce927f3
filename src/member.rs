use {
	crate::{
		id::{MemberId, NodeId},
		meta::Meta,
	},
	bytes::Bytes,
	core::{
		fmt,
		sync::atomic::{AtomicU64, Ordering},
	},
	serde::{Deserialize, Serialize},
	std::sync::Arc,
	tokio::sync::{mpsc, oneshot, watch},
};

/// A live, addressable member of the cluster.
///
/// Notes:
///
/// - This type is cheap to clone; all clones refer to the same underlying
///   member and compare equal by identity.
///
/// - The handle is location transparent: messages sent through it reach the
///   member's mailbox no matter which node the sender runs on.
///
/// - A member is alive from the moment it is spawned until its [`Mailbox`]
///   is closed or dropped. Registry scopes monitor this transition to purge
///   the member's group memberships.
#[derive(Clone)]
pub struct Member {
	inner: Arc<MemberInner>,
}

struct MemberInner {
	id: MemberId,
	inbox: mpsc::UnboundedSender<Delivery>,
	exit: watch::Receiver<Option<ExitReason>>,
}

impl Member {
	/// Creates a member owned by the given node, returning the addressable
	/// handle and the receiving-side mailbox.
	///
	/// Prefer [`Node::spawn_member`] which assigns serials; this constructor
	/// is for driving a member without a node handle.
	///
	/// [`Node::spawn_member`]: crate::Node::spawn_member
	pub fn channel(id: MemberId) -> (Self, Mailbox) {
		let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
		let (exit_tx, exit_rx) = watch::channel(None);

		let member = Self {
			inner: Arc::new(MemberInner {
				id: id.clone(),
				inbox: inbox_tx,
				exit: exit_rx,
			}),
		};

		let mailbox = Mailbox {
			id,
			inbox: inbox_rx,
			exit: exit_tx,
		};

		(member, mailbox)
	}

	pub fn id(&self) -> &MemberId {
		&self.inner.id
	}

	/// The node that owns this member.
	pub fn node(&self) -> &NodeId {
		self.inner.id.node()
	}

	/// Returns `true` while the member's mailbox has not been closed.
	pub fn is_alive(&self) -> bool {
		self.inner.exit.borrow().is_none() && !self.inner.inbox.is_closed()
	}

	/// Resolves once the member has exited, with its exit reason.
	///
	/// Resolves immediately for a member that is already dead.
	pub async fn exited(&self) -> ExitReason {
		let mut exit = self.inner.exit.clone();
		match exit.wait_for(Option::is_some).await {
			Ok(reason) => reason.clone().unwrap_or(ExitReason::Normal),
			// the watch never closes before a reason is published, but fall
			// back to a normal exit rather than hanging
			Err(_) => ExitReason::Normal,
		}
	}

	/// Delivers a fire-and-forget payload to the member's mailbox.
	///
	/// Returns `false` if the mailbox is already gone. Delivery is
	/// best-effort by design; senders that care use [`Member::call`].
	pub fn cast(&self, payload: Bytes) -> bool {
		self.inner.inbox.send(Delivery::Cast(payload)).is_ok()
	}

	/// Delivers a call envelope expecting a correlated reply. The envelope
	/// carries the membership metadata the caller holds for this member.
	pub fn call(&self, payload: Bytes, meta: Meta, reply: Replier) -> bool {
		self
			.inner
			.inbox
			.send(Delivery::Call { payload, meta, reply })
			.is_ok()
	}
}

impl PartialEq for Member {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for Member {}

impl core::hash::Hash for Member {
	fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl fmt::Debug for Member {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Member({})", self.inner.id)
	}
}

impl fmt::Display for Member {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.inner.id.fmt(f)
	}
}

/// The receiving side of a member.
///
/// The task driving the mailbox processes deliveries until it decides to
/// exit. Dropping the mailbox exits with [`ExitReason::Normal`]; use
/// [`Mailbox::close`] to exit with a specific reason.
pub struct Mailbox {
	id: MemberId,
	inbox: mpsc::UnboundedReceiver<Delivery>,
	exit: watch::Sender<Option<ExitReason>>,
}

impl Mailbox {
	pub fn id(&self) -> &MemberId {
		&self.id
	}

	/// Receives the next delivery. Returns `None` once every handle to this
	/// member has been dropped.
	pub async fn recv(&mut self) -> Option<Delivery> {
		self.inbox.recv().await
	}

	/// Exits the member with the given reason.
	pub fn close(self, reason: ExitReason) {
		self.exit.send_replace(Some(reason));
	}
}

impl Drop for Mailbox {
	fn drop(&mut self) {
		if self.exit.borrow().is_none() {
			self.exit.send_replace(Some(ExitReason::Normal));
		}
	}
}

impl fmt::Debug for Mailbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Mailbox({})", self.id)
	}
}

/// Why a member exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
	/// The member finished or its mailbox was dropped.
	Normal,

	/// The member exited abnormally, e.g. its task failed.
	Abnormal(String),
}

impl fmt::Display for ExitReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Normal => f.write_str("normal"),
			Self::Abnormal(reason) => write!(f, "abnormal: {reason}"),
		}
	}
}

/// A message delivered to a member's mailbox.
#[derive(Debug)]
pub enum Delivery {
	/// Fire-and-forget payload from a publish.
	Cast(Bytes),

	/// Scatter/gather call expecting exactly one reply through `reply`.
	/// `meta` is the membership metadata the group holds for the target.
	Call {
		payload: Bytes,
		meta: Meta,
		reply: Replier,
	},
}

/// One-shot reply channel carried inside a call envelope.
///
/// The token is fresh per call; a reply is only accepted by the caller when
/// its token matches the envelope it was issued with.
pub struct Replier {
	token: CallToken,
	tx: oneshot::Sender<(CallToken, Bytes)>,
}

impl Replier {
	pub(crate) fn channel()
	-> (Self, oneshot::Receiver<(CallToken, Bytes)>) {
		static NEXT: AtomicU64 = AtomicU64::new(1);

		let token = CallToken(NEXT.fetch_add(1, Ordering::Relaxed));
		let (tx, rx) = oneshot::channel();
		(Self { token, tx }, rx)
	}

	pub fn token(&self) -> CallToken {
		self.token
	}

	/// Sends the reply. Consumes the replier; a call can be answered once.
	pub fn send(self, payload: Bytes) {
		let _ = self.tx.send((self.token, payload));
	}
}

impl fmt::Debug for Replier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Replier({})", self.token.0)
	}
}

/// Correlation token tying a call envelope to its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallToken(u64);
