//! Distributed process-group registry.
//!
//! `roster` maintains, across a cluster of peer nodes, a replicated mapping
//! from group names to sets of live member handles, each carrying caller
//! metadata. Any node can query the full membership of any group, publish a
//! message to all members, or scatter/gather a call over a group.
//!
//! Notes:
//!
//! - The registry is organized in named [`Scope`]s. Scopes are independent:
//!   each one replicates on its own and scopes with different names never
//!   interact.
//!
//! - Replication is eventually consistent, last-writer-wins by timestamps
//!   that each membership's owner node assigns. Member death and node
//!   departure purge memberships automatically; nodes that reconnect
//!   exchange full snapshots to repair divergence.
//!
//! - Moving messages between nodes is delegated to a [`Transport`]
//!   implementation. The [`builtin::Mesh`] transport connects nodes inside
//!   one process, which is how the integration tests simulate clusters,
//!   partitions and heals.
//!
//! [`Transport`]: transport::Transport

mod error;
mod id;
mod member;
mod meta;
mod monitor;
mod node;
mod primitives;
mod scope;

pub mod builtin;
pub mod transport;

pub use {
	error::Error,
	id::{GroupName, MemberId, MonitorRef, NodeId, ScopeName},
	member::{CallToken, Delivery, ExitReason, Mailbox, Member, Replier},
	meta::Meta,
	node::{Node, NodeBuilder, ScopeBuilder},
	scope::{MultiCall, Scope, events::{Reason, ScopeEvents}, wire},
};
