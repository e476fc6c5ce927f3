use {
	crate::{
		id::{GroupName, MemberId, MonitorRef, NodeId},
		member::Member,
		meta::Meta,
	},
	im::OrdMap,
	itertools::Itertools,
	parking_lot::RwLock,
	std::sync::Arc,
};

/// One registered membership.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
	pub member: Member,
	pub meta: Meta,

	/// Wall-clock timestamp assigned by the owner node; the last-writer-wins
	/// discriminant for this `(group, member)` pair.
	pub stamp: u64,

	/// Monitor subscription reference, present iff the entry is owned by the
	/// local node. Remote deaths arrive as `sync_leave` broadcasts instead.
	pub monitor: Option<MonitorRef>,
}

impl Entry {
	pub fn owner(&self) -> &NodeId {
		self.member.node()
	}
}

/// The dual-index membership store of one scope.
///
/// Notes:
///
/// - This type is cheap to clone; all clones refer to the same underlying
///   indexes. The scope worker holds the writing clone, query surfaces hold
///   reading clones.
///
/// - Both indexes hold the same set of entries with opposite key
///   orientation: `by_group` serves group iteration, `by_member` serves
///   death-driven purges without a full scan.
///
/// - Writes happen only on the scope worker; readers take the lock briefly
///   and clone persistent-map snapshots out. A reader may observe a snapshot
///   mixing pre- and post-states of unrelated entries, never a torn entry.
#[derive(Clone, Default)]
pub(crate) struct Store {
	inner: Arc<RwLock<Indexes>>,
}

#[derive(Default)]
struct Indexes {
	by_group: OrdMap<GroupName, OrdMap<MemberId, Entry>>,
	by_member: OrdMap<MemberId, OrdMap<GroupName, Entry>>,
}

/// Write API, exercised only by the scope worker.
impl Store {
	/// Writes the entry into both indexes, returning the previous entry for
	/// the same `(group, member)` pair if there was one.
	pub fn insert(&self, group: GroupName, entry: Entry) -> Option<Entry> {
		let member = entry.member.id().clone();
		let mut indexes = self.inner.write();

		let mut members =
			indexes.by_group.get(&group).cloned().unwrap_or_default();
		let previous = members.insert(member.clone(), entry.clone());
		indexes.by_group.insert(group.clone(), members);

		let mut groups =
			indexes.by_member.get(&member).cloned().unwrap_or_default();
		groups.insert(group, entry);
		indexes.by_member.insert(member, groups);

		previous
	}

	/// Deletes the entry from both indexes. Empty groups vanish.
	pub fn remove(
		&self,
		group: &GroupName,
		member: &MemberId,
	) -> Option<Entry> {
		let mut indexes = self.inner.write();

		let removed = match indexes.by_group.get_mut(group) {
			Some(members) => {
				let removed = members.remove(member);
				if members.is_empty() {
					indexes.by_group.remove(group);
				}
				removed
			}
			None => None,
		};

		if removed.is_some()
			&& let Some(groups) = indexes.by_member.get_mut(member)
		{
			groups.remove(group);
			if groups.is_empty() {
				indexes.by_member.remove(member);
			}
		}

		removed
	}
}

/// Read API.
impl Store {
	pub fn get(&self, group: &GroupName, member: &MemberId) -> Option<Entry> {
		self
			.inner
			.read()
			.by_group
			.get(group)
			.and_then(|members| members.get(member))
			.cloned()
	}

	/// All entries of a group, ordered by member id.
	pub fn members(&self, group: &GroupName) -> Vec<Entry> {
		let snapshot = self.inner.read().by_group.get(group).cloned();
		snapshot
			.map(|members| members.values().cloned().collect())
			.unwrap_or_default()
	}

	/// All groups a member is in, with the stored entries.
	pub fn memberships(&self, member: &MemberId) -> Vec<(GroupName, Entry)> {
		let snapshot = self.inner.read().by_member.get(member).cloned();
		snapshot
			.map(|groups| groups.into_iter().collect())
			.unwrap_or_default()
	}

	/// `true` if any entry for the member remains in any group.
	pub fn has_member(&self, member: &MemberId) -> bool {
		self.inner.read().by_member.contains_key(member)
	}

	/// Every entry owned by the given node, as `(group, entry)` pairs.
	pub fn owned_by(&self, node: &NodeId) -> Vec<(GroupName, Entry)> {
		let snapshot = self.inner.read().by_member.clone();
		snapshot
			.into_iter()
			.filter(|(member, _)| member.node() == node)
			.flat_map(|(_, groups)| groups.into_iter())
			.collect()
	}

	/// Every entry NOT owned by the given node, as `(group, entry)` pairs.
	pub fn foreign(&self, node: &NodeId) -> Vec<(GroupName, Entry)> {
		let snapshot = self.inner.read().by_member.clone();
		snapshot
			.into_iter()
			.filter(|(member, _)| member.node() != node)
			.flat_map(|(_, groups)| groups.into_iter())
			.collect()
	}

	/// Deduplicated names of all non-empty groups.
	pub fn group_names(&self) -> Vec<GroupName> {
		self.inner.read().by_group.keys().cloned().collect()
	}

	/// Deduplicated names of groups with at least one member owned by the
	/// given node.
	pub fn group_names_on(&self, node: &NodeId) -> Vec<GroupName> {
		let snapshot = self.inner.read().by_member.clone();
		snapshot
			.into_iter()
			.filter(|(member, _)| member.node() == node)
			.flat_map(|(_, groups)| groups.into_iter().map(|(group, _)| group))
			.sorted()
			.dedup()
			.collect()
	}

	pub fn count(&self) -> usize {
		self.inner.read().by_group.len()
	}

	pub fn count_on(&self, node: &NodeId) -> usize {
		self.group_names_on(node).len()
	}
}

#[cfg(test)]
impl Store {
	pub fn is_empty(&self) -> bool {
		self.inner.read().by_group.is_empty()
	}

	/// Both indexes hold exactly the same `(group, member, stamp)` tuples.
	pub fn is_symmetric(&self) -> bool {
		let indexes = self.inner.read();

		let by_group: Vec<_> = indexes
			.by_group
			.iter()
			.flat_map(|(group, members)| {
				members.iter().map(move |(member, entry)| {
					(group.clone(), member.clone(), entry.stamp)
				})
			})
			.sorted()
			.collect();

		let by_member: Vec<_> = indexes
			.by_member
			.iter()
			.flat_map(|(member, groups)| {
				groups.iter().map(move |(group, entry)| {
					(group.clone(), member.clone(), entry.stamp)
				})
			})
			.sorted()
			.collect();

		by_group == by_member
	}
}
