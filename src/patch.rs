//! Edit scripts produced by [`diff`](`crate::diff::diff`).
//!
//! Patches borrow from the two trees they were computed from, so they must be applied before the old tree is dropped.
//!
//! Indices refer to the live child list *before* the patch is applied. [`Patch::changes`] are listed in discovery order,
//! which is ascending by index, and must be applied in reverse so that earlier indices stay valid.

use crate::{attribute::Attr, node::Node};
use core::fmt::{self, Debug, Formatter};

pub struct Patch<'a, Msg> {
	/// Index of the patched node within its live parent.
	pub index: usize,
	/// Number of trailing live children to remove once `changes` are applied.
	pub removed: usize,
	pub changes: Vec<Change<'a, Msg>>,
	pub children: Vec<Patch<'a, Msg>>,
}

pub enum Change<'a, Msg> {
	ReplaceText { content: &'a str },
	ReplaceInnerHtml { inner_html: &'a str },
	Update { added: Vec<&'a Attr<Msg>>, removed: Vec<&'a Attr<Msg>> },
	/// Moves `count` consecutive live siblings, starting at the one keyed `key`, to before index `before`.
	Move { key: &'a str, before: usize, count: usize },
	RemoveKey { key: &'a str, count: usize },
	Replace { from: usize, count: usize, with: &'a Node<Msg> },
	Insert { children: &'a [Node<Msg>], before: usize },
	Remove { from: usize, count: usize },
}

impl<'a, Msg> Patch<'a, Msg> {
	#[must_use]
	pub fn new(index: usize) -> Self {
		Self {
			index,
			removed: 0,
			changes: Vec::new(),
			children: Vec::new(),
		}
	}

	/// Whether applying this patch would be a no-op.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.removed == 0 && self.changes.is_empty() && self.children.is_empty()
	}

	/// Shifts every top-level index by `offset`, for containers with reserved leading children.
	pub fn shift(&mut self, offset: usize) {
		for change in &mut self.changes {
			match change {
				Change::Insert { before, .. } | Change::Move { before, .. } => *before += offset,
				Change::Remove { from, .. } | Change::Replace { from, .. } => *from += offset,
				Change::ReplaceText { .. } | Change::ReplaceInnerHtml { .. } | Change::Update { .. } | Change::RemoveKey { .. } => (),
			}
		}
		for child in &mut self.children {
			child.index += offset;
		}
	}

	/// Counts changes of every kind in this patch and its descendants.
	#[must_use]
	pub fn stats(&self) -> PatchStats {
		let mut stats = PatchStats::default();
		self.collect_stats(&mut stats);
		stats
	}

	fn collect_stats(&self, stats: &mut PatchStats) {
		stats.patches += 1;
		stats.removed += self.removed;
		for change in &self.changes {
			match change {
				Change::ReplaceText { .. } | Change::ReplaceInnerHtml { .. } => stats.content += 1,
				Change::Update { .. } => stats.updates += 1,
				Change::Move { .. } => stats.moves += 1,
				Change::RemoveKey { .. } | Change::Remove { .. } => stats.removals += 1,
				Change::Replace { .. } => stats.replacements += 1,
				Change::Insert { .. } => stats.inserts += 1,
			}
		}
		for child in &self.children {
			child.collect_stats(stats);
		}
	}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PatchStats {
	pub patches: usize,
	pub removed: usize,
	pub content: usize,
	pub updates: usize,
	pub moves: usize,
	pub removals: usize,
	pub replacements: usize,
	pub inserts: usize,
}

impl<'a, Msg> Change<'a, Msg> {
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Change::ReplaceText { .. } => "ReplaceText",
			Change::ReplaceInnerHtml { .. } => "ReplaceInnerHtml",
			Change::Update { .. } => "Update",
			Change::Move { .. } => "Move",
			Change::RemoveKey { .. } => "RemoveKey",
			Change::Replace { .. } => "Replace",
			Change::Insert { .. } => "Insert",
			Change::Remove { .. } => "Remove",
		}
	}
}

impl<'a, Msg> Debug for Patch<'a, Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Patch")
			.field("index", &self.index)
			.field("removed", &self.removed)
			.field("changes", &self.changes)
			.field("children", &self.children)
			.finish()
	}
}

impl<'a, Msg> Debug for Change<'a, Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Change::ReplaceText { content } => f.debug_struct("ReplaceText").field("content", content).finish(),
			Change::ReplaceInnerHtml { inner_html } => f.debug_struct("ReplaceInnerHtml").field("inner_html", inner_html).finish(),
			Change::Update { added, removed } => f
				.debug_struct("Update")
				.field("added", &added.iter().map(|attribute| attribute.name()).collect::<Vec<_>>())
				.field("removed", &removed.iter().map(|attribute| attribute.name()).collect::<Vec<_>>())
				.finish(),
			Change::Move { key, before, count } => f.debug_struct("Move").field("key", key).field("before", before).field("count", count).finish(),
			Change::RemoveKey { key, count } => f.debug_struct("RemoveKey").field("key", key).field("count", count).finish(),
			Change::Replace { from, count, with } => f.debug_struct("Replace").field("from", from).field("count", count).field("with", &with.kind()).finish(),
			Change::Insert { children, before } => f.debug_struct("Insert").field("children", &children.len()).field("before", before).finish(),
			Change::Remove { from, count } => f.debug_struct("Remove").field("from", from).field("count", count).finish(),
		}
	}
}
