//! Keyed two-tree diffing.
//!
//! The walk merges the old and new sibling lists pairwise. Keyed siblings that changed position are
//! relocated with [`Change::Move`] rather than recreated, and unkeyed siblings are matched by position.
//!
//! `moved_offset` tracks how far the old live list has been shifted by moves, insertions and removals
//! discovered so far, so that `node_index - moved_offset` is always the *old* live index of the current old sibling.

use crate::{
	attribute::Attr,
	events::EventRegistry,
	node::{Fragment, KeyedChildren, Node},
	patch::{Change, Patch},
	path::Path,
};
use core::{cmp::Ordering, mem, slice};
use hashbrown::HashSet;
use tracing::{debug, error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, Level};

/// Properties that can drift from the rendered value without an event, so they are always re-applied.
const DRIFTING_PROPERTIES: [&str; 2] = ["scrollLeft", "scrollTop"];

/// Attributes and properties that mirror live user input in form controls.
const SYNCED: [&str; 3] = ["value", "checked", "selected"];

/// Computes the edit script that turns the live rendition of `old` into one of `new`.
///
/// Rotates `events`' dispatched paths first, then registers and unregisters listeners as the trees differ.
/// Registrations take effect after all removals, since an old and a new node can share a keyed path.
#[instrument(skip_all)]
pub fn diff<'a, Msg>(events: &mut EventRegistry<Msg>, old: &'a Node<Msg>, new: &'a Node<Msg>) -> Patch<'a, Msg> {
	events.tick();
	events.defer_additions();

	let no_keys = KeyedChildren::new();
	let patch = diff_siblings(
		events,
		&Path::root(),
		Lists {
			old: slice::from_ref(old),
			old_keyed: &no_keys,
			new: slice::from_ref(new),
			new_keyed: &no_keys,
		},
		Cursor::default(),
		Vec::new(),
		Vec::new(),
	);

	events.commit_additions();

	if STATIC_MAX_LEVEL >= Level::DEBUG {
		debug!(stats = ?patch.stats(), "Diffed.");
	}
	patch
}

struct Lists<'a, 'k, Msg> {
	old: &'a [Node<Msg>],
	old_keyed: &'k KeyedChildren,
	new: &'a [Node<Msg>],
	new_keyed: &'k KeyedChildren,
}

#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
	moved_offset: isize,
	node_index: usize,
	patch_index: usize,
}

/// The remaining old siblings, with room for one matched node pulled forward out of order.
struct Siblings<'a, Msg> {
	injected: Option<&'a Node<Msg>>,
	rest: &'a [Node<Msg>],
}

impl<'a, Msg> Siblings<'a, Msg> {
	fn first(&self) -> Option<&'a Node<Msg>> {
		self.injected.or_else(|| self.rest.first())
	}

	fn advance(&mut self) {
		if self.injected.take().is_none() {
			if let Some((_, rest)) = self.rest.split_first() {
				self.rest = rest;
			}
		}
	}

	fn inject(&mut self, node: &'a Node<Msg>) {
		debug_assert!(self.injected.is_none(), "Injected twice without consuming");
		self.injected = Some(node);
	}
}

fn signed(count: usize) -> isize {
	isize::try_from(count).unwrap_or(isize::MAX)
}

fn position(node_index: usize, moved_offset: isize) -> usize {
	usize::try_from(signed(node_index) - moved_offset).unwrap_or_else(|_| {
		error!("Computed a negative live index ({} - {}). Clamping to 0.", node_index, moved_offset);
		0
	})
}

#[allow(clippy::too_many_lines)]
fn diff_siblings<'a, Msg>(events: &mut EventRegistry<Msg>, path: &Path, lists: Lists<'a, '_, Msg>, cursor: Cursor, mut changes: Vec<Change<'a, Msg>>, mut children: Vec<Patch<'a, Msg>>) -> Patch<'a, Msg> {
	let span = if cfg!(feature = "log-paths") {
		trace_span!("diff_siblings", path = %path, old = lists.old.len(), new = lists.new.len(), node_index = cursor.node_index)
	} else {
		trace_span!("diff_siblings", old = lists.old.len(), new = lists.new.len(), node_index = cursor.node_index)
	};
	let _enter = span.enter();

	let Cursor {
		mut moved_offset,
		mut node_index,
		patch_index,
	} = cursor;
	let mut moved = HashSet::<&'a str>::new();
	let mut removed = 0;
	let mut old = Siblings { injected: None, rest: lists.old };
	let mut new = lists.new;

	loop {
		let (prev, next) = match (old.first(), new.first()) {
			(None, None) => break,
			(None, Some(_)) => {
				trace!("Inserting {} trailing node(s).", new.len());
				events.add_children(path, node_index, new);
				changes.push(Change::Insert {
					children: new,
					before: position(node_index, moved_offset),
				});
				break;
			}
			(Some(prev), None) => {
				// Moved siblings were already diffed in their new position and keep their handlers.
				if prev.key().is_empty() || !moved.contains(prev.key()) {
					removed += prev.advance();
					events.remove_child(path, node_index, prev);
					node_index += prev.advance();
				}
				old.advance();
				continue;
			}
			(Some(prev), Some(next)) => (prev, next),
		};

		let replace = if prev.key() == next.key() {
			match (prev, next) {
				(Node::Fragment(p), Node::Fragment(n)) => {
					diff_fragment(events, path, p, n, Cursor { moved_offset, node_index, patch_index: node_index }, &mut changes, &mut children);
					moved_offset += signed(n.children_count) - signed(p.children_count);
					node_index += 1 + n.children_count;
					false
				}

				(Node::Element(p), Node::Element(n)) if p.namespace == n.namespace && p.tag == n.tag => {
					let span = trace_span!("Diffing element", tag = %n.tag);
					let _enter = span.enter();

					let child_path = path.add(node_index, &n.key);
					let controlled = events.is_controlled(&n.namespace, &n.tag, &child_path);
					let initial = diff_attributes(events, &child_path, controlled, &p.attributes, &n.attributes).into_iter().collect();
					let child = diff_siblings(
						events,
						&child_path,
						Lists {
							old: &p.children,
							old_keyed: &p.keyed_children,
							new: &n.children,
							new_keyed: &n.keyed_children,
						},
						Cursor {
							moved_offset: 0,
							node_index: 0,
							patch_index: node_index,
						},
						initial,
						Vec::new(),
					);
					if !child.is_empty() {
						children.push(child);
					}
					node_index += 1;
					false
				}

				(Node::Text(p), Node::Text(n)) => {
					if p.content != n.content {
						if cfg!(feature = "dangerous-logging") {
							trace!("Text changed from {:?} to {:?}.", p.content, n.content);
						}
						let mut child = Patch::new(node_index);
						child.changes.push(Change::ReplaceText { content: &n.content });
						children.push(child);
					}
					node_index += 1;
					false
				}

				(Node::RawHtml(p), Node::RawHtml(n)) if p.namespace == n.namespace && p.tag == n.tag => {
					let child_path = path.add(node_index, &n.key);
					let mut child = Patch::new(node_index);
					child.changes.extend(diff_attributes(events, &child_path, false, &p.attributes, &n.attributes));
					if p.inner_html != n.inner_html {
						child.changes.push(Change::ReplaceInnerHtml { inner_html: &n.inner_html });
					}
					if !child.is_empty() {
						children.push(child);
					}
					node_index += 1;
					false
				}

				_ => true,
			}
		} else {
			let next_did_exist = lists.old_keyed.get(next.key()).and_then(|&matched| {
				let node = lists.old.get(matched);
				if node.is_none() {
					error!("Keyed child index {} is out of bounds.", matched);
				}
				node
			});
			let prev_does_exist = lists.new_keyed.contains_key(prev.key());
			match (prev_does_exist, next_did_exist) {
				(true, Some(_)) if moved.contains(prev.key()) => {
					trace!("Skipping an already moved node.");
					moved_offset -= signed(prev.advance());
					old.advance();
					continue;
				}

				(true, Some(matched)) => {
					moved.insert(next.key());
					let before = position(node_index, moved_offset);

					if let (Node::Fragment(p), Node::Fragment(n)) = (matched, next) {
						// Listed after the fragment's own changes, the move applies first, so those are diffed where the fragment lands.
						diff_fragment(events, path, p, n, Cursor { moved_offset, node_index, patch_index: node_index }, &mut changes, &mut children);
						changes.push(Change::Move {
							key: next.key(),
							before,
							count: matched.advance(),
						});
						moved_offset += signed(next.advance());
						node_index += next.advance();
						new = &new[1..];
						continue;
					}

					if patchable(matched, next) {
						changes.push(Change::Move { key: next.key(), before, count: 1 });
						moved_offset += 1;
						old.inject(matched);
						continue;
					}

					// Same key, different kind or tag: drop the old node by key where it is and build the new one here.
					// Changes apply in reverse, so listing the removal last lets the key find the old node.
					trace!("Replacing a keyed node that changed kind while moving.");
					let count = next.advance();
					events.remove_child(path, node_index, matched);
					events.add_child(path, node_index, next);
					changes.push(Change::Insert { children: slice::from_ref(next), before });
					changes.push(Change::RemoveKey {
						key: next.key(),
						count: matched.advance(),
					});
					moved_offset += signed(count);
					node_index += count;
					new = &new[1..];
					continue;
				}

				(false, Some(_)) => {
					let count = prev.advance();
					let from = position(node_index, moved_offset);
					events.remove_child(path, node_index, prev);
					changes.push(if prev.key().is_empty() {
						Change::Remove { from, count }
					} else {
						Change::RemoveKey { key: prev.key(), count }
					});
					moved_offset -= signed(count);
					old.advance();
					continue;
				}

				(true, None) => {
					let count = next.advance();
					events.add_child(path, node_index, next);
					changes.push(Change::Insert {
						children: slice::from_ref(next),
						before: position(node_index, moved_offset),
					});
					moved_offset += signed(count);
					node_index += count;
					new = &new[1..];
					continue;
				}

				(false, None) => true,
			}
		};

		if replace {
			let prev_count = prev.advance();
			let next_count = next.advance();
			trace!("Replacing {} ({} node(s)) with {} ({} node(s)).", prev.kind(), prev_count, next.kind(), next_count);
			changes.push(Change::Replace {
				from: position(node_index, moved_offset),
				count: prev_count,
				with: next,
			});
			events.remove_child(path, node_index, prev);
			events.add_child(path, node_index, next);
			moved_offset += signed(next_count) - signed(prev_count);
			node_index += next_count;
		}

		old.advance();
		new = &new[1..];
	}

	Patch {
		index: patch_index,
		removed,
		changes,
		children,
	}
}

/// Diffs the children of a fragment whose head is live at `cursor.node_index`, appending to the enclosing list's changes.
///
/// Removals trail the fragment's new children and are listed first, so they apply last.
fn diff_fragment<'a, Msg>(events: &mut EventRegistry<Msg>, path: &Path, p: &'a Fragment<Msg>, n: &'a Fragment<Msg>, cursor: Cursor, changes: &mut Vec<Change<'a, Msg>>, children: &mut Vec<Patch<'a, Msg>>) {
	let span = trace_span!("Diffing fragment", old = p.children_count, new = n.children_count);
	let _enter = span.enter();

	let child = diff_siblings(
		events,
		path,
		Lists {
			old: &p.children,
			old_keyed: &p.keyed_children,
			new: &n.children,
			new_keyed: &n.keyed_children,
		},
		Cursor {
			node_index: cursor.node_index + 1,
			..cursor
		},
		Vec::new(),
		mem::take(children),
	);
	if child.removed > 0 {
		changes.push(Change::Remove {
			from: position(cursor.node_index + 1 + n.children_count, cursor.moved_offset),
			count: child.removed,
		});
	}
	changes.extend(child.changes);
	*children = child.children;
}

/// Whether `old`'s live node can be updated into `new` rather than rebuilt. Fragments are handled separately.
fn patchable<Msg>(old: &Node<Msg>, new: &Node<Msg>) -> bool {
	match (old, new) {
		(Node::Text(_), Node::Text(_)) => true,
		(Node::Element(p), Node::Element(n)) => p.namespace == n.namespace && p.tag == n.tag,
		(Node::RawHtml(p), Node::RawHtml(n)) => p.namespace == n.namespace && p.tag == n.tag,
		_ => false,
	}
}

/// Walks two name-sorted attribute lists side by side.
fn diff_attributes<'a, Msg>(events: &mut EventRegistry<Msg>, path: &Path, controlled: bool, old: &'a [Attr<Msg>], new: &'a [Attr<Msg>]) -> Option<Change<'a, Msg>> {
	let mut added = Vec::new();
	let mut removed = Vec::new();
	let (mut i, mut j) = (0, 0);

	loop {
		let ordering = match (old.get(i), new.get(j)) {
			(None, None) => break,
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(Some(prev), Some(next)) => prev.name().cmp(next.name()),
		};

		match ordering {
			Ordering::Less => {
				let prev = &old[i];
				if let Attr::Listener(listener) = prev {
					events.remove_listener(path, &listener.name);
				}
				removed.push(prev);
				i += 1;
			}

			Ordering::Greater => {
				let next = &new[j];
				if let Attr::Listener(listener) = next {
					events.add_listener(path, &listener.name, &listener.decoder);
				}
				added.push(next);
				j += 1;
			}

			Ordering::Equal => {
				let (prev, next) = (&old[i], &new[j]);
				match (prev, next) {
					(Attr::Attribute { name, value: a }, Attr::Attribute { value: b, .. }) => {
						if a != b || (controlled && SYNCED.contains(&name.as_str())) {
							added.push(next);
						}
					}
					(Attr::Property { name, value: a }, Attr::Property { value: b, .. }) => {
						if a != b || DRIFTING_PROPERTIES.contains(&name.as_str()) || (controlled && SYNCED.contains(&name.as_str())) {
							added.push(next);
						}
					}
					(Attr::Listener(a), Attr::Listener(b)) => {
						events.add_listener(path, &b.name, &b.decoder);
						if a.config_differs(b) {
							added.push(next);
						}
					}
					(Attr::Listener(a), _) => {
						events.remove_listener(path, &a.name);
						removed.push(prev);
						added.push(next);
					}
					(_, Attr::Listener(b)) => {
						events.add_listener(path, &b.name, &b.decoder);
						removed.push(prev);
						added.push(next);
					}
					_ => {
						removed.push(prev);
						added.push(next);
					}
				}
				i += 1;
				j += 1;
			}
		}
	}

	if added.is_empty() && removed.is_empty() {
		None
	} else {
		Some(Change::Update { added, removed })
	}
}
