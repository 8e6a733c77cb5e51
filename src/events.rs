//! Path-addressed decoder registry.

use crate::{
	attribute::Attr,
	decode::{DecodeError, Decoder},
	node::Node,
	path::{event_key, Path},
};
use hashbrown::HashMap;
use serde_json::Value;
use tracing::{trace, trace_span};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
	#[error("no handler registered for `{name}` at {path:?}")]
	NoHandler { path: String, name: String },
	#[error(transparent)]
	Decode(#[from] DecodeError),
}

/// Maps `path ⧺ '\x0c' ⧺ event name` to the listener's decoder, and remembers which paths dispatched recently.
///
/// Kept alive across renders and updated incrementally by [`diff`](`crate::diff::diff`).
#[derive(Debug)]
pub struct EventRegistry<Msg> {
	handlers: HashMap<String, Decoder<Msg>>,
	dispatched_paths: Vec<String>,
	next_dispatched_paths: Vec<String>,
	/// Registrations held back until [`EventRegistry::commit_additions`], if deferring.
	deferred: Option<Vec<(String, Decoder<Msg>)>>,
}

impl<Msg> Default for EventRegistry<Msg> {
	fn default() -> Self {
		Self {
			handlers: HashMap::new(),
			dispatched_paths: Vec::new(),
			next_dispatched_paths: Vec::new(),
			deferred: None,
		}
	}
}

impl<Msg> EventRegistry<Msg> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}

	#[must_use]
	pub fn contains(&self, path: &Path, name: &str) -> bool {
		self.handlers.contains_key(&path.event_key(name))
	}

	/// Rotates the paths dispatched since the last tick into view, forgetting the older ones.
	pub fn tick(&mut self) {
		self.dispatched_paths = core::mem::take(&mut self.next_dispatched_paths);
	}

	pub fn mark_dispatched(&mut self, path: &str) {
		self.next_dispatched_paths.push(path.to_owned());
	}

	/// Whether any path dispatched before the last [`tick`](`EventRegistry::tick`) is a prefix of `path`.
	#[must_use]
	pub fn has_dispatched(&self, path: &Path) -> bool {
		path.matches(&self.dispatched_paths)
	}

	/// Form controls that recently dispatched at this path have their value re-synchronised even if unchanged.
	#[must_use]
	pub fn is_controlled(&self, namespace: &str, tag: &str, path: &Path) -> bool {
		namespace.is_empty() && matches!(tag, "input" | "select" | "textarea") && self.has_dispatched(path)
	}

	/// Inserts or overwrites.
	pub fn add_listener(&mut self, path: &Path, name: &str, decoder: &Decoder<Msg>) {
		let key = path.event_key(name);
		match &mut self.deferred {
			Some(deferred) => deferred.push((key, decoder.clone())),
			None => {
				self.handlers.insert(key, decoder.clone());
			}
		}
	}

	/// Holds back [`add_listener`](`EventRegistry::add_listener`) until [`commit_additions`](`EventRegistry::commit_additions`),
	/// so that removals made in between can't undo them.
	pub(crate) fn defer_additions(&mut self) {
		self.deferred.get_or_insert_with(Vec::new);
	}

	pub(crate) fn commit_additions(&mut self) {
		if let Some(deferred) = self.deferred.take() {
			trace!(count = deferred.len(), "Committing deferred registrations.");
			self.handlers.extend(deferred);
		}
	}

	pub fn remove_listener(&mut self, path: &Path, name: &str) {
		self.handlers.remove(&path.event_key(name));
	}

	/// Registers every listener in `node`'s subtree, with `node` at `index` below `parent`.
	pub fn add_child(&mut self, parent: &Path, index: usize, node: &Node<Msg>) {
		match node {
			Node::Element(element) => {
				let path = parent.add(index, &element.key);
				self.add_attributes(&path, &element.attributes);
				self.add_children(&path, 0, &element.children);
			}
			Node::RawHtml(raw_html) => {
				let path = parent.add(index, &raw_html.key);
				self.add_attributes(&path, &raw_html.attributes);
			}
			Node::Fragment(fragment) => self.add_children(parent, index + 1, &fragment.children),
			Node::Text(_) => (),
		}
	}

	pub fn add_children(&mut self, parent: &Path, mut index: usize, children: &[Node<Msg>]) {
		for child in children {
			self.add_child(parent, index, child);
			index += child.advance();
		}
	}

	fn add_attributes(&mut self, path: &Path, attributes: &[Attr<Msg>]) {
		for attribute in attributes {
			if let Attr::Listener(listener) = attribute {
				self.add_listener(path, &listener.name, &listener.decoder);
			}
		}
	}

	/// Unregisters every listener in `node`'s subtree.
	pub fn remove_child(&mut self, parent: &Path, index: usize, node: &Node<Msg>) {
		match node {
			Node::Element(element) => {
				let path = parent.add(index, &element.key);
				self.remove_attributes(&path, &element.attributes);
				self.remove_children(&path, 0, &element.children);
			}
			Node::RawHtml(raw_html) => {
				let path = parent.add(index, &raw_html.key);
				self.remove_attributes(&path, &raw_html.attributes);
			}
			Node::Fragment(fragment) => self.remove_children(parent, index + 1, &fragment.children),
			Node::Text(_) => (),
		}
	}

	pub fn remove_children(&mut self, parent: &Path, mut index: usize, children: &[Node<Msg>]) {
		for child in children {
			self.remove_child(parent, index, child);
			index += child.advance();
		}
	}

	fn remove_attributes(&mut self, path: &Path, attributes: &[Attr<Msg>]) {
		for attribute in attributes {
			if let Attr::Listener(listener) = attribute {
				self.remove_listener(path, &listener.name);
			}
		}
	}

	/// Runs the decoder registered for `name` at the rendered `path` against `payload`.
	pub fn resolve(&self, path: &str, name: &str, payload: &Value) -> Result<Msg, ResolveError> {
		let span = trace_span!("EventRegistry::resolve", name);
		let _enter = span.enter();

		let decoder = self.handlers.get(&event_key(path, name)).ok_or_else(|| ResolveError::NoHandler {
			path: path.to_owned(),
			name: name.to_owned(),
		})?;
		let message = decoder.run(payload)?;
		trace!("Decoded.");
		Ok(message)
	}
}
