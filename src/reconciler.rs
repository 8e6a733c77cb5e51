//! Applies [`Patch`]es to a live tree and turns live events into [`EventDispatch`]es.
//!
//! Engine state for live nodes (keys, keyed siblings, listener configuration and timers) is kept in a side
//! table keyed by [`Host::node_id`] rather than on the nodes themselves. Entries are released together with
//! their node's subtree.

use crate::{
	attribute::{Attr, Listener, DEFAULT_VALUE},
	host::{Host, FORM_DATA},
	node::Node,
	patch::{Change, Patch},
	path::{Path, Segment},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use serde_json::Value;
use std::{cell::Cell, rc::Rc};
use tracing::{debug, error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// An event that passed its listener's modifiers, ready to be resolved against the
/// [`EventRegistry`](`crate::events::EventRegistry`).
#[derive(Debug, Clone, PartialEq)]
pub struct EventDispatch {
	pub path: String,
	pub name: String,
	pub payload: Value,
	pub immediate: bool,
}

/// Always extracted for `input` and `change` events.
const FORM_EVENT_PATHS: [&str; 2] = ["target.value", "target.checked"];

/// Receives events released by debounce timers.
pub type DispatchFn = Rc<dyn Fn(EventDispatch)>;

#[derive(Debug)]
struct Handler {
	prevent_default: bool,
	stop_propagation: bool,
	immediate: bool,
	include: Vec<String>,
}

#[derive(Debug)]
struct Throttle {
	delay: u32,
	last: Option<f64>,
	/// Sequence number of the event that last passed, so a trailing debounce can skip it.
	last_event: Rc<Cell<u64>>,
}

#[derive(Debug)]
struct Debouncer<T> {
	delay: u32,
	timer: Option<T>,
}

struct NodeMeta<H: Host> {
	key: Rc<str>,
	keyed_children: HashMap<Rc<str>, H::Node>,
	handlers: HashMap<String, Handler>,
	throttles: HashMap<String, Throttle>,
	debouncers: HashMap<String, Debouncer<H::Timer>>,
}

impl<H: Host> NodeMeta<H> {
	fn new(key: Rc<str>) -> Self {
		Self {
			key,
			keyed_children: HashMap::new(),
			handlers: HashMap::new(),
			throttles: HashMap::new(),
			debouncers: HashMap::new(),
		}
	}
}

pub struct Reconciler<H: Host> {
	host: H,
	root: H::Node,
	offset: usize,
	meta: HashMap<u64, NodeMeta<H>>,
	dispatch: DispatchFn,
	event_sequence: u64,
}

impl<H: Host> Debug for Reconciler<H> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reconciler")
			.field("root", &self.root)
			.field("offset", &self.offset)
			.field("tracked_nodes", &self.meta.len())
			.finish_non_exhaustive()
	}
}

impl<H: Host> Reconciler<H> {
	/// Manages the children of `root`. The root's own attributes are left alone.
	#[must_use]
	pub fn new(host: H, root: H::Node, dispatch: DispatchFn) -> Self {
		let mut meta = HashMap::new();
		meta.insert(host.node_id(&root), NodeMeta::new(Rc::from("")));
		Self {
			host,
			root,
			offset: 0,
			meta,
			dispatch,
			event_sequence: 0,
		}
	}

	#[must_use]
	pub fn host(&self) -> &H {
		&self.host
	}

	#[must_use]
	pub fn root(&self) -> &H::Node {
		&self.root
	}

	#[must_use]
	pub fn offset(&self) -> usize {
		self.offset
	}

	/// Reserves the first `offset` children of the root for content not managed by the engine.
	pub fn set_offset(&mut self, offset: usize) {
		self.offset = offset;
	}

	/// How many live nodes currently have engine metadata attached, including the root.
	#[must_use]
	pub fn tracked_nodes(&self) -> usize {
		self.meta.len()
	}

	/// Constructs `node` from scratch and appends it to the root.
	pub fn render<Msg>(&mut self, node: &Node<Msg>) {
		let root = self.root.clone();
		let nodes = self.create_child(&root, node);
		self.host.insert_before(&root, &nodes, None);
	}

	/// Attaches metadata to an existing live `node` below `parent`.
	pub(crate) fn adopt(&mut self, parent: &H::Node, node: &H::Node, key: &Rc<str>) {
		self.init_meta(parent, node, key);
	}

	#[instrument(skip_all)]
	pub fn push<Msg>(&mut self, mut patch: Patch<'_, Msg>) {
		if self.offset > 0 {
			patch.shift(self.offset);
		}

		let mut stack = vec![(self.root.clone(), patch)];
		while let Some((node, patch)) = stack.pop() {
			let Patch { removed, changes, children, .. } = patch;

			for change in changes.into_iter().rev() {
				self.apply(&node, change);
			}

			if removed > 0 {
				let count = self.host.child_count(&node);
				if count < removed {
					error!("Expected at least {} trailing child node(s) to remove, but found only {}.", removed, count);
				}
				let first = self.host.child_at(&node, count.saturating_sub(removed));
				self.remove_from(&node, first, removed);
			}

			let mut last: Option<(usize, H::Node)> = None;
			for child in children.into_iter().rev() {
				let index = child.index;
				let live = match &last {
					Some((last_index, last_node)) if *last_index == index + 1 => self.host.previous_sibling(last_node),
					_ => self.host.child_at(&node, index),
				};
				match live {
					Some(live) => {
						last = Some((index, live.clone()));
						stack.push((live, child));
					}
					None => {
						error!("Expected a child node at index {} to patch, but found none. Skipping.", index);
						last = None;
					}
				}
			}
		}
	}

	fn apply<Msg>(&mut self, node: &H::Node, change: Change<'_, Msg>) {
		let span = trace_span!("apply", change = change.kind());
		let _enter = span.enter();

		match change {
			Change::Insert { children, before } => {
				let nodes = self.create_children(node, children);
				let reference = self.host.child_at(node, before);
				self.host.insert_before(node, &nodes, reference.as_ref());
			}

			Change::Move { key, before, count } => {
				let mut moving = self.keyed_child(node, key);
				let reference = self.host.child_at(node, before);
				for _ in 0..count {
					let current = match moving {
						Some(current) => current,
						None => {
							error!("Ran out of siblings while moving {} node(s).", count);
							break;
						}
					};
					moving = self.host.next_sibling(&current);
					self.host.move_before(node, &current, reference.as_ref());
				}
			}

			Change::RemoveKey { key, count } => {
				let child = self.keyed_child(node, key);
				self.remove_from(node, child, count);
			}

			Change::Remove { from, count } => {
				let child = self.host.child_at(node, from);
				self.remove_from(node, child, count);
			}

			Change::Replace { from, count, with } => {
				let child = self.host.child_at(node, from);
				self.remove_from(node, child, count);
				let nodes = self.create_child(node, with);
				let reference = self.host.child_at(node, from);
				self.host.insert_before(node, &nodes, reference.as_ref());
			}

			Change::ReplaceText { content } => self.host.set_text(node, content),

			Change::ReplaceInnerHtml { inner_html } => self.host.set_inner_html(node, inner_html),

			Change::Update { added, removed } => {
				for attribute in removed {
					self.remove_attribute(node, attribute);
				}
				for attribute in added {
					self.create_attribute(node, attribute);
				}
			}
		}
	}

	fn keyed_child(&self, parent: &H::Node, key: &str) -> Option<H::Node> {
		let child = self.meta.get(&self.host.node_id(parent)).and_then(|meta| meta.keyed_children.get(key)).cloned();
		if child.is_none() {
			if cfg!(feature = "dangerous-logging") {
				error!("No live child keyed {:?}.", key);
			} else {
				error!("No live child with the requested key.");
			}
		}
		child
	}

	/// Removes `count` consecutive siblings starting at `child`.
	fn remove_from(&mut self, parent: &H::Node, mut child: Option<H::Node>, count: usize) {
		let parent_id = self.host.node_id(parent);
		for _ in 0..count {
			let current = match child {
				Some(current) => current,
				None => {
					error!("Ran out of siblings while removing {} node(s).", count);
					break;
				}
			};
			child = self.host.next_sibling(&current);

			let id = self.host.node_id(&current);
			let key = self.meta.get(&id).map(|meta| Rc::clone(&meta.key)).filter(|key| !key.is_empty());
			if let (Some(key), Some(parent_meta)) = (key, self.meta.get_mut(&parent_id)) {
				let host = &self.host;
				if parent_meta.keyed_children.get(&key).map_or(false, |keyed| host.node_id(keyed) == id) {
					parent_meta.keyed_children.remove(&key);
				}
			}

			self.release(&current);
			self.host.remove_child(parent, &current);
		}
	}

	/// Drops the metadata of `node`'s subtree, cancelling pending debounce timers.
	fn release(&mut self, node: &H::Node) {
		if let Some(meta) = self.meta.remove(&self.host.node_id(node)) {
			for debouncer in meta.debouncers.values() {
				if let Some(timer) = debouncer.timer {
					trace!("Cancelling a pending debounce.");
					self.host.clear_timeout(timer);
				}
			}
		}
		for child in self.host.children(node) {
			self.release(&child);
		}
	}

	fn init_meta(&mut self, parent: &H::Node, node: &H::Node, key: &Rc<str>) {
		self.meta.insert(self.host.node_id(node), NodeMeta::new(Rc::clone(key)));
		if key.is_empty() {
			return;
		}
		match self.meta.get_mut(&self.host.node_id(parent)) {
			Some(parent_meta) => {
				if parent_meta.keyed_children.insert(Rc::clone(key), node.clone()).is_some() && STATIC_MAX_LEVEL >= Level::WARN {
					warn!("Replaced a live keyed sibling. Are sibling keys unique?");
				}
			}
			None => error!("Created a keyed node below an untracked parent."),
		}
	}

	fn create_children<Msg>(&mut self, parent: &H::Node, children: &[Node<Msg>]) -> Vec<H::Node> {
		let mut nodes = Vec::with_capacity(children.len());
		for child in children {
			nodes.extend(self.create_child(parent, child));
		}
		nodes
	}

	/// Builds the live nodes for `node`, which will be inserted below `parent`.
	///
	/// A fragment yields an empty text head followed by its flattened children.
	fn create_child<Msg>(&mut self, parent: &H::Node, node: &Node<Msg>) -> Vec<H::Node> {
		match node {
			Node::Element(element) => {
				let live = self.host.create_element(&element.namespace, &element.tag);
				self.init_meta(parent, &live, &element.key);
				for attribute in &element.attributes {
					self.create_attribute(&live, attribute);
				}
				let children = self.create_children(&live, &element.children);
				if !children.is_empty() {
					self.host.insert_before(&live, &children, None);
				}
				vec![live]
			}

			Node::Text(text) => {
				let live = self.host.create_text(&text.content);
				self.init_meta(parent, &live, &text.key);
				vec![live]
			}

			Node::Fragment(fragment) => {
				let head = self.host.create_text("");
				self.init_meta(parent, &head, &fragment.key);
				let mut nodes = vec![head];
				nodes.extend(self.create_children(parent, &fragment.children));
				nodes
			}

			Node::RawHtml(raw_html) => {
				let live = self.host.create_element(&raw_html.namespace, &raw_html.tag);
				self.init_meta(parent, &live, &raw_html.key);
				for attribute in &raw_html.attributes {
					self.create_attribute(&live, attribute);
				}
				self.host.set_inner_html(&live, &raw_html.inner_html);
				vec![live]
			}
		}
	}

	fn create_attribute<Msg>(&mut self, node: &H::Node, attribute: &Attr<Msg>) {
		match attribute {
			Attr::Attribute { name, value } if name == DEFAULT_VALUE => self.host.set_property(node, "defaultValue", &Value::String(value.clone())),

			Attr::Attribute { name, value } => {
				if self.host.get_attribute(node, name).as_deref() != Some(value.as_str()) {
					self.host.set_attribute(node, name, value);
				}
				match name.as_str() {
					"checked" | "selected" => self.host.set_property(node, name, &Value::Bool(true)),
					"value" => self.host.set_property(node, name, &Value::String(value.clone())),
					"autofocus" => {
						let host = self.host.clone();
						let node = node.clone();
						self.host.queue_microtask(Box::new(move || host.focus(&node)));
					}
					"autoplay" => self.play(node),
					_ => (),
				}
			}

			Attr::Property { name, value } => {
				self.host.set_property(node, name, value);
				if name == "autoplay" && value == &Value::Bool(true) {
					self.play(node);
				}
			}

			Attr::Listener(listener) => self.add_listener(node, listener),
		}
	}

	fn play(&self, node: &H::Node) {
		if let Err(error) = self.host.play(node) {
			error!("Autoplay failed: {}", error);
		}
	}

	fn remove_attribute<Msg>(&mut self, node: &H::Node, attribute: &Attr<Msg>) {
		match attribute {
			Attr::Listener(listener) => self.remove_listener(node, &listener.name),
			Attr::Attribute { name, .. } | Attr::Property { name, .. } => {
				if name == DEFAULT_VALUE {
					return;
				}
				self.host.remove_attribute(node, name);
				if matches!(name.as_str(), "checked" | "selected") {
					self.host.set_property(node, name, &Value::Bool(false));
				}
			}
		}
	}

	fn add_listener<Msg>(&mut self, node: &H::Node, listener: &Listener<Msg>) {
		let meta = match self.meta.get_mut(&self.host.node_id(node)) {
			Some(meta) => meta,
			None => return error!("Tried to attach a listener to an untracked node."),
		};
		let name = &listener.name;

		match meta.handlers.get(name) {
			Some(handler) if handler.prevent_default == listener.prevent_default => (),
			Some(_) => {
				self.host.remove_event_listener(node, name);
				self.host.add_event_listener(node, name, !listener.prevent_default);
			}
			None => self.host.add_event_listener(node, name, !listener.prevent_default),
		}

		if listener.throttle > 0 {
			let throttle = meta.throttles.entry(name.clone()).or_insert_with(|| Throttle {
				delay: listener.throttle,
				last: None,
				last_event: Rc::new(Cell::new(0)),
			});
			throttle.delay = listener.throttle;
		} else {
			meta.throttles.remove(name);
		}

		if listener.debounce > 0 {
			meta.debouncers
				.entry(name.clone())
				.or_insert(Debouncer {
					delay: listener.debounce,
					timer: None,
				})
				.delay = listener.debounce;
		} else if let Some(Debouncer { timer: Some(timer), .. }) = meta.debouncers.remove(name) {
			self.host.clear_timeout(timer);
		}

		let mut include = listener.include.clone();
		let forced: &[&str] = match name.as_str() {
			"input" | "change" => &FORM_EVENT_PATHS,
			"submit" => &[FORM_DATA],
			_ => &[],
		};
		for path in forced {
			if !include.iter().any(|included| included == path) {
				include.push((*path).to_owned());
			}
		}
		meta.handlers.insert(
			name.clone(),
			Handler {
				prevent_default: listener.prevent_default,
				stop_propagation: listener.stop_propagation,
				immediate: listener.immediate,
				include,
			},
		);
	}

	fn remove_listener(&mut self, node: &H::Node, name: &str) {
		self.host.remove_event_listener(node, name);
		if let Some(meta) = self.meta.get_mut(&self.host.node_id(node)) {
			meta.handlers.remove(name);
			meta.throttles.remove(name);
			if let Some(Debouncer { timer: Some(timer), .. }) = meta.debouncers.remove(name) {
				self.host.clear_timeout(timer);
			}
		}
	}

	/// Applies `node`'s listener modifiers to `event`.
	///
	/// Returns the dispatch to deliver right away, if any. Debounced dispatches are delivered later through the
	/// [`DispatchFn`] given to [`Reconciler::new`].
	pub fn handle_event(&mut self, node: &H::Node, event: &H::Event) -> Option<EventDispatch> {
		let name = self.host.event_name(event);
		let span = trace_span!("handle_event", name = %name);
		let _enter = span.enter();

		let id = self.host.node_id(node);
		let handler = match self.meta.get(&id).and_then(|meta| meta.handlers.get(&name)) {
			Some(handler) => handler,
			None => {
				debug!("No handler for this event on this node.");
				return None;
			}
		};
		if handler.prevent_default {
			self.host.prevent_default(event);
		}
		if handler.stop_propagation {
			self.host.stop_propagation(event);
		}
		let immediate = handler.immediate;
		let payload = self.host.event_payload(event, &handler.include);

		let path = self.path_of(node)?;
		if cfg!(feature = "log-paths") {
			trace!(path = ?path, "Resolved event path.");
		}
		let dispatch = EventDispatch { path, name, payload, immediate };

		self.event_sequence += 1;
		let sequence = self.event_sequence;
		let now = self.host.now();
		let meta = self.meta.get_mut(&id)?;

		// `None` without a throttle.
		let throttled = meta.throttles.get_mut(&dispatch.name).map(|throttle| {
			if throttle.last.map_or(true, |last| now > last + f64::from(throttle.delay)) {
				throttle.last = Some(now);
				throttle.last_event.set(sequence);
				true
			} else {
				trace!("Throttled.");
				self.host.prevent_default(event);
				false
			}
		});

		let last_throttled = meta.throttles.get(&dispatch.name).map(|throttle| Rc::clone(&throttle.last_event));
		match meta.debouncers.get_mut(&dispatch.name) {
			Some(debouncer) => {
				if let Some(timer) = debouncer.timer.take() {
					self.host.clear_timeout(timer);
				}
				let released = (throttled == Some(true)).then(|| dispatch.clone());
				let deliver = Rc::clone(&self.dispatch);
				debouncer.timer = Some(self.host.set_timeout(
					debouncer.delay,
					Box::new(move || {
						if last_throttled.map_or(true, |last| last.get() != sequence) {
							deliver(dispatch);
						}
					}),
				));
				released
			}
			None => throttled.unwrap_or(true).then(|| dispatch),
		}
	}

	/// Renders the path the diff registered `node`'s listeners under.
	fn path_of(&self, node: &H::Node) -> Option<String> {
		let root_id = self.host.node_id(&self.root);
		let mut segments = Vec::new();
		let mut current = node.clone();
		loop {
			let id = self.host.node_id(&current);
			if id == root_id {
				break;
			}
			let parent = match self.host.parent(&current) {
				Some(parent) => parent,
				None => {
					warn!("Event target is not attached below the mount root.");
					return None;
				}
			};
			match self.meta.get(&id).map(|meta| &meta.key).filter(|key| !key.is_empty()) {
				Some(key) => segments.push(Segment::Key(Rc::clone(key))),
				None => {
					let mut index = self.host.index_of(&parent, &current)?;
					if self.host.node_id(&parent) == root_id {
						index = index.saturating_sub(self.offset);
					}
					segments.push(Segment::Index(index));
				}
			}
			current = parent;
		}
		segments.reverse();
		Some(segments.into_iter().collect::<Path>().to_string())
	}

	/// Cancels all timers and forgets all metadata. The reconciler must not be used afterwards.
	pub fn teardown(&mut self) {
		for meta in self.meta.values() {
			for debouncer in meta.debouncers.values() {
				if let Some(timer) = debouncer.timer {
					self.host.clear_timeout(timer);
				}
			}
		}
		self.meta.clear();
	}
}
