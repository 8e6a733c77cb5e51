//! A deterministic in-memory [`Host`].
//!
//! Time only passes through [`MemoryDom::advance`], animation frames only run through [`MemoryDom::run_frame`]
//! and microtasks only through [`MemoryDom::run_microtasks`], which makes scheduling observable in tests.
//! Events don't bubble.

use crate::{
	decode::{insert_path, lookup},
	host::{Callback, EventSink, Host, HostError, LiveNode},
};
use core::fmt::{self, Debug, Formatter, Write};
use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value};
use std::{
	cell::{Cell, RefCell},
	collections::{BTreeMap, VecDeque},
	rc::Rc,
};
use tracing::{error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(u64);

#[derive(Clone)]
pub struct MemoryEvent {
	state: Rc<EventState>,
}

struct EventState {
	name: String,
	payload: Value,
	default_prevented: Cell<bool>,
	propagation_stopped: Cell<bool>,
}

impl MemoryEvent {
	/// `payload` stands in for the platform's event object. Listeners only see the paths they include.
	#[must_use]
	pub fn new(name: impl Into<String>, payload: Value) -> Self {
		Self {
			state: Rc::new(EventState {
				name: name.into(),
				payload,
				default_prevented: Cell::new(false),
				propagation_stopped: Cell::new(false),
			}),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.state.name
	}

	#[must_use]
	pub fn default_prevented(&self) -> bool {
		self.state.default_prevented.get()
	}

	#[must_use]
	pub fn propagation_stopped(&self) -> bool {
		self.state.propagation_stopped.get()
	}
}

impl Debug for MemoryEvent {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryEvent")
			.field("name", &self.state.name)
			.field("default_prevented", &self.default_prevented())
			.finish_non_exhaustive()
	}
}

enum Data {
	Element {
		namespace: String,
		tag: String,
		attributes: BTreeMap<String, String>,
		properties: BTreeMap<String, Value>,
		/// Event name to passivity.
		listeners: BTreeMap<String, bool>,
		inner_html: Option<String>,
	},
	Text(String),
	Comment(String),
}

struct Entry {
	data: Data,
	parent: Option<MemoryNode>,
	children: Vec<MemoryNode>,
}

struct Timer {
	id: u64,
	due: f64,
	callback: Callback,
}

#[derive(Default)]
struct Dom {
	entries: HashMap<u64, Entry>,
	next_id: u64,
	created: usize,
	now: f64,
	next_timer: u64,
	timers: Vec<Timer>,
	next_frame: u64,
	frames: Vec<(u64, Callback)>,
	microtasks: VecDeque<Callback>,
	sink: Option<EventSink<MemoryNode, MemoryEvent>>,
	claimed: HashSet<u64>,
	emitted: Vec<(MemoryNode, String, Value)>,
	focused: Option<MemoryNode>,
	played: Vec<MemoryNode>,
	reject_playback: bool,
}

impl Dom {
	fn insert(&mut self, data: Data) -> MemoryNode {
		self.next_id += 1;
		self.created += 1;
		let node = MemoryNode(self.next_id);
		self.entries.insert(
			node.0,
			Entry {
				data,
				parent: None,
				children: Vec::new(),
			},
		);
		node
	}

	fn entry(&self, node: MemoryNode) -> Option<&Entry> {
		let entry = self.entries.get(&node.0);
		if entry.is_none() {
			error!("Unknown node {:?}.", node);
		}
		entry
	}

	fn entry_mut(&mut self, node: MemoryNode) -> Option<&mut Entry> {
		let entry = self.entries.get_mut(&node.0);
		if entry.is_none() {
			error!("Unknown node {:?}.", node);
		}
		entry
	}

	fn element_mut(&mut self, node: MemoryNode) -> Option<&mut Data> {
		match self.entry_mut(node) {
			Some(Entry { data: data @ Data::Element { .. }, .. }) => Some(data),
			Some(_) => {
				warn!("Expected {:?} to be an element.", node);
				None
			}
			None => None,
		}
	}

	fn detach(&mut self, node: MemoryNode) {
		let parent = match self.entry_mut(node).and_then(|entry| entry.parent.take()) {
			Some(parent) => parent,
			None => return,
		};
		if let Some(parent) = self.entry_mut(parent) {
			parent.children.retain(|&child| child != node);
		}
	}

	/// Forgets `node` and its descendants, unless `node` was reattached or claimed as a root meanwhile.
	fn drop_detached(&mut self, node: MemoryNode) {
		let attached = self.entries.get(&node.0).map_or(true, |entry| entry.parent.is_some());
		if attached || self.claimed.contains(&node.0) {
			return;
		}
		let mut stack = vec![node];
		while let Some(node) = stack.pop() {
			if let Some(entry) = self.entries.remove(&node.0) {
				stack.extend(entry.children);
			}
		}
	}

	fn sibling(&self, node: MemoryNode, forward: bool) -> Option<MemoryNode> {
		let parent = self.entry(node)?.parent?;
		let siblings = &self.entry(parent)?.children;
		let index = siblings.iter().position(|&child| child == node)?;
		let index = if forward { index + 1 } else { index.checked_sub(1)? };
		siblings.get(index).copied()
	}

	fn describe_children(&self, children: &[MemoryNode], out: &mut String) {
		out.push('[');
		for (i, &child) in children.iter().enumerate() {
			if i > 0 {
				out.push_str(", ");
			}
			match self.entry(child).map(|entry| (&entry.data, &entry.children)) {
				Some((Data::Text(content), _)) => {
					let _ = write!(out, "{:?}", content);
				}
				Some((Data::Comment(content), _)) => {
					let _ = write!(out, "<!--{}-->", content);
				}
				Some((Data::Element { tag, attributes, inner_html, .. }, children)) => {
					out.push_str(tag);
					if !attributes.is_empty() {
						let _ = write!(out, "{:?}", attributes);
					}
					match inner_html {
						Some(inner_html) => {
							let _ = write!(out, "{{{}}}", inner_html);
						}
						None => self.describe_children(children, out),
					}
				}
				None => out.push('?'),
			}
		}
		out.push(']');
	}

	fn serialize(&self, node: MemoryNode, out: &mut String) {
		let entry = match self.entry(node) {
			Some(entry) => entry,
			None => return,
		};
		match &entry.data {
			Data::Text(content) => out.push_str(content),
			Data::Comment(content) => {
				let _ = write!(out, "<!--{}-->", content);
			}
			Data::Element { tag, attributes, inner_html, .. } => {
				let _ = write!(out, "<{}", tag);
				for (name, value) in attributes {
					let _ = write!(out, " {}=\"{}\"", name, value);
				}
				out.push('>');
				match inner_html {
					Some(inner_html) => out.push_str(inner_html),
					None => {
						for &child in &entry.children {
							self.serialize(child, out);
						}
					}
				}
				let _ = write!(out, "</{}>", tag);
			}
		}
	}
}

/// Cloning yields another handle to the same tree.
#[derive(Clone, Default)]
pub struct MemoryDom {
	dom: Rc<RefCell<Dom>>,
}

impl Debug for MemoryDom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let dom = self.dom.borrow();
		f.debug_struct("MemoryDom")
			.field("nodes", &dom.entries.len())
			.field("now", &dom.now)
			.field("timers", &dom.timers.len())
			.field("frames", &dom.frames.len())
			.field("microtasks", &dom.microtasks.len())
			.finish_non_exhaustive()
	}
}

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A detached `<div>` to mount into.
	#[must_use]
	pub fn create_root(&self) -> MemoryNode {
		self.create_element("", "div")
	}

	/// Appends a pre-rendered element, as if it came from server markup.
	pub fn append_element(&self, parent: &MemoryNode, tag: &str, attributes: &[(&str, &str)]) -> MemoryNode {
		let node = self.create_element("", tag);
		for (name, value) in attributes {
			self.set_attribute(&node, name, value);
		}
		self.insert_before(parent, &[node], None);
		node
	}

	pub fn append_text(&self, parent: &MemoryNode, content: &str) -> MemoryNode {
		let node = self.create_text(content);
		self.insert_before(parent, &[node], None);
		node
	}

	pub fn append_comment(&self, parent: &MemoryNode, content: &str) -> MemoryNode {
		let node = self.dom.borrow_mut().insert(Data::Comment(content.to_owned()));
		self.insert_before(parent, &[node], None);
		node
	}

	/// Serialises `node`'s children. Attributes are sorted by name, properties and listeners are omitted.
	#[must_use]
	pub fn inner_html(&self, node: &MemoryNode) -> String {
		let dom = self.dom.borrow();
		let mut out = String::new();
		if let Some(entry) = dom.entry(*node) {
			for &child in &entry.children {
				dom.serialize(child, &mut out);
			}
		}
		out
	}

	#[must_use]
	pub fn outer_html(&self, node: &MemoryNode) -> String {
		let mut out = String::new();
		self.dom.borrow().serialize(*node, &mut out);
		out
	}

	#[must_use]
	pub fn attribute(&self, node: &MemoryNode, name: &str) -> Option<String> {
		self.get_attribute(node, name)
	}

	#[must_use]
	pub fn property(&self, node: &MemoryNode, name: &str) -> Option<Value> {
		match &self.dom.borrow().entry(*node)?.data {
			Data::Element { properties, .. } => properties.get(name).cloned(),
			_ => None,
		}
	}

	#[must_use]
	pub fn text(&self, node: &MemoryNode) -> Option<String> {
		match &self.dom.borrow().entry(*node)?.data {
			Data::Text(content) => Some(content.clone()),
			_ => None,
		}
	}

	#[must_use]
	pub fn tag(&self, node: &MemoryNode) -> Option<String> {
		match &self.dom.borrow().entry(*node)?.data {
			Data::Element { tag, .. } => Some(tag.clone()),
			_ => None,
		}
	}

	/// Event names with a listener on `node`, paired with whether that listener is passive.
	#[must_use]
	pub fn listeners(&self, node: &MemoryNode) -> Vec<(String, bool)> {
		match self.dom.borrow().entry(*node).map(|entry| &entry.data) {
			Some(Data::Element { listeners, .. }) => listeners.iter().map(|(name, &passive)| (name.clone(), passive)).collect(),
			_ => Vec::new(),
		}
	}

	/// Number of nodes currently held. Removed subtrees are dropped, detached ones that were never attached are kept.
	#[must_use]
	pub fn live_nodes(&self) -> usize {
		self.dom.borrow().entries.len()
	}

	/// Describes `node`'s children node by node, for comparisons that [`MemoryDom::inner_html`] would blur.
	///
	/// Text is quoted (so empty and adjacent text nodes stay visible), elements list their attributes and children.
	#[must_use]
	pub fn structure(&self, node: &MemoryNode) -> String {
		let dom = self.dom.borrow();
		let mut out = String::new();
		if let Some(entry) = dom.entry(*node) {
			dom.describe_children(&entry.children, &mut out);
		}
		out
	}

	/// Total number of nodes ever created by this host.
	#[must_use]
	pub fn created_nodes(&self) -> usize {
		self.dom.borrow().created
	}

	/// Delivers `event` to `node`'s listener, if it has one for the event's name.
	///
	/// Returns whether a listener received it.
	pub fn dispatch_event(&self, node: &MemoryNode, event: &MemoryEvent) -> bool {
		let sink = {
			let dom = self.dom.borrow();
			let listening = matches!(dom.entry(*node).map(|entry| &entry.data), Some(Data::Element { listeners, .. }) if listeners.contains_key(event.name()));
			if !listening {
				trace!("No listener for {:?} on {:?}.", event.name(), node);
				return false;
			}
			dom.sink.clone()
		};
		match sink {
			Some(sink) => {
				sink(node, event);
				true
			}
			None => false,
		}
	}

	/// Moves the clock forward by `ms`, firing due timers in order.
	pub fn advance(&self, ms: u32) {
		let target = self.dom.borrow().now + f64::from(ms);
		loop {
			let timer = {
				let mut dom = self.dom.borrow_mut();
				let next = dom
					.timers
					.iter()
					.enumerate()
					.filter(|(_, timer)| timer.due <= target)
					.min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
					.map(|(i, _)| i);
				match next {
					Some(i) => {
						let timer = dom.timers.remove(i);
						dom.now = dom.now.max(timer.due);
						timer
					}
					None => {
						dom.now = target;
						break;
					}
				}
			};
			(timer.callback)();
			self.run_microtasks();
		}
	}

	/// Runs queued microtasks, including ones queued while doing so.
	pub fn run_microtasks(&self) {
		loop {
			let task = self.dom.borrow_mut().microtasks.pop_front();
			match task {
				Some(task) => task(),
				None => break,
			}
		}
	}

	/// Runs the animation frame callbacks requested so far, draining microtasks after each.
	///
	/// Callbacks requested during this frame are deferred to the next one.
	pub fn run_frame(&self) {
		let frames = core::mem::take(&mut self.dom.borrow_mut().frames);
		for (_, callback) in frames {
			callback();
			self.run_microtasks();
		}
	}

	#[must_use]
	pub fn pending_frames(&self) -> usize {
		self.dom.borrow().frames.len()
	}

	#[must_use]
	pub fn pending_timers(&self) -> usize {
		self.dom.borrow().timers.len()
	}

	#[must_use]
	pub fn pending_microtasks(&self) -> usize {
		self.dom.borrow().microtasks.len()
	}

	/// Custom events fired through [`Host::emit`], as `(name, data)`.
	#[must_use]
	pub fn emitted(&self) -> Vec<(String, Value)> {
		self.dom.borrow().emitted.iter().map(|(_, name, data)| (name.clone(), data.clone())).collect()
	}

	#[must_use]
	pub fn focused(&self) -> Option<MemoryNode> {
		self.dom.borrow().focused
	}

	#[must_use]
	pub fn played(&self) -> Vec<MemoryNode> {
		self.dom.borrow().played.clone()
	}

	/// Makes [`Host::play`] fail from now on.
	pub fn reject_playback(&self, reject: bool) {
		self.dom.borrow_mut().reject_playback = reject;
	}
}

impl Host for MemoryDom {
	type Node = MemoryNode;
	type Event = MemoryEvent;
	type Timer = u64;
	type Frame = u64;

	fn node_id(&self, node: &MemoryNode) -> u64 {
		node.0
	}

	fn create_element(&self, namespace: &str, tag: &str) -> MemoryNode {
		self.dom.borrow_mut().insert(Data::Element {
			namespace: namespace.to_owned(),
			tag: tag.to_owned(),
			attributes: BTreeMap::new(),
			properties: BTreeMap::new(),
			listeners: BTreeMap::new(),
			inner_html: None,
		})
	}

	fn create_text(&self, content: &str) -> MemoryNode {
		self.dom.borrow_mut().insert(Data::Text(content.to_owned()))
	}

	fn parent(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.dom.borrow().entry(*node)?.parent
	}

	fn child_count(&self, node: &MemoryNode) -> usize {
		self.dom.borrow().entry(*node).map_or(0, |entry| entry.children.len())
	}

	fn child_at(&self, parent: &MemoryNode, index: usize) -> Option<MemoryNode> {
		self.dom.borrow().entry(*parent)?.children.get(index).copied()
	}

	fn index_of(&self, parent: &MemoryNode, child: &MemoryNode) -> Option<usize> {
		self.dom.borrow().entry(*parent)?.children.iter().position(|c| c == child)
	}

	fn next_sibling(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.dom.borrow().sibling(*node, true)
	}

	fn previous_sibling(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.dom.borrow().sibling(*node, false)
	}

	fn children(&self, node: &MemoryNode) -> Vec<MemoryNode> {
		self.dom.borrow().entry(*node).map(|entry| entry.children.clone()).unwrap_or_default()
	}

	fn insert_before(&self, parent: &MemoryNode, nodes: &[MemoryNode], reference: Option<&MemoryNode>) {
		let mut dom = self.dom.borrow_mut();

		// Inserting a node before itself keeps its position.
		let mut reference = reference.copied();
		while let Some(r) = reference.filter(|r| nodes.contains(r)) {
			reference = dom.sibling(r, true);
		}

		for &node in nodes {
			dom.detach(node);
		}
		let index = match reference {
			Some(reference) => match dom.entry(*parent).and_then(|entry| entry.children.iter().position(|&child| child == reference)) {
				Some(index) => index,
				None => return error!("Reference node {:?} is not a child of {:?}.", reference, parent),
			},
			None => dom.entry(*parent).map_or(0, |entry| entry.children.len()),
		};
		for &node in nodes {
			if let Some(entry) = dom.entry_mut(node) {
				entry.parent = Some(*parent);
			}
		}
		if let Some(entry) = dom.entry_mut(*parent) {
			entry.children.splice(index..index, nodes.iter().copied());
			if let Data::Element { inner_html, .. } = &mut entry.data {
				*inner_html = None;
			}
		}
	}

	fn remove_child(&self, parent: &MemoryNode, child: &MemoryNode) {
		let mut dom = self.dom.borrow_mut();
		if dom.entry(*child).and_then(|entry| entry.parent) != Some(*parent) {
			return error!("{:?} is not a child of {:?}.", child, parent);
		}
		dom.detach(*child);
		dom.drop_detached(*child);
	}

	fn set_text(&self, node: &MemoryNode, content: &str) {
		match self.dom.borrow_mut().entry_mut(*node).map(|entry| &mut entry.data) {
			Some(Data::Text(text)) => *text = content.to_owned(),
			_ => warn!("Expected {:?} to be a text node.", node),
		}
	}

	fn set_inner_html(&self, node: &MemoryNode, html: &str) {
		let mut dom = self.dom.borrow_mut();
		let children = dom.entry_mut(*node).map(|entry| core::mem::take(&mut entry.children)).unwrap_or_default();
		for child in children {
			if let Some(entry) = dom.entry_mut(child) {
				entry.parent = None;
			}
			dom.drop_detached(child);
		}
		if let Some(Data::Element { inner_html, .. }) = dom.element_mut(*node) {
			*inner_html = Some(html.to_owned());
		}
	}

	fn get_attribute(&self, node: &MemoryNode, name: &str) -> Option<String> {
		match &self.dom.borrow().entry(*node)?.data {
			Data::Element { attributes, .. } => attributes.get(name).cloned(),
			_ => None,
		}
	}

	fn set_attribute(&self, node: &MemoryNode, name: &str, value: &str) {
		if let Some(Data::Element { attributes, .. }) = self.dom.borrow_mut().element_mut(*node) {
			attributes.insert(name.to_owned(), value.to_owned());
		}
	}

	fn remove_attribute(&self, node: &MemoryNode, name: &str) {
		if let Some(Data::Element { attributes, .. }) = self.dom.borrow_mut().element_mut(*node) {
			attributes.remove(name);
		}
	}

	fn set_property(&self, node: &MemoryNode, name: &str, value: &Value) {
		if let Some(Data::Element { properties, .. }) = self.dom.borrow_mut().element_mut(*node) {
			properties.insert(name.to_owned(), value.clone());
		}
	}

	fn add_event_listener(&self, node: &MemoryNode, name: &str, passive: bool) {
		if let Some(Data::Element { listeners, .. }) = self.dom.borrow_mut().element_mut(*node) {
			listeners.insert(name.to_owned(), passive);
		}
	}

	fn remove_event_listener(&self, node: &MemoryNode, name: &str) {
		if let Some(Data::Element { listeners, .. }) = self.dom.borrow_mut().element_mut(*node) {
			listeners.remove(name);
		}
	}

	fn listen(&self, sink: EventSink<MemoryNode, MemoryEvent>) {
		self.dom.borrow_mut().sink = Some(sink);
	}

	fn event_name(&self, event: &MemoryEvent) -> String {
		event.state.name.clone()
	}

	fn prevent_default(&self, event: &MemoryEvent) {
		event.state.default_prevented.set(true);
	}

	fn stop_propagation(&self, event: &MemoryEvent) {
		event.state.propagation_stopped.set(true);
	}

	fn event_payload(&self, event: &MemoryEvent, include: &[String]) -> Value {
		let mut payload = Map::new();
		payload.insert("type".to_owned(), Value::String(event.state.name.clone()));
		for path in include {
			match lookup(&event.state.payload, path) {
				Some(Value::Null) | None => (),
				Some(value) => insert_path(&mut payload, path, value.clone()),
			}
		}
		Value::Object(payload)
	}

	fn focus(&self, node: &MemoryNode) {
		self.dom.borrow_mut().focused = Some(*node);
	}

	fn play(&self, node: &MemoryNode) -> Result<(), HostError> {
		let mut dom = self.dom.borrow_mut();
		if dom.reject_playback {
			return Err(HostError::Playback("rejected by MemoryDom".to_owned()));
		}
		dom.played.push(*node);
		Ok(())
	}

	fn emit(&self, root: &MemoryNode, name: &str, data: Value) {
		self.dom.borrow_mut().emitted.push((*root, name.to_owned(), data));
	}

	fn set_timeout(&self, delay_ms: u32, callback: Callback) -> u64 {
		let mut dom = self.dom.borrow_mut();
		dom.next_timer += 1;
		let id = dom.next_timer;
		let due = dom.now + f64::from(delay_ms);
		dom.timers.push(Timer { id, due, callback });
		id
	}

	fn clear_timeout(&self, timer: u64) {
		self.dom.borrow_mut().timers.retain(|t| t.id != timer);
	}

	fn request_animation_frame(&self, callback: Callback) -> u64 {
		let mut dom = self.dom.borrow_mut();
		dom.next_frame += 1;
		let id = dom.next_frame;
		dom.frames.push((id, callback));
		id
	}

	fn cancel_animation_frame(&self, frame: u64) {
		self.dom.borrow_mut().frames.retain(|(id, _)| *id != frame);
	}

	fn queue_microtask(&self, callback: Callback) {
		self.dom.borrow_mut().microtasks.push_back(callback);
	}

	fn now(&self) -> f64 {
		self.dom.borrow().now
	}

	fn claim_root(&self, root: &MemoryNode) -> bool {
		self.dom.borrow_mut().claimed.insert(root.0)
	}

	fn release_root(&self, root: &MemoryNode) {
		self.dom.borrow_mut().claimed.remove(&root.0);
	}

	fn inspect(&self, node: &MemoryNode) -> LiveNode {
		match self.dom.borrow().entry(*node).map(|entry| &entry.data) {
			Some(Data::Element { namespace, tag, attributes, .. }) => LiveNode::Element {
				namespace: namespace.clone(),
				tag: tag.clone(),
				attributes: attributes.iter().map(|(name, value)| (name.clone(), value.clone())).collect(),
			},
			Some(Data::Text(content)) => LiveNode::Text(content.clone()),
			Some(Data::Comment(_)) | None => LiveNode::Other,
		}
	}
}
