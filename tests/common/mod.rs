#![allow(dead_code)]

use keyed_dom::{diff, path::Path, reconciler::DispatchFn, EventDispatch, EventRegistry, Host, MemoryDom, MemoryEvent, MemoryNode, Node, Reconciler};
use serde_json::Value;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

pub fn init_logging() {
	let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

/// A reconciler on a fresh root that ignores debounced dispatches.
pub fn reconciler(host: &MemoryDom) -> (MemoryNode, Reconciler<MemoryDom>) {
	let root = host.create_root();
	(root, Reconciler::new(host.clone(), root, Rc::new(|_: EventDispatch| ())))
}

/// Renders `node` directly and returns the resulting markup.
pub fn render<Msg>(node: &Node<Msg>) -> String {
	let host = MemoryDom::new();
	let (root, mut reconciler) = reconciler(&host);
	reconciler.render(node);
	host.inner_html(&root)
}

/// Like [`render`], but node by node, so that empty and adjacent text nodes count.
pub fn render_structure<Msg>(node: &Node<Msg>) -> String {
	let host = MemoryDom::new();
	let (root, mut reconciler) = reconciler(&host);
	reconciler.render(node);
	host.structure(&root)
}

/// A rendered tree that can be patched further.
pub struct Live<Msg> {
	pub host: MemoryDom,
	pub root: MemoryNode,
	pub reconciler: Reconciler<MemoryDom>,
	pub events: EventRegistry<Msg>,
	pub vdom: Node<Msg>,
}

impl<Msg> Live<Msg> {
	pub fn new(vdom: Node<Msg>) -> Self {
		Self::with_dispatch(vdom, Rc::new(|_: EventDispatch| ()))
	}

	/// `dispatch` receives debounced events.
	pub fn with_dispatch(vdom: Node<Msg>, dispatch: DispatchFn) -> Self {
		let host = MemoryDom::new();
		let root = host.create_root();
		let mut reconciler = Reconciler::new(host.clone(), root, dispatch);
		let mut events = EventRegistry::new();
		events.add_child(&Path::root(), 0, &vdom);
		reconciler.render(&vdom);
		Self {
			host,
			root,
			reconciler,
			events,
			vdom,
		}
	}

	pub fn update(&mut self, next: Node<Msg>) {
		let patch = diff(&mut self.events, &self.vdom, &next);
		self.reconciler.push(patch);
		self.vdom = next;
	}

	pub fn html(&self) -> String {
		self.host.inner_html(&self.root)
	}

	pub fn structure(&self) -> String {
		self.host.structure(&self.root)
	}

	/// Fires every live listener once, returning `(path, event name)` for each the registry can't resolve.
	pub fn unresolved_listeners(&mut self) -> Vec<(String, String)> {
		let mut unresolved = Vec::new();
		let mut pending = self.host.children(&self.root);
		while let Some(node) = pending.pop() {
			for (name, _) in self.host.listeners(&node) {
				match self.reconciler.handle_event(&node, &MemoryEvent::new(name.as_str(), Value::Null)) {
					Some(dispatch) => {
						if self.events.resolve(&dispatch.path, &dispatch.name, &dispatch.payload).is_err() {
							unresolved.push((dispatch.path, dispatch.name));
						}
					}
					None => unresolved.push((format!("{:?}", node), name)),
				}
			}
			pending.extend(self.host.children(&node));
		}
		unresolved
	}
}
