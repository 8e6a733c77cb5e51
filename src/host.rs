//! The seam between the engine and a concrete live UI tree.
//!
//! [`Reconciler`](`crate::reconciler::Reconciler`) and [`mount`](`crate::runtime::mount`) only touch the live tree,
//! event objects and the platform's schedulers through this trait. See [`MemoryDom`](`crate::memory::MemoryDom`)
//! and [`WebHost`](`crate::web::WebHost`).

use core::fmt::Debug;
use serde_json::Value;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
	#[error("media playback was rejected: {0}")]
	Playback(String),
	#[error("{operation} is not supported by this host")]
	Unsupported { operation: &'static str },
	#[error("host operation failed: {0}")]
	Failed(String),
}

/// A shallow view of an existing live node, used to adopt pre-rendered markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveNode {
	Element { namespace: String, tag: String, attributes: Vec<(String, String)> },
	Text(String),
	/// Comments and anything else the engine does not manage.
	Other,
}

/// Payload path of a `submit` event's form entries, as `[name, value]` pairs.
///
/// Always included for `submit` listeners. Hosts that can read the form fill it in themselves.
pub const FORM_DATA: &str = "detail.formData";

/// Receives every event fired on a node that had [`Host::add_event_listener`] called on it.
pub type EventSink<N, E> = Rc<dyn Fn(&N, &E)>;

pub type Callback = Box<dyn FnOnce()>;

/// Host handles are cheap to clone and refer to the same underlying tree.
///
/// Methods that can't fail structurally are infallible. Hosts log and ignore misuse such as removing a
/// node from a parent it doesn't belong to.
pub trait Host: Clone + 'static {
	type Node: Clone + Debug + 'static;
	type Event: Clone + 'static;
	type Timer: Copy + Debug + 'static;
	type Frame: Copy + Debug + 'static;

	/// A stable identity for `node`, unique among the live nodes of this host.
	fn node_id(&self, node: &Self::Node) -> u64;

	/// An empty `namespace` means HTML.
	fn create_element(&self, namespace: &str, tag: &str) -> Self::Node;
	fn create_text(&self, content: &str) -> Self::Node;

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	fn child_count(&self, node: &Self::Node) -> usize;
	fn child_at(&self, parent: &Self::Node, index: usize) -> Option<Self::Node>;
	fn index_of(&self, parent: &Self::Node, child: &Self::Node) -> Option<usize>;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
	fn previous_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	fn children(&self, node: &Self::Node) -> Vec<Self::Node> {
		(0..self.child_count(node)).filter_map(|i| self.child_at(node, i)).collect()
	}

	/// Inserts `nodes` in order before `reference`, or at the end if it's [`None`].
	fn insert_before(&self, parent: &Self::Node, nodes: &[Self::Node], reference: Option<&Self::Node>);

	/// Relocates an attached `node`. Hosts with a state-preserving move primitive should override this.
	fn move_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>) {
		self.insert_before(parent, core::slice::from_ref(node), reference);
	}

	fn remove_child(&self, parent: &Self::Node, child: &Self::Node);

	fn set_text(&self, node: &Self::Node, content: &str);
	fn set_inner_html(&self, node: &Self::Node, inner_html: &str);

	fn get_attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
	fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&self, node: &Self::Node, name: &str);
	fn set_property(&self, node: &Self::Node, name: &str, value: &Value);

	/// Non-`passive` listeners may cancel the event's default action.
	fn add_event_listener(&self, node: &Self::Node, name: &str, passive: bool);
	fn remove_event_listener(&self, node: &Self::Node, name: &str);

	/// Routes events from all listened-to nodes into `sink`, replacing any previous sink.
	fn listen(&self, sink: EventSink<Self::Node, Self::Event>);

	fn event_name(&self, event: &Self::Event) -> String;
	fn prevent_default(&self, event: &Self::Event);
	fn stop_propagation(&self, event: &Self::Event);

	/// Extracts the decoder payload from `event`. `include` lists dotted paths to copy besides the host's defaults.
	fn event_payload(&self, event: &Self::Event, include: &[String]) -> Value;

	fn focus(&self, node: &Self::Node);
	fn play(&self, node: &Self::Node) -> Result<(), HostError>;

	/// Fires a bubbling custom event named `name` carrying `data` at `root`.
	fn emit(&self, root: &Self::Node, name: &str, data: Value);

	fn set_timeout(&self, delay_ms: u32, callback: Callback) -> Self::Timer;
	fn clear_timeout(&self, timer: Self::Timer);
	fn request_animation_frame(&self, callback: Callback) -> Self::Frame;
	fn cancel_animation_frame(&self, frame: Self::Frame);
	fn queue_microtask(&self, callback: Callback);

	/// Milliseconds on a monotonic-enough clock.
	fn now(&self) -> f64;

	/// Returns `false` if `root` is already claimed.
	fn claim_root(&self, root: &Self::Node) -> bool;
	fn release_root(&self, root: &Self::Node);

	fn inspect(&self, node: &Self::Node) -> LiveNode;
}
