//! Adopts markup that is already in the mount root as the first "previous" render.

use crate::{
	attribute::{attribute, Attr},
	host::{Host, LiveNode},
	node::{fragment, namespaced, none, text, Node, NAMESPACE_HTML},
	reconciler::Reconciler,
};
use std::rc::Rc;
use tracing::{debug, instrument, level_filters::STATIC_MAX_LEVEL, Level};

/// Describes the root's managed children as a [`Node`] and attaches reconciler metadata to them.
///
/// Keys are read from (and then removed from) `key_attribute`. Comments are removed.
/// The root's children are normalised so that they line up with the returned node:
/// an empty root gets an empty text node, and several children get a fragment head in front.
#[instrument(skip(reconciler))]
pub fn virtualise<H: Host, Msg>(reconciler: &mut Reconciler<H>, key_attribute: &str) -> Node<Msg> {
	let host = reconciler.host().clone();
	let root = reconciler.root().clone();
	let managed: Vec<H::Node> = host.children(&root).into_iter().skip(reconciler.offset()).collect();

	let mut children = load_children(reconciler, &root, managed, key_attribute);
	if STATIC_MAX_LEVEL >= Level::DEBUG {
		debug!("Adopted {} top-level node(s).", children.len());
	}

	match children.len() {
		0 => {
			let placeholder = host.create_text("");
			host.insert_before(&root, core::slice::from_ref(&placeholder), None);
			reconciler.adopt(&root, &placeholder, &Rc::from(""));
			none()
		}
		1 => children.remove(0),
		_ => {
			let head = host.create_text("");
			let first = host.child_at(&root, reconciler.offset());
			host.insert_before(&root, core::slice::from_ref(&head), first.as_ref());
			reconciler.adopt(&root, &head, &Rc::from(""));
			fragment(children)
		}
	}
}

fn load_children<H: Host, Msg>(reconciler: &mut Reconciler<H>, parent: &H::Node, live: Vec<H::Node>, key_attribute: &str) -> Vec<Node<Msg>> {
	live.into_iter().filter_map(|child| load_node(reconciler, parent, &child, key_attribute)).collect()
}

fn load_node<H: Host, Msg>(reconciler: &mut Reconciler<H>, parent: &H::Node, live: &H::Node, key_attribute: &str) -> Option<Node<Msg>> {
	let host = reconciler.host().clone();
	match host.inspect(live) {
		LiveNode::Element { namespace, tag, attributes } => {
			let mut key = String::new();
			let attributes: Vec<Attr<Msg>> = attributes
				.into_iter()
				.filter_map(|(name, value)| {
					if name == key_attribute {
						key = value;
						None
					} else {
						Some(attribute(name, value))
					}
				})
				.collect();
			if !key.is_empty() {
				host.remove_attribute(live, key_attribute);
			}
			reconciler.adopt(parent, live, &Rc::from(key.as_str()));

			let namespace = if namespace == NAMESPACE_HTML { String::new() } else { namespace };
			let children = load_children(reconciler, live, host.children(live), key_attribute);
			let node = namespaced(namespace, tag, attributes, children);
			Some(if key.is_empty() { node } else { node.with_key(&key) })
		}
		LiveNode::Text(content) => {
			reconciler.adopt(parent, live, &Rc::from(""));
			Some(text(content))
		}
		LiveNode::Other => {
			host.remove_child(parent, live);
			None
		}
	}
}
