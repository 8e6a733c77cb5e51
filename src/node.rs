//! Immutable virtual nodes describing one render.

use crate::attribute::{normalize, Attr};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, level_filters::STATIC_MAX_LEVEL, warn, Level};

pub const NAMESPACE_HTML: &str = "http://www.w3.org/1999/xhtml";
pub const NAMESPACE_SVG: &str = "http://www.w3.org/2000/svg";

const VOID_ELEMENTS: [&str; 14] = ["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

/// Whether `tag` never has children. Only applies to the default (empty) namespace.
#[must_use]
pub fn is_void_element(tag: &str, namespace: &str) -> bool {
	namespace.is_empty() && VOID_ELEMENTS.contains(&tag)
}

/// Maps sibling keys to their index in the owning children list.
pub type KeyedChildren = HashMap<Rc<str>, usize>;

pub enum Node<Msg> {
	/// Occupies a head marker followed by its flattened children in the parent's child list.
	Fragment(Fragment<Msg>),
	Element(Element<Msg>),
	Text(Text),
	/// An element whose content is an opaque markup string.
	RawHtml(RawHtml<Msg>),
}

pub struct Fragment<Msg> {
	pub(crate) key: Rc<str>,
	pub(crate) children: Vec<Node<Msg>>,
	pub(crate) keyed_children: KeyedChildren,
	/// Sum of the children's [`Node::advance`].
	pub(crate) children_count: usize,
}

pub struct Element<Msg> {
	pub(crate) key: Rc<str>,
	pub(crate) namespace: String,
	pub(crate) tag: String,
	pub(crate) attributes: Vec<Attr<Msg>>,
	pub(crate) children: Vec<Node<Msg>>,
	pub(crate) keyed_children: KeyedChildren,
	pub(crate) self_closing: bool,
	pub(crate) void: bool,
}

#[derive(Debug, Clone)]
pub struct Text {
	pub(crate) key: Rc<str>,
	pub(crate) content: String,
}

pub struct RawHtml<Msg> {
	pub(crate) key: Rc<str>,
	pub(crate) namespace: String,
	pub(crate) tag: String,
	pub(crate) attributes: Vec<Attr<Msg>>,
	pub(crate) inner_html: String,
}

fn no_key() -> Rc<str> {
	Rc::from("")
}

fn keyed_children_of<Msg>(children: &[Node<Msg>]) -> KeyedChildren {
	let mut keyed_children = KeyedChildren::new();
	for (i, child) in children.iter().enumerate() {
		let key = child.key_rc();
		if key.is_empty() {
			continue;
		}
		if keyed_children.contains_key(&key) {
			if cfg!(feature = "dangerous-logging") {
				error!("Duplicate sibling key {:?} at index {}. Only the first occurrence is tracked.", key, i);
			} else {
				error!("Duplicate sibling key at index {}. Only the first occurrence is tracked.", i);
			}
			continue;
		}
		keyed_children.insert(key, i);
	}
	keyed_children
}

#[must_use]
pub fn element<Msg>(tag: impl Into<String>, attributes: Vec<Attr<Msg>>, children: Vec<Node<Msg>>) -> Node<Msg> {
	namespaced("", tag, attributes, children)
}

#[must_use]
pub fn namespaced<Msg>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attr<Msg>>, children: Vec<Node<Msg>>) -> Node<Msg> {
	let namespace = namespace.into();
	let tag = tag.into();
	let void = is_void_element(&tag, &namespace);
	advanced(namespace, tag, attributes, children, false, void)
}

/// Like [`namespaced`], but with explicit markup flags.
///
/// Void elements drop any `children`.
#[must_use]
pub fn advanced<Msg>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attr<Msg>>, mut children: Vec<Node<Msg>>, self_closing: bool, void: bool) -> Node<Msg> {
	let tag = tag.into();
	if void && !children.is_empty() {
		if STATIC_MAX_LEVEL >= Level::WARN {
			warn!("Void element <{}> was given {} child node(s), dropping them.", tag, children.len());
		}
		children.clear();
	}
	Node::Element(Element {
		key: no_key(),
		namespace: namespace.into(),
		tag,
		attributes: normalize(attributes),
		keyed_children: keyed_children_of(&children),
		children,
		self_closing,
		void,
	})
}

#[must_use]
pub fn text<Msg>(content: impl Into<String>) -> Node<Msg> {
	Node::Text(Text {
		key: no_key(),
		content: content.into(),
	})
}

/// Renders nothing visible, but still occupies one (empty text) node.
#[must_use]
pub fn none<Msg>() -> Node<Msg> {
	text("")
}

#[must_use]
pub fn fragment<Msg>(children: Vec<Node<Msg>>) -> Node<Msg> {
	Node::Fragment(Fragment {
		key: no_key(),
		children_count: children.iter().map(Node::advance).sum(),
		keyed_children: keyed_children_of(&children),
		children,
	})
}

/// An element with `inner_html` as content. The markup is not sanitised.
#[must_use]
pub fn raw_html<Msg>(namespace: impl Into<String>, tag: impl Into<String>, attributes: Vec<Attr<Msg>>, inner_html: impl Into<String>) -> Node<Msg> {
	Node::RawHtml(RawHtml {
		key: no_key(),
		namespace: namespace.into(),
		tag: tag.into(),
		attributes: normalize(attributes),
		inner_html: inner_html.into(),
	})
}

/// An element with explicitly keyed children.
#[must_use]
pub fn keyed<Msg, K: AsRef<str>>(tag: impl Into<String>, attributes: Vec<Attr<Msg>>, children: impl IntoIterator<Item = (K, Node<Msg>)>) -> Node<Msg> {
	element(tag, attributes, children.into_iter().map(|(key, child)| child.with_key(key.as_ref())).collect())
}

#[must_use]
pub fn keyed_fragment<Msg, K: AsRef<str>>(children: impl IntoIterator<Item = (K, Node<Msg>)>) -> Node<Msg> {
	fragment(children.into_iter().map(|(key, child)| child.with_key(key.as_ref())).collect())
}

impl<Msg> Node<Msg> {
	#[must_use]
	pub fn key(&self) -> &str {
		match self {
			Node::Fragment(Fragment { key, .. }) | Node::Element(Element { key, .. }) | Node::Text(Text { key, .. }) | Node::RawHtml(RawHtml { key, .. }) => key,
		}
	}

	fn key_rc(&self) -> Rc<str> {
		match self {
			Node::Fragment(Fragment { key, .. }) | Node::Element(Element { key, .. }) | Node::Text(Text { key, .. }) | Node::RawHtml(RawHtml { key, .. }) => Rc::clone(key),
		}
	}

	/// How many consecutive live sibling nodes this node occupies.
	#[must_use]
	pub fn advance(&self) -> usize {
		match self {
			Node::Fragment(fragment) => 1 + fragment.children_count,
			_ => 1,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Node::Fragment(_) => "fragment",
			Node::Element(_) => "element",
			Node::Text(_) => "text",
			Node::RawHtml(_) => "raw HTML",
		}
	}

	/// Replaces this node's key.
	///
	/// Keyed children of a fragment are re-keyed as `"{key}::{child key}"`, since they share
	/// the fragment's parent's key space. Unkeyed nested fragments are prefixed with `"{key}::{index}"`.
	#[must_use]
	pub fn with_key(self, key: &str) -> Self {
		let key: Rc<str> = key.into();
		match self {
			Node::Element(element) => Node::Element(Element { key, ..element }),
			Node::Text(text) => Node::Text(Text { key, ..text }),
			Node::RawHtml(raw_html) => Node::RawHtml(RawHtml { key, ..raw_html }),
			Node::Fragment(fragment) => {
				let children = prefix_keys(&key, fragment.children);
				Node::Fragment(Fragment {
					key,
					keyed_children: keyed_children_of(&children),
					children,
					children_count: fragment.children_count,
				})
			}
		}
	}

	/// Converts every message this tree can produce, composing `f` into each listener's decoder once.
	#[must_use]
	pub fn map<B: 'static>(self, f: impl Fn(Msg) -> B + 'static) -> Node<B>
	where
		Msg: 'static,
	{
		let f: Rc<dyn Fn(Msg) -> B> = Rc::new(f);
		self.map_with(&f)
	}

	fn map_with<B: 'static>(self, f: &Rc<dyn Fn(Msg) -> B>) -> Node<B>
	where
		Msg: 'static,
	{
		let map_children = |children: Vec<Node<Msg>>| -> Vec<Node<B>> { children.into_iter().map(|child| child.map_with(f)).collect() };
		let map_attributes = |attributes: Vec<Attr<Msg>>| -> Vec<Attr<B>> { attributes.into_iter().map(|attribute| attribute.map(f)).collect() };
		match self {
			Node::Fragment(fragment) => Node::Fragment(Fragment {
				key: fragment.key,
				children: map_children(fragment.children),
				keyed_children: fragment.keyed_children,
				children_count: fragment.children_count,
			}),
			Node::Element(element) => Node::Element(Element {
				key: element.key,
				namespace: element.namespace,
				tag: element.tag,
				attributes: map_attributes(element.attributes),
				children: map_children(element.children),
				keyed_children: element.keyed_children,
				self_closing: element.self_closing,
				void: element.void,
			}),
			Node::Text(text) => Node::Text(text),
			Node::RawHtml(raw_html) => Node::RawHtml(RawHtml {
				key: raw_html.key,
				namespace: raw_html.namespace,
				tag: raw_html.tag,
				attributes: map_attributes(raw_html.attributes),
				inner_html: raw_html.inner_html,
			}),
		}
	}
}

fn prefix_keys<Msg>(prefix: &str, children: Vec<Node<Msg>>) -> Vec<Node<Msg>> {
	children
		.into_iter()
		.enumerate()
		.map(|(i, child)| match child {
			Node::Fragment(fragment) if fragment.key.is_empty() => {
				let children = prefix_keys(&format!("{}::{}", prefix, i), fragment.children);
				Node::Fragment(Fragment {
					key: fragment.key,
					keyed_children: keyed_children_of(&children),
					children,
					children_count: fragment.children_count,
				})
			}
			child if child.key().is_empty() => child,
			child => {
				let key = format!("{}::{}", prefix, child.key());
				child.with_key(&key)
			}
		})
		.collect()
}

impl<Msg> Fragment<Msg> {
	#[must_use]
	pub fn children(&self) -> &[Node<Msg>] {
		&self.children
	}
}

impl<Msg> Element<Msg> {
	#[must_use]
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn attributes(&self) -> &[Attr<Msg>] {
		&self.attributes
	}

	#[must_use]
	pub fn children(&self) -> &[Node<Msg>] {
		&self.children
	}

	#[must_use]
	pub fn is_self_closing(&self) -> bool {
		self.self_closing
	}

	#[must_use]
	pub fn is_void(&self) -> bool {
		self.void
	}
}

impl Text {
	#[must_use]
	pub fn content(&self) -> &str {
		&self.content
	}
}

impl<Msg> RawHtml<Msg> {
	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn inner_html(&self) -> &str {
		&self.inner_html
	}
}

impl<Msg> Clone for Node<Msg> {
	fn clone(&self) -> Self {
		match self {
			Node::Fragment(fragment) => Node::Fragment(Fragment {
				key: Rc::clone(&fragment.key),
				children: fragment.children.clone(),
				keyed_children: fragment.keyed_children.clone(),
				children_count: fragment.children_count,
			}),
			Node::Element(element) => Node::Element(Element {
				key: Rc::clone(&element.key),
				namespace: element.namespace.clone(),
				tag: element.tag.clone(),
				attributes: element.attributes.clone(),
				children: element.children.clone(),
				keyed_children: element.keyed_children.clone(),
				self_closing: element.self_closing,
				void: element.void,
			}),
			Node::Text(text) => Node::Text(text.clone()),
			Node::RawHtml(raw_html) => Node::RawHtml(RawHtml {
				key: Rc::clone(&raw_html.key),
				namespace: raw_html.namespace.clone(),
				tag: raw_html.tag.clone(),
				attributes: raw_html.attributes.clone(),
				inner_html: raw_html.inner_html.clone(),
			}),
		}
	}
}

impl<Msg> Debug for Node<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Node::Fragment(fragment) => f.debug_struct("Fragment").field("key", &fragment.key).field("children", &fragment.children).finish(),
			Node::Element(element) => f
				.debug_struct("Element")
				.field("key", &element.key)
				.field("namespace", &element.namespace)
				.field("tag", &element.tag)
				.field("attributes", &element.attributes)
				.field("children", &element.children)
				.finish(),
			Node::Text(text) => text.fmt(f),
			Node::RawHtml(raw_html) => f
				.debug_struct("RawHtml")
				.field("key", &raw_html.key)
				.field("tag", &raw_html.tag)
				.field("attributes", &raw_html.attributes)
				.field("inner_html", &raw_html.inner_html)
				.finish(),
		}
	}
}
