use keyed_dom::{
	attribute::{attribute, checked, class, classes, disabled, id, on, on_click, on_input, on_submit, style, styles},
	decode::Decoder,
	node::{element, fragment, keyed, keyed_fragment, none, text},
	Attr, Node,
};
use serde_json::json;

mod common;

fn attributes<Msg>(node: &Node<Msg>) -> Vec<(String, String)> {
	match node {
		Node::Element(element) => element
			.attributes()
			.iter()
			.filter_map(|attribute| match attribute {
				Attr::Attribute { name, value } => Some((name.clone(), value.clone())),
				_ => None,
			})
			.collect(),
		_ => panic!("expected an element"),
	}
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
	expected.iter().map(|(name, value)| ((*name).to_owned(), (*value).to_owned())).collect()
}

#[test]
fn classes_are_joined() {
	let node = element::<()>("div", vec![class("a"), class("b")], vec![]);
	assert_eq!(attributes(&node), pairs(&[("class", "a b")]));
}

#[test]
fn empty_class_is_dropped() {
	let node = element::<()>("div", vec![class("")], vec![]);
	assert_eq!(attributes(&node), pairs(&[]));

	let node = element::<()>("div", vec![class("a"), class(""), style("color", "red"), attribute("style", "")], vec![]);
	assert_eq!(attributes(&node), pairs(&[("class", "a"), ("style", "color:red")]));
}

#[test]
fn styles_are_joined_with_semicolons() {
	let node = element::<()>("div", vec![styles([("color", "red"), ("margin", "0")]), style("padding", "1px")], vec![]);
	assert_eq!(attributes(&node), pairs(&[("style", "color:red;margin:0;padding:1px")]));
}

#[test]
fn attributes_are_sorted_and_last_wins() {
	let node = element::<()>("input", vec![id("first"), attribute("type", "text"), classes([("x", true), ("y", false), ("z", true)]), id("second")], vec![]);
	assert_eq!(attributes(&node), pairs(&[("class", "x z"), ("id", "second"), ("type", "text")]));
}

#[test]
fn absent_boolean_attributes_disappear() {
	let node = element::<()>("input", vec![checked(false), disabled(true)], vec![]);
	assert_eq!(attributes(&node), pairs(&[("disabled", "")]));
}

#[test]
fn void_elements_drop_children() {
	common::init_logging();
	match element::<()>("br", vec![], vec![text("ignored")]) {
		Node::Element(element) => {
			assert!(element.is_void());
			assert!(element.children().is_empty());
		}
		_ => panic!("expected an element"),
	}

	// Only in the HTML namespace.
	match keyed_dom::node::namespaced::<()>(keyed_dom::node::NAMESPACE_SVG, "br", vec![], vec![text("kept")]) {
		Node::Element(element) => assert_eq!(element.children().len(), 1),
		_ => panic!("expected an element"),
	}
}

#[test]
fn fragments_advance_over_their_head_and_children() {
	let node = fragment::<()>(vec![text("a"), fragment(vec![text("b"), text("c")]), none()]);
	assert_eq!(node.advance(), 1 + 1 + 3 + 1);
	assert_eq!(text::<()>("x").advance(), 1);
}

#[test]
fn rekeyed_fragments_prefix_their_children() {
	let node = keyed_fragment::<(), _>([("x", text("1")), ("y", text("2"))]).with_key("f");
	assert_eq!(node.key(), "f");
	match &node {
		Node::Fragment(fragment) => {
			let keys: Vec<_> = fragment.children().iter().map(Node::key).collect();
			assert_eq!(keys, ["f::x", "f::y"]);
		}
		_ => panic!("expected a fragment"),
	}

	let nested = fragment::<()>(vec![keyed_fragment([("x", text("1"))])]).with_key("outer");
	match &nested {
		Node::Fragment(outer) => match &outer.children()[0] {
			Node::Fragment(inner) => assert_eq!(inner.children()[0].key(), "outer::0::x"),
			_ => panic!("expected a fragment"),
		},
		_ => panic!("expected a fragment"),
	}
}

#[test]
fn keyed_assigns_keys() {
	let node = keyed::<(), _>("ul", vec![], [("a", text("1")), ("b", text("2"))]);
	match &node {
		Node::Element(element) => {
			let keys: Vec<_> = element.children().iter().map(Node::key).collect();
			assert_eq!(keys, ["a", "b"]);
		}
		_ => panic!("expected an element"),
	}
}

#[test]
fn listener_defaults() {
	match on_input::<String>(|value| value) {
		Attr::Listener(listener) => {
			assert!(listener.immediate);
			assert!(!listener.prevent_default);
		}
		_ => panic!("expected a listener"),
	}
	match on_click(()) {
		Attr::Listener(listener) => assert!(!listener.immediate),
		_ => panic!("expected a listener"),
	}
	match on_submit(|_| ()) {
		Attr::Listener(listener) => assert!(listener.prevent_default),
		_ => panic!("expected a listener"),
	}
	match on("scroll", Decoder::succeed(())).throttle(100).debounce(50).immediate(true).include(["target.scrollTop"]) {
		Attr::Listener(listener) => {
			assert_eq!((listener.throttle, listener.debounce, listener.immediate), (100, 50, true));
			assert_eq!(listener.include, ["target.scrollTop"]);
		}
		_ => panic!("expected a listener"),
	}
}

#[test]
fn listener_modifiers_ignore_other_attributes() {
	common::init_logging();
	match id::<()>("x").debounce(10) {
		Attr::Attribute { name, value } => assert_eq!((name.as_str(), value.as_str()), ("id", "x")),
		_ => panic!("expected an attribute"),
	}
}

#[test]
fn map_composes_into_decoders() {
	let node = element("input", vec![on_input(|value: String| value.len())], vec![]).map(|length| length * 2);
	match &node {
		Node::Element(element) => match &element.attributes()[0] {
			Attr::Listener(listener) => {
				let message = listener.decoder.run(&json!({ "target": { "value": "abc" } })).unwrap();
				assert_eq!(message, 6);
			}
			_ => panic!("expected a listener"),
		},
		_ => panic!("expected an element"),
	}
}
