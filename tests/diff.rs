use keyed_dom::{
	attribute::{class, id, on_click, on_input, property, value},
	diff,
	node::{element, fragment, keyed, keyed_fragment, raw_html, text},
	path::Path,
	Attr, Change, EventRegistry, Node, Patch,
};
use serde_json::json;

mod common;

fn registry<Msg>(tree: &Node<Msg>) -> EventRegistry<Msg> {
	let mut events = EventRegistry::new();
	events.add_child(&Path::root(), 0, tree);
	events
}

fn kinds<Msg>(patch: &Patch<'_, Msg>) -> Vec<&'static str> {
	patch.changes.iter().map(Change::kind).collect()
}

#[test]
fn identical_trees_produce_empty_patches() {
	common::init_logging();
	let tree = element(
		"main",
		vec![class("app"), on_click(())],
		vec![
			keyed("ul", vec![], [("a", text("1")), ("b", element("b", vec![property("scroll", 1)], vec![]))]),
			fragment(vec![text("x"), raw_html("", "div", vec![], "<hr>")]),
			element("input", vec![value("v")], vec![]),
		],
	);
	let mut events = registry(&tree);
	let copy = tree.clone();
	let patch = diff(&mut events, &tree, &copy);
	assert_eq!(patch.removed, 0);
	assert!(patch.changes.is_empty());
	assert!(patch.children.is_empty());
	assert_eq!(events.len(), 1);
}

#[test]
fn swapping_two_keyed_siblings_is_a_single_move() {
	common::init_logging();
	let old = keyed::<(), _>("ul", vec![], [("a", text("1")), ("b", text("2"))]);
	let new = keyed::<(), _>("ul", vec![], [("b", text("2")), ("a", text("1"))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);

	assert!(patch.changes.is_empty());
	assert_eq!(patch.children.len(), 1);
	let ul = &patch.children[0];
	assert_eq!(ul.index, 0);
	assert_eq!(ul.removed, 0);
	assert!(ul.children.is_empty());
	match ul.changes.as_slice() {
		[Change::Move { key, before, count }] => assert_eq!((*key, *before, *count), ("b", 0, 1)),
		other => panic!("unexpected changes: {:?}", other),
	}
	let stats = patch.stats();
	assert_eq!((stats.moves, stats.replacements, stats.inserts, stats.removals), (1, 0, 0, 0));
}

#[test]
fn a_moved_key_that_changed_tag_is_rebuilt_in_place() {
	common::init_logging();
	let old = keyed::<(), _>("ul", vec![], [("a", element("li", vec![], vec![])), ("b", element("p", vec![], vec![]))]);
	let new = keyed::<(), _>("ul", vec![], [("b", element("span", vec![], vec![])), ("a", element("li", vec![], vec![]))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);

	let ul = &patch.children[0];
	assert_eq!(ul.removed, 0);
	match ul.changes.as_slice() {
		[Change::Insert { children, before: 0 }, Change::RemoveKey { key: "b", count: 1 }] => assert_eq!(children.len(), 1),
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn a_moved_fragment_is_patched_after_it_moves() {
	common::init_logging();
	let item = |key: &str| element::<()>("li", vec![], vec![text(key)]);
	let old = keyed("ul", vec![], [("a", item("a")), ("f", keyed_fragment([("x", item("x"))]))]);
	let new = keyed("ul", vec![], [("f", keyed_fragment([("y", item("y")), ("x", item("x"))])), ("a", item("a"))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);

	// Applied last to first: the fragment's head and `x` move before `a`, then `y` goes in after the head.
	let ul = &patch.children[0];
	match ul.changes.as_slice() {
		[Change::Insert { before: 1, .. }, Change::Move { key: "f", before: 0, count: 2 }] => (),
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn registrations_survive_removals_on_the_same_path() {
	common::init_logging();
	let old = fragment(vec![text(""), keyed_fragment([("b", element("li", vec![], vec![])), ("d", element("li", vec![on_click(1)], vec![]))])]);
	let new = fragment(vec![element("li", vec![on_click(2)], vec![]).with_key("d")]);
	let mut events = registry(&old);
	let _ = diff(&mut events, &old, &new);

	assert!(events.contains(&Path::root().add(0, "d"), "click"));
	assert_eq!(events.resolve("d", "click", &json!({})).unwrap(), 2);
}

#[test]
fn trailing_children_are_removed_by_count() {
	let old = element::<()>("p", vec![], vec![text("a"), text("b"), text("c")]);
	let new = element::<()>("p", vec![], vec![text("a")]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	assert_eq!(patch.children[0].removed, 2);
	assert!(patch.children[0].changes.is_empty());
}

#[test]
fn trailing_children_are_inserted() {
	let old = element::<()>("p", vec![], vec![text("a")]);
	let new = element::<()>("p", vec![], vec![text("a"), text("b"), text("c")]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	match patch.children[0].changes.as_slice() {
		[Change::Insert { children, before }] => {
			assert_eq!(children.len(), 2);
			assert_eq!(*before, 1);
		}
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn different_kinds_are_replaced() {
	let old = element::<()>("p", vec![], vec![text("a"), element("b", vec![], vec![])]);
	let new = element::<()>("p", vec![], vec![element("i", vec![], vec![]), element("b", vec![], vec![])]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	match patch.children[0].changes.as_slice() {
		[Change::Replace { from, count, with }] => {
			assert_eq!((*from, *count), (0, 1));
			assert_eq!(with.kind(), "element");
		}
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn changed_text_is_patched_in_place() {
	let old = element::<()>("p", vec![], vec![text("a"), text("b")]);
	let new = element::<()>("p", vec![], vec![text("a"), text("B")]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	let p = &patch.children[0];
	assert_eq!(p.children.len(), 1);
	assert_eq!(p.children[0].index, 1);
	assert!(matches!(p.children[0].changes.as_slice(), [Change::ReplaceText { content: "B" }]));
}

#[test]
fn attribute_changes_are_collected() {
	let old = element::<()>("div", vec![id("x"), class("a")], vec![]);
	let new = element::<()>("div", vec![class("b"), attribute_title("t")], vec![]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	match patch.children[0].changes.as_slice() {
		[Change::Update { added, removed }] => {
			let added: Vec<_> = added.iter().map(|attribute| attribute.name()).collect();
			let removed: Vec<_> = removed.iter().map(|attribute| attribute.name()).collect();
			assert_eq!(added, ["class", "title"]);
			assert_eq!(removed, ["id"]);
		}
		other => panic!("unexpected changes: {:?}", other),
	}
}

fn attribute_title<Msg>(title: &str) -> Attr<Msg> {
	keyed_dom::attribute::attribute("title", title)
}

#[test]
fn listeners_are_registered_and_unregistered() {
	let old = element("div", vec![on_click(1)], vec![element("button", vec![], vec![])]);
	let new = element("div", vec![], vec![element("button", vec![on_click(2)], vec![])]);
	let mut events = registry(&old);
	assert!(events.contains(&Path::root().add(0, ""), "click"));

	let patch = diff(&mut events, &old, &new);
	assert!(!events.contains(&Path::root().add(0, ""), "click"));
	assert_eq!(events.resolve("0\n0", "click", &json!(null)).unwrap(), 2);
	assert_eq!(patch.stats().updates, 2);
}

#[test]
fn replacing_a_decoder_alone_does_not_touch_the_live_node() {
	let old = element("button", vec![on_click(1)], vec![]);
	let new = element("button", vec![on_click(2)], vec![]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	assert!(patch.is_empty());
	assert_eq!(events.resolve("0", "click", &json!(null)).unwrap(), 2);
}

#[test]
fn controlled_inputs_resync_their_value() {
	common::init_logging();
	let view = |text: &str| element("form", vec![], vec![element("input", vec![value(text), on_input(|value: String| value)], vec![]), element("textarea", vec![value(text)], vec![])]);
	let old = view("same");
	let new = view("same");
	let mut events = registry(&old);

	// Nothing dispatched yet: equal values are left alone.
	assert!(diff(&mut events, &old, &new).is_empty());

	events.mark_dispatched("0\n0");
	let patch = diff(&mut events, &old, &new);
	let form = &patch.children[0];
	assert_eq!(form.children.len(), 1, "only the input that dispatched is resynchronised");
	assert_eq!(form.children[0].index, 0);
	match form.children[0].changes.as_slice() {
		[Change::Update { added, removed }] => {
			assert!(removed.is_empty());
			assert_eq!(added.iter().map(|attribute| attribute.name()).collect::<Vec<_>>(), ["value"]);
		}
		other => panic!("unexpected changes: {:?}", other),
	}

	// The mark only lasts for one diff.
	assert!(diff(&mut events, &old, &new).is_empty());
}

#[test]
fn keyed_siblings_are_removed_by_key() {
	let old = keyed::<(), _>("ul", vec![], [("a", text("1")), ("b", text("2")), ("c", text("3"))]);
	let new = keyed::<(), _>("ul", vec![], [("a", text("1")), ("c", text("3"))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	assert_eq!(kinds(&patch.children[0]), ["RemoveKey"]);
	match patch.children[0].changes.as_slice() {
		[Change::RemoveKey { key, count }] => assert_eq!((*key, *count), ("b", 1)),
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn new_keyed_siblings_are_inserted_in_place() {
	let old = keyed::<(), _>("ul", vec![], [("a", text("1")), ("c", text("3"))]);
	let new = keyed::<(), _>("ul", vec![], [("a", text("1")), ("d", text("4")), ("c", text("3"))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	match patch.children[0].changes.as_slice() {
		[Change::Insert { children, before }] => {
			assert_eq!(children[0].key(), "d");
			assert_eq!(*before, 1);
		}
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn a_vanished_key_meeting_a_new_key_is_replaced() {
	let old = keyed::<(), _>("ul", vec![], [("a", text("1")), ("b", text("2")), ("c", text("3"))]);
	let new = keyed::<(), _>("ul", vec![], [("a", text("1")), ("d", text("4")), ("c", text("3"))]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	assert_eq!(kinds(&patch.children[0]), ["Replace"]);
	match patch.children[0].changes.as_slice() {
		[Change::Replace { from, count, with }] => {
			assert_eq!((*from, *count), (1, 1));
			assert_eq!(with.key(), "d");
		}
		other => panic!("unexpected changes: {:?}", other),
	}
}

#[test]
fn fragments_are_diffed_inline() {
	let old = element::<()>("div", vec![], vec![fragment(vec![text("a"), text("b")]), text("tail")]);
	let new = element::<()>("div", vec![], vec![fragment(vec![text("a")]), text("tail!")]);
	let mut events = registry(&old);
	let patch = diff(&mut events, &old, &new);
	let div = &patch.children[0];
	// The fragment's surplus child sits at live index 2, right after its remaining child.
	match div.changes.as_slice() {
		[Change::Remove { from, count }] => assert_eq!((*from, *count), (2, 1)),
		other => panic!("unexpected changes: {:?}", other),
	}
	assert_eq!(div.children.len(), 1);
	assert_eq!(div.children[0].index, 2);
}
