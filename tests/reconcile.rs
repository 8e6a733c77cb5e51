use keyed_dom::{
	attribute::{attribute, autofocus, checked, class, default_value, on_click, on_submit, property, value},
	diff,
	node::{element, fragment, keyed, keyed_fragment, none, raw_html, text},
	path::Path,
	EventRegistry, Host, MemoryDom, Node,
};
use serde_json::json;

mod common;
use common::Live;

fn list(keys: &[&str]) -> Node<()> {
	keyed("ul", vec![], keys.iter().map(|key| (*key, element("li", vec![], vec![text(*key)]))))
}

#[track_caller]
fn assert_transition(old: Node<()>, new: Node<()>) {
	let (expected, structure) = (common::render(&new), common::render_structure(&new));
	let mut live = Live::new(old);
	live.update(new);
	assert_eq!(live.html(), expected);
	assert_eq!(live.structure(), structure);
}

fn items(keys: &[&str]) -> Vec<(String, Node<()>)> {
	keys.iter().map(|key| (key.to_string(), element("li", vec![], vec![text(*key)]))).collect()
}

#[test]
fn renders_markup() {
	common::init_logging();
	let tree = element::<()>(
		"section",
		vec![class("a"), attribute("title", "t")],
		vec![text("x"), fragment(vec![element("b", vec![], vec![]), text("y")]), raw_html("", "div", vec![], "<i>raw</i>"), none()],
	);
	assert_eq!(common::render(&tree), r#"<section class="a" title="t">x<b></b>y<div><i>raw</i></div></section>"#);
}

#[test]
fn keyed_reorders_reuse_live_nodes() {
	common::init_logging();
	let mut live = Live::new(list(&["a", "b", "c"]));
	let ul = live.host.child_at(&live.root, 0).unwrap();
	let a = live.host.child_at(&ul, 0).unwrap();
	let created = live.host.created_nodes();

	live.update(list(&["c", "a", "b"]));
	assert_eq!(live.html(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
	assert_eq!(live.host.created_nodes(), created);
	assert_eq!(live.host.child_at(&ul, 1), Some(a));

	live.update(list(&["b", "a", "c"]));
	assert_eq!(live.html(), "<ul><li>b</li><li>a</li><li>c</li></ul>");
	assert_eq!(live.host.created_nodes(), created);
}

#[test]
fn patches_match_fresh_renders() {
	common::init_logging();
	assert_transition(list(&["a", "b", "c"]), list(&["c", "b", "a"]));
	assert_transition(list(&["a", "b", "c"]), list(&["a", "c"]));
	assert_transition(list(&["a", "c"]), list(&["a", "b", "c"]));
	assert_transition(list(&["a", "b", "c"]), list(&["a", "d", "c"]));
	assert_transition(list(&["a", "b"]), list(&[]));
	assert_transition(list(&[]), list(&["x", "y"]));
	assert_transition(
		element("div", vec![], vec![fragment(vec![text("a"), text("b")]), text("tail")]),
		element("div", vec![], vec![fragment(vec![text("a")]), text("tail!")]),
	);
	assert_transition(
		element("div", vec![], vec![text("a"), element("span", vec![], vec![])]),
		element("div", vec![], vec![element("span", vec![], vec![]), text("a")]),
	);
	assert_transition(
		element("div", vec![class("x")], vec![raw_html("", "p", vec![], "<b>1</b>")]),
		element("div", vec![class("y")], vec![raw_html("", "p", vec![], "<b>2</b>")]),
	);
	assert_transition(text("just text"), element("p", vec![], vec![text("now an element")]));
}

#[test]
fn offset_children_are_left_alone() {
	common::init_logging();
	let host = MemoryDom::new();
	let (root, mut reconciler) = common::reconciler(&host);
	host.append_element(&root, "header", &[]);
	reconciler.set_offset(1);

	let mut events = EventRegistry::new();
	let first = text::<()>("a");
	events.add_child(&Path::root(), 0, &first);
	reconciler.render(&first);
	assert_eq!(host.inner_html(&root), "<header></header>a");

	let second = text("b");
	reconciler.push(diff(&mut events, &first, &second));
	assert_eq!(host.inner_html(&root), "<header></header>b");

	let third = element("p", vec![], vec![]);
	reconciler.push(diff(&mut events, &second, &third));
	assert_eq!(host.inner_html(&root), "<header></header><p></p>");
}

#[test]
fn form_state_is_written_as_properties() {
	common::init_logging();
	let live = Live::new(element::<()>("form", vec![], vec![
		element("input", vec![value("typed"), checked(true)], vec![]),
		element("textarea", vec![default_value("initial")], vec![]),
	]));
	let form = live.host.child_at(&live.root, 0).unwrap();
	let input = live.host.child_at(&form, 0).unwrap();
	let textarea = live.host.child_at(&form, 1).unwrap();

	assert_eq!(live.host.property(&input, "value"), Some(json!("typed")));
	assert_eq!(live.host.property(&input, "checked"), Some(json!(true)));
	assert_eq!(live.host.property(&textarea, "defaultValue"), Some(json!("initial")));
	assert_eq!(live.host.attribute(&textarea, "virtual:defaultValue"), None);
}

#[test]
fn unchecking_resets_the_property() {
	let mut live = Live::new(element::<()>("input", vec![checked(true)], vec![]));
	let input = live.host.child_at(&live.root, 0).unwrap();
	live.update(element("input", vec![checked(false)], vec![]));
	assert_eq!(live.host.attribute(&input, "checked"), None);
	assert_eq!(live.host.property(&input, "checked"), Some(json!(false)));
}

#[test]
fn autofocus_waits_for_a_microtask() {
	common::init_logging();
	let live = Live::new(element::<()>("input", vec![autofocus(true)], vec![]));
	let input = live.host.child_at(&live.root, 0).unwrap();
	assert_eq!(live.host.focused(), None);
	live.host.run_microtasks();
	assert_eq!(live.host.focused(), Some(input));
}

#[test]
fn autoplay_starts_playback() {
	common::init_logging();
	let live = Live::new(element::<()>("video", vec![attribute("autoplay", "")], vec![]));
	let video = live.host.child_at(&live.root, 0).unwrap();
	assert_eq!(live.host.played(), [video]);

	let live = Live::new(element::<()>("audio", vec![property("autoplay", true)], vec![]));
	assert_eq!(live.host.played().len(), 1);
}

#[test]
fn rejected_playback_is_not_fatal() {
	common::init_logging();
	let host = MemoryDom::new();
	host.reject_playback(true);
	let (root, mut reconciler) = common::reconciler(&host);
	reconciler.render(&element::<()>("video", vec![attribute("autoplay", "")], vec![]));
	assert!(host.played().is_empty());
	assert_eq!(host.inner_html(&root), r#"<video autoplay=""></video>"#);
}

#[test]
fn listeners_are_passive_unless_they_prevent_default() {
	common::init_logging();
	let mut live = Live::new(element("form", vec![on_submit(|_| ())], vec![element("button", vec![on_click(())], vec![])]));
	let form = live.host.child_at(&live.root, 0).unwrap();
	let button = live.host.child_at(&form, 0).unwrap();
	assert_eq!(live.host.listeners(&form), [("submit".to_owned(), false)]);
	assert_eq!(live.host.listeners(&button), [("click".to_owned(), true)]);

	live.update(element("form", vec![on_submit(|_| ())], vec![element("button", vec![on_click(()).prevent_default()], vec![])]));
	assert_eq!(live.host.listeners(&button), [("click".to_owned(), false)]);

	live.update(element("form", vec![], vec![element("button", vec![], vec![])]));
	assert!(live.host.listeners(&form).is_empty());
	assert!(live.host.listeners(&button).is_empty());
}

#[test]
fn removed_subtrees_release_their_metadata() {
	common::init_logging();
	let mut live = Live::new(element::<()>("div", vec![], vec![element("ul", vec![], vec![element("li", vec![], vec![]), element("li", vec![], vec![])])]));
	assert_eq!(live.reconciler.tracked_nodes(), 5);

	live.update(element("div", vec![], vec![]));
	assert_eq!(live.html(), "<div></div>");
	assert_eq!(live.reconciler.tracked_nodes(), 2);

	live.update(list(&["a", "b"]));
	// Root, ul, two li and their text.
	assert_eq!(live.reconciler.tracked_nodes(), 6);
	live.update(list(&["b"]));
	assert_eq!(live.reconciler.tracked_nodes(), 4);
}

#[test]
fn teardown_forgets_everything() {
	let mut live = Live::new(list(&["a"]));
	live.reconciler.teardown();
	assert_eq!(live.reconciler.tracked_nodes(), 0);
	assert_eq!(live.html(), "<ul><li>a</li></ul>");
}

#[test]
fn keyed_nodes_can_change_kind_while_moving() {
	common::init_logging();
	let mut live: Live<()> = Live::new(keyed("ul", vec![], [("a", element("li", vec![], vec![text("A")])), ("b", element("p", vec![], vec![text("B")]))]));
	let ul = live.host.child_at(&live.root, 0).unwrap();
	let a = live.host.child_at(&ul, 0).unwrap();

	live.update(keyed("ul", vec![], [("b", element("span", vec![], vec![text("B")])), ("a", element("li", vec![], vec![text("A")]))]));
	assert_eq!(live.html(), "<ul><span>B</span><li>A</li></ul>");
	assert_eq!(live.host.child_at(&ul, 1), Some(a));

	assert_transition(
		keyed("ul", vec![], [("a", text("a")), ("b", element("li", vec![], vec![])), ("c", keyed_fragment(items(&["x"])))]),
		keyed("ul", vec![], [("c", element("li", vec![], vec![])), ("b", text("b")), ("a", keyed_fragment(items(&["y", "z"])))]),
	);
}

#[test]
fn keyed_fragments_move_as_a_whole() {
	common::init_logging();
	let list = |fragment: &[&str], first: bool| {
		let a = ("a".to_owned(), element("li", vec![], vec![text("a")]));
		let f = ("f".to_owned(), keyed_fragment(items(fragment)));
		keyed("ul", vec![], if first { vec![f, a] } else { vec![a, f] })
	};

	let mut live = Live::new(list(&["x"], false));
	let ul = live.host.child_at(&live.root, 0).unwrap();
	let x = live.host.child_at(&ul, 2).unwrap();
	let created = live.host.created_nodes();

	// Grows while moving: the new item is placed inside the fragment, not before it.
	live.update(list(&["y", "x"], true));
	assert_eq!(live.html(), "<ul><li>y</li><li>x</li><li>a</li></ul>");
	assert_eq!(live.structure(), common::render_structure(&list(&["y", "x"], true)));
	assert_eq!(live.host.child_at(&ul, 2), Some(x));
	// One `<li>` and its text.
	assert_eq!(live.host.created_nodes(), created + 2);

	live.update(list(&["x", "y", "z"], false));
	assert_eq!(live.html(), "<ul><li>a</li><li>x</li><li>y</li><li>z</li></ul>");

	// Shrinks while moving.
	live.update(list(&["z"], true));
	assert_eq!(live.html(), "<ul><li>z</li><li>a</li></ul>");
	assert_eq!(live.structure(), common::render_structure(&list(&["z"], true)));

	live.update(list(&[], false));
	assert_eq!(live.html(), "<ul><li>a</li></ul>");
	assert_eq!(live.structure(), common::render_structure(&list(&[], false)));
}

#[test]
fn removed_nodes_are_dropped_by_the_host() {
	common::init_logging();
	let mut live = Live::new(list(&["a", "b", "c"]));
	let initial = live.host.live_nodes();

	for _ in 0..3 {
		live.update(list(&["c", "d"]));
		assert!(live.host.live_nodes() < initial);
		live.update(element("ul", vec![], vec![raw_html("", "li", vec![], "<b>raw</b>")]));
		live.update(list(&["a", "b", "c"]));
		assert_eq!(live.host.live_nodes(), initial);
	}

	let host = MemoryDom::new();
	let root = host.create_root();
	let div = host.append_element(&root, "div", &[]);
	host.append_text(&div, "a");
	let b = host.append_element(&div, "b", &[]);
	host.append_text(&b, "b");
	assert_eq!(host.live_nodes(), 5);
	host.set_inner_html(&div, "<i>x</i>");
	assert_eq!(host.live_nodes(), 2);
	host.remove_child(&root, &div);
	assert_eq!(host.live_nodes(), 1);
}
