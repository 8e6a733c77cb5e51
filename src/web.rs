//! A [`Host`] backed by the browser DOM.

use crate::{
	decode::insert_path,
	host::{Callback, EventSink, Host, HostError, LiveNode, FORM_DATA},
	node::NAMESPACE_HTML,
	runtime::MountError,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use js_sys::{Array, Function, Object, Promise, Reflect, Symbol, WeakSet};
use serde_json::{Map, Number, Value};
use std::rc::Rc;
use tracing::{error, instrument, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{AddEventListenerOptions, CustomEvent, CustomEventInit, Document, Element, FormData, HtmlElement, HtmlFormElement, Text, Window};

thread_local! {
	static NEXT_NODE_ID: Cell<u64> = Cell::new(1);
	static MOUNTED_ROOTS: WeakSet = WeakSet::new();
}

const NODE_ID_SYMBOL: &str = "keyed-dom.node-id";

type Sink = Option<EventSink<web_sys::Node, web_sys::Event>>;

/// Drives the browser DOM. Create one per mounted application, since [`Host::listen`] replaces the previous sink.
#[derive(Clone)]
pub struct WebHost {
	inner: Rc<Inner>,
}

struct Inner {
	window: Window,
	document: Document,
	node_id_symbol: Symbol,
	sink: Rc<RefCell<Sink>>,
	common_handler: Closure<dyn Fn(web_sys::Event)>,
	playback_rejected: Closure<dyn FnMut(JsValue)>,
	event_listener_options_cache: RefCell<[Option<AddEventListenerOptions>; 2]>,
}

impl Debug for WebHost {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebHost").field("listening", &self.inner.sink.borrow().is_some()).finish_non_exhaustive()
	}
}

impl WebHost {
	/// # Errors
	///
	/// [`MountError::NotABrowser`] if there is no `window` with a `document`.
	#[instrument]
	pub fn new() -> Result<Self, MountError> {
		let window = web_sys::window().ok_or(MountError::NotABrowser)?;
		let document = window.document().ok_or(MountError::NotABrowser)?;
		let sink: Rc<RefCell<Sink>> = Rc::default();
		let common_handler = {
			let sink = Rc::clone(&sink);
			Closure::wrap(Box::new(move |event: web_sys::Event| {
				let span = trace_span!("common_handler", event = %event.type_());
				let _enter = span.enter();

				let node = match event.current_target().and_then(|target| target.dyn_into::<web_sys::Node>().ok()) {
					Some(node) => node,
					None => return warn!("Received an event without a current target node."),
				};
				let sink = sink.borrow().clone();
				if let Some(sink) = sink {
					sink(&node, &event);
				}
			}) as Box<dyn Fn(web_sys::Event)>)
		};
		Ok(Self {
			inner: Rc::new(Inner {
				window,
				document,
				node_id_symbol: Symbol::for_(NODE_ID_SYMBOL),
				sink,
				common_handler,
				playback_rejected: Closure::wrap(Box::new(|error: JsValue| error!("Media playback was rejected: {:?}", error)) as Box<dyn FnMut(JsValue)>),
				event_listener_options_cache: RefCell::new([None, None]),
			}),
		})
	}

	/// Finds the first element matching `selector`, to mount into.
	///
	/// # Errors
	///
	/// [`MountError::ElementNotFound`] if nothing matches or the selector is invalid.
	pub fn query(&self, selector: &str) -> Result<web_sys::Node, MountError> {
		match self.inner.document.query_selector(selector) {
			Ok(Some(element)) => Ok(element.into()),
			Ok(None) | Err(_) => Err(MountError::ElementNotFound(selector.to_owned())),
		}
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.inner.document
	}

	fn listener(&self) -> &Function {
		self.inner.common_handler.as_ref().unchecked_ref()
	}

	fn event_listener_options(&self, passive: bool) -> AddEventListenerOptions {
		let mut cache = self.inner.event_listener_options_cache.borrow_mut();
		cache[usize::from(passive)]
			.get_or_insert_with(|| {
				let mut options = AddEventListenerOptions::new();
				options.passive(passive);
				options
			})
			.clone()
	}
}

fn log_failure(operation: &str, result: Result<impl Sized, JsValue>) {
	if let Err(error) = result {
		error!("{} failed: {:?}", operation, error);
	}
}

/// Converts JSON into plain JavaScript values.
#[must_use]
pub fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Null => JsValue::NULL,
		Value::Bool(bool) => JsValue::from_bool(*bool),
		Value::Number(number) => number.as_f64().map_or(JsValue::NULL, JsValue::from_f64),
		Value::String(string) => JsValue::from_str(string),
		Value::Array(items) => items.iter().map(to_js).collect::<Array>().into(),
		Value::Object(entries) => {
			let object = Object::new();
			for (key, value) in entries {
				log_failure("Reflect.set", Reflect::set(&object, &JsValue::from_str(key), &to_js(value)));
			}
			object.into()
		}
	}
}

/// Converts primitives and arrays of them. Other objects become [`Value::Null`].
#[must_use]
pub fn from_js(value: &JsValue) -> Value {
	if let Some(string) = value.as_string() {
		Value::String(string)
	} else if let Some(bool) = value.as_bool() {
		Value::Bool(bool)
	} else if let Some(number) = value.as_f64() {
		Number::from_f64(number).map_or(Value::Null, Value::Number)
	} else if Array::is_array(value) {
		Array::from(value).iter().map(|item| from_js(&item)).collect()
	} else {
		Value::Null
	}
}

/// The submitted form's entries as `[name, value]` pairs. Files are left out.
fn form_entries(event: &web_sys::Event) -> Option<Value> {
	let form = event.target()?.dyn_into::<HtmlFormElement>().ok()?;
	let data = FormData::new_with_form(&form).ok()?;
	let entries = Array::from(&data.entries())
		.iter()
		.filter_map(|entry| {
			let entry = Array::from(&entry);
			Some(Value::Array(vec![Value::String(entry.get(0).as_string()?), Value::String(entry.get(1).as_string()?)]))
		})
		.collect();
	Some(Value::Array(entries))
}

impl Host for WebHost {
	type Node = web_sys::Node;
	type Event = web_sys::Event;
	type Timer = i32;
	type Frame = i32;

	fn node_id(&self, node: &web_sys::Node) -> u64 {
		let symbol: &JsValue = self.inner.node_id_symbol.as_ref();
		if let Some(id) = Reflect::get(node, symbol).ok().and_then(|id| id.as_f64()) {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			let id = id as u64;
			return id;
		}
		let id = NEXT_NODE_ID.with(|next| next.replace(next.get() + 1));
		#[allow(clippy::cast_precision_loss)]
		let value = JsValue::from_f64(id as f64);
		log_failure("Reflect.set", Reflect::set(node, symbol, &value));
		id
	}

	fn create_element(&self, namespace: &str, tag: &str) -> web_sys::Node {
		let created = if namespace.is_empty() {
			self.inner.document.create_element(tag)
		} else {
			self.inner.document.create_element_ns(Some(namespace), tag)
		};
		match created {
			Ok(element) => element.into(),
			Err(error) => {
				error!("Could not create <{}>: {:?}. Substituting an empty text node.", tag, error);
				self.inner.document.create_text_node("").into()
			}
		}
	}

	fn create_text(&self, content: &str) -> web_sys::Node {
		self.inner.document.create_text_node(content).into()
	}

	fn parent(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.parent_node()
	}

	fn child_count(&self, node: &web_sys::Node) -> usize {
		node.child_nodes().length() as usize
	}

	fn child_at(&self, parent: &web_sys::Node, index: usize) -> Option<web_sys::Node> {
		parent.child_nodes().get(u32::try_from(index).ok()?)
	}

	fn index_of(&self, parent: &web_sys::Node, child: &web_sys::Node) -> Option<usize> {
		let children = parent.child_nodes();
		(0..children.length()).find(|i| children.get(*i).map_or(false, |node| node.is_same_node(Some(child)))).map(|i| i as usize)
	}

	fn next_sibling(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.next_sibling()
	}

	fn previous_sibling(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.previous_sibling()
	}

	fn insert_before(&self, parent: &web_sys::Node, nodes: &[web_sys::Node], reference: Option<&web_sys::Node>) {
		match nodes {
			[] => (),
			[node] => log_failure("insertBefore", parent.insert_before(node, reference)),
			_ => {
				let fragment = self.inner.document.create_document_fragment();
				for node in nodes {
					log_failure("appendChild", fragment.append_child(node));
				}
				log_failure("insertBefore", parent.insert_before(&fragment, reference));
			}
		}
	}

	/// Uses `moveBefore` where available, which keeps focus, selection and running transitions.
	fn move_before(&self, parent: &web_sys::Node, node: &web_sys::Node, reference: Option<&web_sys::Node>) {
		if let Ok(move_before) = Reflect::get(parent, &JsValue::from_str("moveBefore")) {
			if let Some(move_before) = move_before.dyn_ref::<Function>() {
				let reference = reference.map_or(JsValue::NULL, |reference| reference.clone().into());
				if move_before.call2(parent, node, &reference).is_ok() {
					return;
				}
			}
		}
		log_failure("insertBefore", parent.insert_before(node, reference));
	}

	fn remove_child(&self, parent: &web_sys::Node, child: &web_sys::Node) {
		log_failure("removeChild", parent.remove_child(child));
	}

	fn set_text(&self, node: &web_sys::Node, content: &str) {
		node.set_text_content(Some(content));
	}

	fn set_inner_html(&self, node: &web_sys::Node, inner_html: &str) {
		match node.dyn_ref::<Element>() {
			Some(element) => element.set_inner_html(inner_html),
			None => error!("Tried to set the inner HTML of a non-element node."),
		}
	}

	fn get_attribute(&self, node: &web_sys::Node, name: &str) -> Option<String> {
		node.dyn_ref::<Element>()?.get_attribute(name)
	}

	fn set_attribute(&self, node: &web_sys::Node, name: &str, value: &str) {
		match node.dyn_ref::<Element>() {
			Some(element) => log_failure("setAttribute", element.set_attribute(name, value)),
			None => error!("Tried to set an attribute on a non-element node."),
		}
	}

	fn remove_attribute(&self, node: &web_sys::Node, name: &str) {
		if let Some(element) = node.dyn_ref::<Element>() {
			log_failure("removeAttribute", element.remove_attribute(name));
		}
	}

	fn set_property(&self, node: &web_sys::Node, name: &str, value: &Value) {
		log_failure("Reflect.set", Reflect::set(node, &JsValue::from_str(name), &to_js(value)));
	}

	fn add_event_listener(&self, node: &web_sys::Node, name: &str, passive: bool) {
		let options = self.event_listener_options(passive);
		log_failure("addEventListener", node.add_event_listener_with_callback_and_add_event_listener_options(name, self.listener(), &options));
	}

	fn remove_event_listener(&self, node: &web_sys::Node, name: &str) {
		log_failure("removeEventListener", node.remove_event_listener_with_callback(name, self.listener()));
	}

	fn listen(&self, sink: EventSink<web_sys::Node, web_sys::Event>) {
		*self.inner.sink.borrow_mut() = Some(sink);
	}

	fn event_name(&self, event: &web_sys::Event) -> String {
		event.type_()
	}

	fn prevent_default(&self, event: &web_sys::Event) {
		event.prevent_default();
	}

	fn stop_propagation(&self, event: &web_sys::Event) {
		event.stop_propagation();
	}

	/// Copies each of `include`'s dotted paths out of `event`. Missing paths are left out.
	fn event_payload(&self, event: &web_sys::Event, include: &[String]) -> Value {
		let mut payload = Map::new();
		payload.insert("type".to_owned(), Value::String(event.type_()));
		for path in include {
			let mut value: JsValue = event.clone().into();
			for segment in path.split('.') {
				value = match Reflect::get(&value, &JsValue::from_str(segment)) {
					Ok(next) if !next.is_undefined() && !next.is_null() => next,
					_ => JsValue::UNDEFINED,
				};
				if value.is_undefined() {
					break;
				}
			}
			if !value.is_undefined() {
				insert_path(&mut payload, path, from_js(&value));
			}
		}
		if event.type_() == "submit" && include.iter().any(|path| path == FORM_DATA) {
			match form_entries(event) {
				Some(entries) => insert_path(&mut payload, FORM_DATA, entries),
				None => warn!("Could not read the entries of the submitted form."),
			}
		}
		Value::Object(payload)
	}

	fn focus(&self, node: &web_sys::Node) {
		match node.dyn_ref::<HtmlElement>() {
			Some(element) => log_failure("focus", element.focus()),
			None => warn!("Tried to focus a node that is not an HTML element."),
		}
	}

	fn play(&self, node: &web_sys::Node) -> Result<(), HostError> {
		let play = Reflect::get(node, &JsValue::from_str("play")).map_err(|error| HostError::Failed(format!("{:?}", error)))?;
		let play = play.dyn_ref::<Function>().ok_or(HostError::Unsupported { operation: "play" })?;
		let started = play.call0(node).map_err(|error| HostError::Playback(format!("{:?}", error)))?;
		if let Some(promise) = started.dyn_ref::<Promise>() {
			let _ = promise.catch(&self.inner.playback_rejected);
		}
		Ok(())
	}

	fn emit(&self, root: &web_sys::Node, name: &str, data: Value) {
		let mut init = CustomEventInit::new();
		init.bubbles(true).composed(true).detail(&to_js(&data));
		match CustomEvent::new_with_event_init_dict(name, &init) {
			Ok(event) => log_failure("dispatchEvent", root.dispatch_event(&event)),
			Err(error) => error!("Could not create the custom event {:?}: {:?}", name, error),
		}
	}

	fn set_timeout(&self, delay_ms: u32, callback: Callback) -> i32 {
		let callback = Closure::once_into_js(move || callback());
		let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
		self.inner
			.window
			.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
			.unwrap_or_else(|error| {
				error!("setTimeout failed: {:?}", error);
				0
			})
	}

	fn clear_timeout(&self, timer: i32) {
		self.inner.window.clear_timeout_with_handle(timer);
	}

	fn request_animation_frame(&self, callback: Callback) -> i32 {
		let callback = Closure::once_into_js(move |_: f64| callback());
		self.inner.window.request_animation_frame(callback.unchecked_ref()).unwrap_or_else(|error| {
			error!("requestAnimationFrame failed: {:?}", error);
			0
		})
	}

	fn cancel_animation_frame(&self, frame: i32) {
		log_failure("cancelAnimationFrame", self.inner.window.cancel_animation_frame(frame));
	}

	fn queue_microtask(&self, callback: Callback) {
		let callback = Closure::once_into_js(move || callback());
		self.inner.window.queue_microtask(callback.unchecked_ref());
	}

	fn now(&self) -> f64 {
		js_sys::Date::now()
	}

	fn claim_root(&self, root: &web_sys::Node) -> bool {
		let root: &Object = root.unchecked_ref();
		MOUNTED_ROOTS.with(|mounted| {
			if mounted.has(root) {
				false
			} else {
				mounted.add(root);
				true
			}
		})
	}

	fn release_root(&self, root: &web_sys::Node) {
		let root: &Object = root.unchecked_ref();
		MOUNTED_ROOTS.with(|mounted| {
			mounted.delete(root);
		});
	}

	fn inspect(&self, node: &web_sys::Node) -> LiveNode {
		if let Some(element) = node.dyn_ref::<Element>() {
			let attributes = element.attributes();
			LiveNode::Element {
				namespace: element.namespace_uri().filter(|namespace| namespace != NAMESPACE_HTML).unwrap_or_default(),
				tag: element.local_name(),
				attributes: (0..attributes.length()).filter_map(|i| attributes.item(i)).map(|attribute| (attribute.name(), attribute.value())).collect(),
			}
		} else if let Some(text) = node.dyn_ref::<Text>() {
			LiveNode::Text(text.data())
		} else {
			LiveNode::Other
		}
	}
}
