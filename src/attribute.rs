//! Attributes, properties and event listeners attached to element nodes.

use crate::{decode::Decoder, host::FORM_DATA};
use core::{
	cmp::Ordering,
	fmt::{self, Debug, Formatter},
};
use serde_json::Value;
use std::rc::Rc;
use tracing::{level_filters::STATIC_MAX_LEVEL, warn, Level};

/// Writes the `defaultValue` property rather than an HTML attribute.
pub const DEFAULT_VALUE: &str = "virtual:defaultValue";

/// Events that bypass the animation frame and render synchronously by default.
const IMMEDIATE_EVENTS: [&str; 7] = ["input", "change", "focus", "focusin", "focusout", "blur", "select"];

#[must_use]
pub fn is_immediate_event(name: &str) -> bool {
	IMMEDIATE_EVENTS.contains(&name)
}

pub enum Attr<Msg> {
	Attribute { name: String, value: String },
	Property { name: String, value: Value },
	Listener(Listener<Msg>),
}

pub struct Listener<Msg> {
	pub name: String,
	pub decoder: Decoder<Msg>,
	/// Dotted paths the host should extract from the raw event into the decoder's payload.
	pub include: Vec<String>,
	pub prevent_default: bool,
	pub stop_propagation: bool,
	pub immediate: bool,
	/// Milliseconds, `0` to disable.
	pub debounce: u32,
	/// Milliseconds, `0` to disable.
	pub throttle: u32,
}

impl<Msg> Listener<Msg> {
	/// Whether anything besides the decoder differs.
	#[must_use]
	pub fn config_differs(&self, other: &Self) -> bool {
		self.prevent_default != other.prevent_default
			|| self.stop_propagation != other.stop_propagation
			|| self.immediate != other.immediate
			|| self.debounce != other.debounce
			|| self.throttle != other.throttle
			|| self.include != other.include
	}
}

impl<Msg> Attr<Msg> {
	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Attr::Attribute { name, .. } | Attr::Property { name, .. } => name,
			Attr::Listener(listener) => &listener.name,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Attr::Attribute { .. } => "attribute",
			Attr::Property { .. } => "property",
			Attr::Listener(_) => "listener",
		}
	}

	fn map_listener(mut self, f: impl FnOnce(&mut Listener<Msg>)) -> Self {
		if let Attr::Listener(listener) = &mut self {
			f(listener);
		} else if STATIC_MAX_LEVEL >= Level::WARN {
			warn!("Listener modifier applied to a {} `{}`, ignoring.", self.kind(), self.name());
		}
		self
	}

	/// Cancels the event's default action. Listeners with this set are not attached as passive.
	#[must_use]
	pub fn prevent_default(self) -> Self {
		self.map_listener(|listener| listener.prevent_default = true)
	}

	#[must_use]
	pub fn stop_propagation(self) -> Self {
		self.map_listener(|listener| listener.stop_propagation = true)
	}

	/// Messages from this listener render synchronously instead of on the next animation frame.
	#[must_use]
	pub fn immediate(self, immediate: bool) -> Self {
		self.map_listener(|listener| listener.immediate = immediate)
	}

	/// Only dispatches after `ms` milliseconds passed without another event.
	#[must_use]
	pub fn debounce(self, ms: u32) -> Self {
		self.map_listener(|listener| listener.debounce = ms)
	}

	/// Dispatches at most once per `ms` milliseconds and suppresses the rest.
	#[must_use]
	pub fn throttle(self, ms: u32) -> Self {
		self.map_listener(|listener| listener.throttle = ms)
	}

	#[must_use]
	pub fn include(self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.map_listener(move |listener| listener.include.extend(paths.into_iter().map(Into::into)))
	}

	pub(crate) fn map<B: 'static>(self, f: &Rc<dyn Fn(Msg) -> B>) -> Attr<B>
	where
		Msg: 'static,
	{
		match self {
			Attr::Attribute { name, value } => Attr::Attribute { name, value },
			Attr::Property { name, value } => Attr::Property { name, value },
			Attr::Listener(listener) => Attr::Listener(Listener {
				name: listener.name,
				decoder: listener.decoder.map(Rc::clone(f)),
				include: listener.include,
				prevent_default: listener.prevent_default,
				stop_propagation: listener.stop_propagation,
				immediate: listener.immediate,
				debounce: listener.debounce,
				throttle: listener.throttle,
			}),
		}
	}
}

impl<Msg> Clone for Attr<Msg> {
	fn clone(&self) -> Self {
		match self {
			Attr::Attribute { name, value } => Attr::Attribute {
				name: name.clone(),
				value: value.clone(),
			},
			Attr::Property { name, value } => Attr::Property {
				name: name.clone(),
				value: value.clone(),
			},
			Attr::Listener(listener) => Attr::Listener(Listener {
				name: listener.name.clone(),
				decoder: listener.decoder.clone(),
				include: listener.include.clone(),
				prevent_default: listener.prevent_default,
				stop_propagation: listener.stop_propagation,
				immediate: listener.immediate,
				debounce: listener.debounce,
				throttle: listener.throttle,
			}),
		}
	}
}

impl<Msg> Debug for Attr<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Attr::Attribute { name, value } => f.debug_struct("Attribute").field("name", name).field("value", value).finish(),
			Attr::Property { name, value } => f.debug_struct("Property").field("name", name).field("value", value).finish(),
			Attr::Listener(listener) => f
				.debug_struct("Listener")
				.field("name", &listener.name)
				.field("include", &listener.include)
				.field("prevent_default", &listener.prevent_default)
				.field("stop_propagation", &listener.stop_propagation)
				.field("immediate", &listener.immediate)
				.field("debounce", &listener.debounce)
				.field("throttle", &listener.throttle)
				.finish_non_exhaustive(),
		}
	}
}

/// Brings `attributes` into canonical order.
///
/// Drops unnamed attributes and empty `class`/`style` values, sorts by name (stably),
/// joins repeated `class` with `" "` and repeated `style` with `";"`.
/// Any other repeated name keeps only its last occurrence.
pub(crate) fn normalize<Msg>(mut attributes: Vec<Attr<Msg>>) -> Vec<Attr<Msg>> {
	attributes.retain(|attribute| match attribute {
		Attr::Attribute { name, value } => !(name.is_empty() || (value.is_empty() && merge_separator(name).is_some())),
		_ => true,
	});
	if attributes.len() < 2 {
		return attributes;
	}

	attributes.sort_by(|a, b| a.name().cmp(b.name()));

	let mut merged: Vec<Attr<Msg>> = Vec::with_capacity(attributes.len());
	for attribute in attributes {
		if let Some(last) = merged.last_mut() {
			if last.name().cmp(attribute.name()) == Ordering::Equal {
				if let (Attr::Attribute { name, value: merged_value }, Attr::Attribute { value, .. }) = (&mut *last, &attribute) {
					if let Some(separator) = merge_separator(name.as_str()) {
						merged_value.push_str(separator);
						merged_value.push_str(value);
						continue;
					}
				}
				*last = attribute;
				continue;
			}
		}
		merged.push(attribute);
	}
	merged
}

fn merge_separator(name: &str) -> Option<&'static str> {
	match name {
		"class" => Some(" "),
		"style" => Some(";"),
		_ => None,
	}
}

pub fn attribute<Msg>(name: impl Into<String>, value: impl Into<String>) -> Attr<Msg> {
	Attr::Attribute {
		name: name.into(),
		value: value.into(),
	}
}

pub fn property<Msg>(name: impl Into<String>, value: impl Into<Value>) -> Attr<Msg> {
	Attr::Property {
		name: name.into(),
		value: value.into(),
	}
}

/// Present with an empty value if `present`, otherwise dropped through an empty name.
pub fn boolean_attribute<Msg>(name: impl Into<String>, present: bool) -> Attr<Msg> {
	if present {
		attribute(name, "")
	} else {
		attribute("", "")
	}
}

pub fn class<Msg>(name: impl Into<String>) -> Attr<Msg> {
	attribute("class", name)
}

/// Joins the names whose flag is set.
pub fn classes<'a, Msg>(names: impl IntoIterator<Item = (&'a str, bool)>) -> Attr<Msg> {
	let joined = names
		.into_iter()
		.filter_map(|(name, active)| active.then(|| name))
		.collect::<Vec<_>>()
		.join(" ");
	class(joined)
}

pub fn style<Msg>(property: &str, value: &str) -> Attr<Msg> {
	attribute("style", format!("{}:{}", property, value))
}

pub fn styles<'a, Msg>(declarations: impl IntoIterator<Item = (&'a str, &'a str)>) -> Attr<Msg> {
	let joined = declarations
		.into_iter()
		.map(|(property, value)| format!("{}:{}", property, value))
		.collect::<Vec<_>>()
		.join(";");
	attribute("style", joined)
}

pub fn id<Msg>(id: impl Into<String>) -> Attr<Msg> {
	attribute("id", id)
}

pub fn value<Msg>(value: impl Into<String>) -> Attr<Msg> {
	attribute("value", value)
}

pub fn default_value<Msg>(value: impl Into<String>) -> Attr<Msg> {
	attribute(DEFAULT_VALUE, value)
}

pub fn href<Msg>(url: impl Into<String>) -> Attr<Msg> {
	attribute("href", url)
}

pub fn type_<Msg>(name: impl Into<String>) -> Attr<Msg> {
	attribute("type", name)
}

pub fn name<Msg>(name: impl Into<String>) -> Attr<Msg> {
	attribute("name", name)
}

pub fn placeholder<Msg>(text: impl Into<String>) -> Attr<Msg> {
	attribute("placeholder", text)
}

pub fn checked<Msg>(checked: bool) -> Attr<Msg> {
	boolean_attribute("checked", checked)
}

pub fn disabled<Msg>(disabled: bool) -> Attr<Msg> {
	boolean_attribute("disabled", disabled)
}

pub fn hidden<Msg>(hidden: bool) -> Attr<Msg> {
	boolean_attribute("hidden", hidden)
}

pub fn autofocus<Msg>(autofocus: bool) -> Attr<Msg> {
	boolean_attribute("autofocus", autofocus)
}

/// Listens for `name` events.
///
/// [Immediate](`is_immediate_event`) event names render synchronously unless changed with [`Attr::immediate`].
pub fn on<Msg>(name: impl Into<String>, decoder: Decoder<Msg>) -> Attr<Msg> {
	let name = name.into();
	Attr::Listener(Listener {
		immediate: is_immediate_event(&name),
		name,
		decoder,
		include: Vec::new(),
		prevent_default: false,
		stop_propagation: false,
		debounce: 0,
		throttle: 0,
	})
}

pub fn on_click<Msg: Clone + 'static>(message: Msg) -> Attr<Msg> {
	on("click", Decoder::succeed(message))
}

pub fn on_mouse_down<Msg: Clone + 'static>(message: Msg) -> Attr<Msg> {
	on("mousedown", Decoder::succeed(message))
}

pub fn on_mouse_over<Msg: Clone + 'static>(message: Msg) -> Attr<Msg> {
	on("mouseover", Decoder::succeed(message))
}

pub fn on_focus<Msg: Clone + 'static>(message: Msg) -> Attr<Msg> {
	on("focus", Decoder::succeed(message))
}

pub fn on_blur<Msg: Clone + 'static>(message: Msg) -> Attr<Msg> {
	on("blur", Decoder::succeed(message))
}

/// Receives the form's entries as `(name, value)` pairs, in document order. Prevents the default navigation.
pub fn on_submit<Msg: 'static>(to_message: impl Fn(Vec<(String, String)>) -> Msg + 'static) -> Attr<Msg> {
	on("submit", Decoder::field(FORM_DATA, to_message)).prevent_default()
}

pub fn on_keydown<Msg: 'static>(to_message: impl Fn(String) -> Msg + 'static) -> Attr<Msg> {
	on("keydown", Decoder::field("key", to_message)).include(["key"])
}

pub fn on_input<Msg: 'static>(to_message: impl Fn(String) -> Msg + 'static) -> Attr<Msg> {
	on("input", Decoder::field("target.value", to_message))
}

pub fn on_change<Msg: 'static>(to_message: impl Fn(String) -> Msg + 'static) -> Attr<Msg> {
	on("change", Decoder::field("target.value", to_message))
}

pub fn on_check<Msg: 'static>(to_message: impl Fn(bool) -> Msg + 'static) -> Attr<Msg> {
	on("change", Decoder::field("target.checked", to_message))
}
