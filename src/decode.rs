//! Event payload decoders.
//!
//! A [`Decoder`] turns the JSON-shaped payload the host extracts from a platform event into a message.
//! Failures are [`DecodeError`]s, which the runtime treats as "drop this event".

use core::fmt::{self, Debug, Formatter};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("missing field `{path}`")]
	Missing { path: String },
	#[error("field `{path}` has an unexpected shape: {source}")]
	Shape {
		path: String,
		#[source]
		source: serde_json::Error,
	},
	#[error("{0}")]
	Custom(String),
}

pub struct Decoder<Msg>(Rc<dyn Fn(&Value) -> Result<Msg, DecodeError>>);

impl<Msg> Clone for Decoder<Msg> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<Msg> Debug for Decoder<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Decoder").field(&Rc::as_ptr(&self.0)).finish()
	}
}

impl<Msg> Decoder<Msg> {
	pub fn run(&self, payload: &Value) -> Result<Msg, DecodeError> {
		(self.0)(payload)
	}
}

impl<Msg: 'static> Decoder<Msg> {
	pub fn new(decode: impl Fn(&Value) -> Result<Msg, DecodeError> + 'static) -> Self {
		Self(Rc::new(decode))
	}

	/// Ignores the payload and always produces `message`.
	pub fn succeed(message: Msg) -> Self
	where
		Msg: Clone,
	{
		Self::new(move |_| Ok(message.clone()))
	}

	/// Deserializes the value at the dotted `path` (for example `"target.value"`) and passes it to `to_message`.
	///
	/// An empty `path` addresses the whole payload.
	pub fn field<T: DeserializeOwned>(path: &str, to_message: impl Fn(T) -> Msg + 'static) -> Self {
		let path = path.to_owned();
		Self::new(move |payload| {
			let value = lookup(payload, &path).ok_or_else(|| DecodeError::Missing { path: path.clone() })?;
			let value = T::deserialize(value).map_err(|source| DecodeError::Shape {
				path: path.clone(),
				source,
			})?;
			Ok(to_message(value))
		})
	}

	/// Composes `f` onto this decoder's output once, rather than on each event.
	pub fn map<B: 'static>(self, f: Rc<dyn Fn(Msg) -> B>) -> Decoder<B> {
		let inner = self.0;
		Decoder::new(move |payload| inner(payload).map(|message| f(message)))
	}
}

pub(crate) fn lookup<'a>(mut value: &'a Value, path: &str) -> Option<&'a Value> {
	if path.is_empty() {
		return Some(value);
	}
	for segment in path.split('.') {
		value = match value {
			Value::Object(map) => map.get(segment)?,
			Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(value)
}

/// Stores `value` at the dotted `path`, creating (or overwriting with) objects along the way.
pub(crate) fn insert_path(payload: &mut Map<String, Value>, path: &str, value: Value) {
	let mut segments = path.split('.').peekable();
	let mut object = payload;
	while let Some(segment) = segments.next() {
		if segments.peek().is_none() {
			object.insert(segment.to_owned(), value);
			return;
		}
		let entry = object.entry(segment.to_owned()).or_insert_with(|| Value::Object(Map::new()));
		if !entry.is_object() {
			*entry = Value::Object(Map::new());
		}
		object = match entry {
			Value::Object(map) => map,
			_ => return,
		};
	}
}
