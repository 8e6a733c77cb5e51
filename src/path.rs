//! Addresses of nodes within a mounted tree.
//!
//! Paths are computed fresh on each diff (sibling indices shift between renders),
//! so they are compared in their rendered string form.
//! Index segments are prefixed with [`SEPARATOR_INDEX`], key segments with [`SEPARATOR_KEY`].
//! The leading separator of the root-most segment is dropped.

use core::fmt::{self, Display, Formatter, Write};
use std::rc::Rc;

pub const SEPARATOR_INDEX: char = '\n';
pub const SEPARATOR_KEY: char = '\t';
pub const SEPARATOR_EVENT: char = '\u{c}';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
	Index(usize),
	Key(Rc<str>),
}

/// A root-to-leaf sequence of [`Segment`]s.
///
/// The empty path addresses the mount root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
	segments: Vec<Segment>,
}

impl Path {
	#[must_use]
	pub fn root() -> Self {
		Self::default()
	}

	/// Appends [`Segment::Index`] if `key` is empty, [`Segment::Key`] otherwise.
	#[must_use]
	pub fn add(&self, index: usize, key: &str) -> Self {
		let mut segments = Vec::with_capacity(self.segments.len() + 1);
		segments.extend_from_slice(&self.segments);
		segments.push(if key.is_empty() {
			Segment::Index(index)
		} else {
			Segment::Key(key.into())
		});
		Self { segments }
	}

	#[must_use]
	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	/// Whether the rendered path starts with any of `candidates`.
	///
	/// This is a plain prefix test, so `"1"` also matches `"12"`.
	#[must_use]
	pub fn matches<S: AsRef<str>>(&self, candidates: &[S]) -> bool {
		if candidates.is_empty() {
			return false;
		}
		let rendered = self.to_string();
		candidates
			.iter()
			.any(|candidate| rendered.starts_with(candidate.as_ref()))
	}

	/// The registry key of the listener `name` on the node at this path.
	#[must_use]
	pub fn event_key(&self, name: &str) -> String {
		event_key(&self.to_string(), name)
	}
}

impl FromIterator<Segment> for Path {
	fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
		Self {
			segments: iter.into_iter().collect(),
		}
	}
}

impl Display for Path {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.segments.iter().enumerate() {
			match segment {
				Segment::Index(index) => {
					if i > 0 {
						f.write_char(SEPARATOR_INDEX)?;
					}
					write!(f, "{}", index)?;
				}
				Segment::Key(key) => {
					if i > 0 {
						f.write_char(SEPARATOR_KEY)?;
					}
					f.write_str(key)?;
				}
			}
		}
		Ok(())
	}
}

pub(crate) fn event_key(path: &str, name: &str) -> String {
	let mut key = String::with_capacity(path.len() + 1 + name.len());
	key.push_str(path);
	key.push(SEPARATOR_EVENT);
	key.push_str(name);
	key
}
