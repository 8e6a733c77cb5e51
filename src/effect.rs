//! Side effects requested by [`Application::update`](`crate::runtime::Application::update`).

use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
};
use serde_json::Value;
use std::rc::Rc;
use tracing::trace;

/// What a running [`Task`] can do.
pub struct Actions<'r, Msg> {
	dispatch: &'r dyn Fn(Msg, bool),
	emit: &'r dyn Fn(&str, Value),
	root: &'r dyn Any,
}

impl<'r, Msg> Actions<'r, Msg> {
	pub(crate) fn new(dispatch: &'r dyn Fn(Msg, bool), emit: &'r dyn Fn(&str, Value), root: &'r dyn Any) -> Self {
		Self { dispatch, emit, root }
	}

	/// Queues `message` behind the one being processed.
	pub fn dispatch(&self, message: Msg) {
		(self.dispatch)(message, false);
	}

	/// Like [`Actions::dispatch`], but renders synchronously once the queue is drained.
	pub fn dispatch_immediate(&self, message: Msg) {
		(self.dispatch)(message, true);
	}

	/// Fires a custom event on the mount root.
	pub fn emit(&self, name: &str, data: Value) {
		(self.emit)(name, data);
	}

	/// Subscribes a server component to `selector`. Client applications have nothing to subscribe, so this does nothing.
	pub fn select<S>(&self, _selector: S) {
		trace!("Ignoring a selection outside a server component.");
	}

	/// The mount root. Downcast it to the host's node type.
	#[must_use]
	pub fn root(&self) -> &dyn Any {
		self.root
	}
}

pub type Task<Msg> = Box<dyn FnOnce(&Actions<'_, Msg>)>;

/// Tasks to run right after an update, before the next paint, or after it.
pub struct Effect<Msg> {
	pub(crate) synchronous: Vec<Task<Msg>>,
	pub(crate) before_paint: Vec<Task<Msg>>,
	pub(crate) after_paint: Vec<Task<Msg>>,
}

impl<Msg> Default for Effect<Msg> {
	fn default() -> Self {
		Self {
			synchronous: Vec::new(),
			before_paint: Vec::new(),
			after_paint: Vec::new(),
		}
	}
}

impl<Msg> Debug for Effect<Msg> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Effect")
			.field("synchronous", &self.synchronous.len())
			.field("before_paint", &self.before_paint.len())
			.field("after_paint", &self.after_paint.len())
			.finish()
	}
}

impl<Msg: 'static> Effect<Msg> {
	#[must_use]
	pub fn none() -> Self {
		Self::default()
	}

	/// Runs `task` synchronously after the update that returned this effect.
	#[allow(clippy::should_implement_trait)]
	pub fn from(task: impl FnOnce(&Actions<'_, Msg>) + 'static) -> Self {
		Self {
			synchronous: vec![Box::new(task)],
			..Self::default()
		}
	}

	/// Dispatches `message` right after the current one.
	pub fn message(message: Msg) -> Self {
		Self::from(move |actions| actions.dispatch(message))
	}

	/// Runs `task` after the next render is applied but before the host paints.
	pub fn before_paint(task: impl FnOnce(&Actions<'_, Msg>) + 'static) -> Self {
		Self {
			before_paint: vec![Box::new(task)],
			..Self::default()
		}
	}

	/// Runs `task` on the animation frame after the next render.
	pub fn after_paint(task: impl FnOnce(&Actions<'_, Msg>) + 'static) -> Self {
		Self {
			after_paint: vec![Box::new(task)],
			..Self::default()
		}
	}

	/// Fires a custom event named `name` on the mount root.
	pub fn event(name: impl Into<String>, data: Value) -> Self {
		let name = name.into();
		Self::from(move |actions| actions.emit(&name, data))
	}

	pub fn batch(effects: impl IntoIterator<Item = Self>) -> Self {
		effects.into_iter().fold(Self::none(), |mut batch, effect| {
			batch.synchronous.extend(effect.synchronous);
			batch.before_paint.extend(effect.before_paint);
			batch.after_paint.extend(effect.after_paint);
			batch
		})
	}

	#[must_use]
	pub fn is_none(&self) -> bool {
		self.synchronous.is_empty() && self.before_paint.is_empty() && self.after_paint.is_empty()
	}

	/// Converts the messages this effect dispatches, like [`Node::map`](`crate::node::Node::map`).
	pub fn map<B: 'static>(self, f: impl Fn(Msg) -> B + 'static) -> Effect<B> {
		let f: Rc<dyn Fn(Msg) -> B> = Rc::new(f);
		let map_tasks = |tasks: Vec<Task<Msg>>| -> Vec<Task<B>> { tasks.into_iter().map(|task| map_task(task, Rc::clone(&f))).collect() };
		Effect {
			synchronous: map_tasks(self.synchronous),
			before_paint: map_tasks(self.before_paint),
			after_paint: map_tasks(self.after_paint),
		}
	}
}

fn map_task<A: 'static, B: 'static>(task: Task<A>, f: Rc<dyn Fn(A) -> B>) -> Task<B> {
	Box::new(move |actions: &Actions<'_, B>| {
		let dispatch = |message: A, immediate: bool| (actions.dispatch)(f(message), immediate);
		task(&Actions::new(&dispatch, actions.emit, actions.root));
	})
}
