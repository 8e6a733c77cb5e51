//! The update loop: messages are drained into the model first, then the view is rendered once.

use crate::{
	diff::diff,
	effect::{Actions, Effect, Task},
	events::{EventRegistry, ResolveError},
	host::Host,
	load::virtualise,
	node::Node,
	reconciler::{DispatchFn, EventDispatch, Reconciler},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
};
use serde_json::Value;
use std::{
	collections::VecDeque,
	rc::{Rc, Weak},
};
use tracing::{debug, info, instrument, trace, warn};

/// An application driven by [`mount`].
pub trait Application: 'static {
	type Message: 'static;

	/// Called once on mount, before the first render.
	fn init(&mut self) -> Effect<Self::Message> {
		Effect::none()
	}

	fn update(&mut self, message: Self::Message) -> Effect<Self::Message>;

	/// Must not have side effects. Called at most once per render.
	fn view(&self) -> Node<Self::Message>;
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
	#[error("not running in a browser environment")]
	NotABrowser,
	#[error("no element matches the selector {0:?}")]
	ElementNotFound(String),
	#[error("the container already hosts a mounted application")]
	AlreadyMounted,
}

#[derive(Debug, Clone)]
pub struct MountOptions {
	offset: usize,
	key_attribute: String,
}

impl Default for MountOptions {
	fn default() -> Self {
		Self {
			offset: 0,
			key_attribute: "data-key".to_owned(),
		}
	}
}

impl MountOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Leaves the first `offset` children of the container alone.
	#[must_use]
	pub fn offset(mut self, offset: usize) -> Self {
		self.offset = offset;
		self
	}

	/// The attribute that carries node keys in pre-rendered markup.
	#[must_use]
	pub fn key_attribute(mut self, name: impl Into<String>) -> Self {
		self.key_attribute = name.into();
		self
	}
}

struct State<A: Application, H: Host> {
	app: A,
	vdom: Node<A::Message>,
	events: EventRegistry<A::Message>,
	reconciler: Reconciler<H>,
}

/// Work that arrived while a render held the engine.
enum Pending<H: Host> {
	Event(H::Node, H::Event),
	Dispatch(EventDispatch),
}

struct Shared<A: Application, H: Host> {
	this: Weak<Self>,
	host: H,
	root: H::Node,
	state: RefCell<State<A, H>>,
	queue: RefCell<VecDeque<A::Message>>,
	pending: RefCell<VecDeque<Pending<H>>>,
	processing: Cell<bool>,
	immediate: Cell<bool>,
	render_frame: Cell<Option<H::Frame>>,
	before_paint: RefCell<Vec<Task<A::Message>>>,
	after_paint: RefCell<Vec<Task<A::Message>>>,
	mounted: Cell<bool>,
}

/// Mounts `app` into `root`, adopting any markup already there as the previous render.
///
/// # Errors
///
/// [`MountError::AlreadyMounted`] if another application runs in `root`.
#[instrument(skip_all)]
pub fn mount<A: Application, H: Host>(app: A, host: H, root: H::Node, options: MountOptions) -> Result<RuntimeHandle<A, H>, MountError> {
	if !host.claim_root(&root) {
		return Err(MountError::AlreadyMounted);
	}

	let shared = Rc::new_cyclic(|this: &Weak<Shared<A, H>>| {
		let dispatch: DispatchFn = {
			let this = this.clone();
			Rc::new(move |dispatch: EventDispatch| {
				if let Some(shared) = this.upgrade() {
					shared.deliver(dispatch);
				}
			})
		};
		let mut reconciler = Reconciler::new(host.clone(), root.clone(), dispatch);
		reconciler.set_offset(options.offset);
		let vdom = virtualise(&mut reconciler, &options.key_attribute);
		Shared {
			this: this.clone(),
			host: host.clone(),
			root: root.clone(),
			state: RefCell::new(State {
				app,
				vdom,
				events: EventRegistry::new(),
				reconciler,
			}),
			queue: RefCell::default(),
			pending: RefCell::default(),
			processing: Cell::new(false),
			immediate: Cell::new(false),
			render_frame: Cell::new(None),
			before_paint: RefCell::default(),
			after_paint: RefCell::default(),
			mounted: Cell::new(true),
		}
	});

	let sink = Rc::downgrade(&shared);
	host.listen(Rc::new(move |node: &H::Node, event: &H::Event| {
		if let Some(shared) = sink.upgrade() {
			shared.handle_event(node, event);
		}
	}));

	shared.processing.set(true);
	let effect = shared.state.borrow_mut().app.init();
	shared.run_effect(effect);
	shared.processing.set(false);
	shared.tick(true);

	info!("Mounted.");
	Ok(RuntimeHandle { shared })
}

impl<A: Application, H: Host> Shared<A, H> {
	fn dispatch(&self, message: A::Message, immediate: bool) {
		if !self.mounted.get() {
			warn!("Ignoring a message dispatched after unmount.");
			return;
		}
		self.queue.borrow_mut().push_back(message);
		self.tick(immediate);
	}

	/// Drains the message queue into the model, then renders now or schedules a render.
	fn tick(&self, immediate: bool) {
		if immediate {
			self.immediate.set(true);
		}
		if self.processing.get() {
			trace!("Queued behind the message being processed.");
			return;
		}

		self.processing.set(true);
		let mut processed = 0_usize;
		loop {
			let next = self.queue.borrow_mut().pop_front();
			let message = match next {
				Some(message) => message,
				None => break,
			};
			let effect = self.state.borrow_mut().app.update(message);
			self.run_effect(effect);
			processed += 1;
		}
		self.processing.set(false);
		debug!(processed, "Drained message queue.");

		if self.immediate.replace(false) {
			if let Some(frame) = self.render_frame.take() {
				self.host.cancel_animation_frame(frame);
			}
			self.render();
		} else if self.render_frame.get().is_none() {
			let this = self.this.clone();
			let frame = self.host.request_animation_frame(Box::new(move || {
				if let Some(shared) = this.upgrade() {
					shared.render_frame.set(None);
					if shared.mounted.get() {
						shared.render();
					}
				}
			}));
			self.render_frame.set(Some(frame));
		}
	}

	fn run_effect(&self, effect: Effect<A::Message>) {
		let Effect { synchronous, before_paint, after_paint } = effect;
		self.before_paint.borrow_mut().extend(before_paint);
		self.after_paint.borrow_mut().extend(after_paint);
		self.run_tasks(synchronous);
	}

	fn run_tasks(&self, tasks: Vec<Task<A::Message>>) {
		if tasks.is_empty() {
			return;
		}
		let dispatch = |message: A::Message, immediate: bool| self.dispatch(message, immediate);
		let emit = |name: &str, data: Value| self.host.emit(&self.root, name, data);
		let actions = Actions::new(&dispatch, &emit, &self.root);
		for task in tasks {
			task(&actions);
		}
	}

	/// Runs paint tasks as one batch, then forces a synchronous render.
	fn run_paint_tasks(&self, tasks: Vec<Task<A::Message>>) {
		if !self.mounted.get() {
			return;
		}
		let was_processing = self.processing.replace(true);
		self.run_tasks(tasks);
		self.processing.set(was_processing);
		if was_processing {
			self.immediate.set(true);
		} else {
			self.tick(true);
		}
	}

	#[instrument(skip_all)]
	fn render(&self) {
		if self.processing.get() {
			self.immediate.set(true);
			return;
		}

		self.processing.set(true);
		{
			let mut state = self.state.borrow_mut();
			let State { app, vdom, events, reconciler } = &mut *state;
			let next = app.view();
			let patch = diff(events, vdom, &next);
			reconciler.push(patch);
			*vdom = next;
			info!(handlers = events.len(), tracked_nodes = reconciler.tracked_nodes(), "Rendered.");
		}
		self.processing.set(false);

		let before_paint = mem::take(&mut *self.before_paint.borrow_mut());
		if !before_paint.is_empty() {
			let this = self.this.clone();
			self.host.queue_microtask(Box::new(move || {
				if let Some(shared) = this.upgrade() {
					shared.run_paint_tasks(before_paint);
				}
			}));
		}
		let after_paint = mem::take(&mut *self.after_paint.borrow_mut());
		if !after_paint.is_empty() {
			let this = self.this.clone();
			self.host.request_animation_frame(Box::new(move || {
				if let Some(shared) = this.upgrade() {
					shared.run_paint_tasks(after_paint);
				}
			}));
		}

		self.flush_pending();
		if !self.queue.borrow().is_empty() {
			self.tick(false);
		}
	}

	fn flush_pending(&self) {
		loop {
			let next = self.pending.borrow_mut().pop_front();
			match next {
				None => break,
				Some(Pending::Event(node, event)) => self.handle_event(&node, &event),
				Some(Pending::Dispatch(dispatch)) => self.deliver(dispatch),
			}
		}
	}

	fn handle_event(&self, node: &H::Node, event: &H::Event) {
		if !self.mounted.get() {
			warn!("Ignoring an event delivered after unmount.");
			return;
		}
		let dispatch = match self.state.try_borrow_mut() {
			Ok(mut state) => state.reconciler.handle_event(node, event),
			Err(_) => {
				trace!("Deferring an event that arrived during a render.");
				self.pending.borrow_mut().push_back(Pending::Event(node.clone(), event.clone()));
				return;
			}
		};
		if let Some(dispatch) = dispatch {
			self.deliver(dispatch);
		}
	}

	fn deliver(&self, dispatch: EventDispatch) {
		if !self.mounted.get() {
			warn!("Ignoring an event delivered after unmount.");
			return;
		}
		let resolved = match self.state.try_borrow_mut() {
			Ok(mut state) => {
				let resolved = state.events.resolve(&dispatch.path, &dispatch.name, &dispatch.payload);
				if !matches!(resolved, Err(ResolveError::NoHandler { .. })) {
					state.events.mark_dispatched(&dispatch.path);
				}
				resolved
			}
			Err(_) => {
				trace!("Deferring a dispatch that arrived during a render.");
				self.pending.borrow_mut().push_back(Pending::Dispatch(dispatch));
				return;
			}
		};
		match resolved {
			Ok(message) => self.dispatch(message, dispatch.immediate),
			Err(error) => debug!(%error, "Dropped event."),
		}
	}

	fn shutdown(&self) {
		if !self.mounted.replace(false) {
			return;
		}
		if let Some(frame) = self.render_frame.take() {
			self.host.cancel_animation_frame(frame);
		}
		self.queue.borrow_mut().clear();
		self.pending.borrow_mut().clear();
		self.before_paint.borrow_mut().clear();
		self.after_paint.borrow_mut().clear();
		match self.state.try_borrow_mut() {
			Ok(mut state) => state.reconciler.teardown(),
			Err(_) => warn!("Unmounting during a render. Timers may outlive the application."),
		}
		self.host.listen(Rc::new(|_: &H::Node, _: &H::Event| ()));
		self.host.release_root(&self.root);
		info!("Unmounted.");
	}
}

/// Controls a mounted application. Dropping it unmounts the application, see [`RuntimeHandle::leak`].
pub struct RuntimeHandle<A: Application, H: Host> {
	shared: Rc<Shared<A, H>>,
}

impl<A: Application, H: Host> Debug for RuntimeHandle<A, H> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuntimeHandle")
			.field("root", &self.shared.root)
			.field("mounted", &self.shared.mounted.get())
			.finish_non_exhaustive()
	}
}

impl<A: Application, H: Host> RuntimeHandle<A, H> {
	/// Feeds `message` to [`Application::update`].
	///
	/// With `immediate`, the view is rendered synchronously before this returns, unless called re-entrantly.
	#[instrument(skip(self, message))]
	pub fn dispatch(&self, message: A::Message, immediate: bool) {
		self.shared.dispatch(message, immediate);
	}

	/// Fires a custom event named `name` on the mount root.
	pub fn emit(&self, name: &str, data: Value) {
		self.shared.host.emit(&self.shared.root, name, data);
	}

	/// Changes how many leading children of the root are left alone by later renders.
	pub fn set_offset(&self, offset: usize) {
		self.shared.state.borrow_mut().reconciler.set_offset(offset);
	}

	/// Reads the application state.
	pub fn inspect<R>(&self, f: impl FnOnce(&A) -> R) -> R {
		f(&self.shared.state.borrow().app)
	}

	#[must_use]
	pub fn root(&self) -> &H::Node {
		&self.shared.root
	}

	#[must_use]
	pub fn host(&self) -> &H {
		&self.shared.host
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.shared.mounted.get()
	}

	/// Stops the application: cancels pending renders and timers and releases the root.
	///
	/// The live tree is left as it was last rendered.
	pub fn unmount(self) {
		self.shared.shutdown();
	}

	/// Keeps the application running for the rest of the program.
	pub fn leak(self) {
		mem::forget(self);
	}
}

impl<A: Application, H: Host> Drop for RuntimeHandle<A, H> {
	fn drop(&mut self) {
		self.shared.shutdown();
	}
}
