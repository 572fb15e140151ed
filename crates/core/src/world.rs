//! Execution worlds.
//!
//! A [`World`] is one JavaScript realm of a frame. Every frame carries a main
//! world shared with page scripts and an isolated world owned by automation.
//! Worlds are replaced wholesale on navigation: a destroyed world never comes
//! back, the frame installs a fresh one instead.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pwq_protocol::{BackendNodeId, RemoteObjectId, RemoteValue, SerializedArgument, WorldId, WorldKind};
use pwq_runtime::{BoxFuture, Error, RawBindingFn, RealmConnection, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::element_handle::ElementHandle;
use crate::frame::{Frame, FrameInner};
use crate::handle::JsHandle;
use crate::js;
use crate::lazy_arg::LazyArg;

/// Host callback behind a global binding.
///
/// Receives the world the binding fired in and the call arguments as handles
/// owned by the callback.
pub type BindingFn = Arc<dyn Fn(World, Vec<JsHandle>) -> BoxFuture<'static, Result<BindingResult>> + Send + Sync>;

/// Bindings keyed by global name, registered in insertion order.
pub type Bindings = indexmap::IndexMap<String, BindingFn>;

/// Wraps an async closure as a [`BindingFn`].
pub fn binding_fn<F, Fut>(callback: F) -> BindingFn
where
	F: Fn(World, Vec<JsHandle>) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<BindingResult>> + Send + 'static,
{
	Arc::new(
		move |world: World, args: Vec<JsHandle>| -> BoxFuture<'static, Result<BindingResult>> {
			Box::pin(callback(world, args))
		},
	)
}

/// Value handed back to remote code by a binding.
#[derive(Debug)]
pub enum BindingResult {
	/// Plain JSON.
	Value(Value),
	/// A handle in the calling world; ownership passes to the remote side.
	Handle(JsHandle),
}

/// One argument of a remote call.
#[derive(Debug)]
pub enum EvalArg<'a> {
	/// Plain JSON, sent inline.
	Value(Value),
	/// A handle owned by the target world.
	Handle(&'a JsHandle),
	/// Resolved against the target world right before the call.
	Lazy(LazyArg),
}

impl From<Value> for EvalArg<'_> {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

impl<'a> From<&'a JsHandle> for EvalArg<'a> {
	fn from(handle: &'a JsHandle) -> Self {
		Self::Handle(handle)
	}
}

impl<'a> From<&'a ElementHandle> for EvalArg<'a> {
	fn from(element: &'a ElementHandle) -> Self {
		Self::Handle(element)
	}
}

impl From<LazyArg> for EvalArg<'_> {
	fn from(lazy: LazyArg) -> Self {
		Self::Lazy(lazy)
	}
}

/// A JavaScript realm of a frame.
///
/// Cheap to clone; clones share state. Two `World` values are equal when they
/// are the same realm instance.
#[derive(Clone)]
pub struct World {
	inner: Arc<WorldInner>,
}

struct WorldInner {
	id: WorldId,
	kind: WorldKind,
	connection: Arc<dyn RealmConnection>,
	frame: Weak<FrameInner>,
	bindings: Mutex<HashSet<String>>,
	exposed_engines: Mutex<HashSet<u64>>,
	prepared: Mutex<HashSet<&'static str>>,
	utility: OnceCell<RemoteObjectId>,
	destroyed: AtomicBool,
}

impl World {
	pub(crate) fn new(
		id: WorldId,
		kind: WorldKind,
		connection: Arc<dyn RealmConnection>,
		frame: Weak<FrameInner>,
	) -> Self {
		Self {
			inner: Arc::new(WorldInner {
				id,
				kind,
				connection,
				frame,
				bindings: Mutex::new(HashSet::new()),
				exposed_engines: Mutex::new(HashSet::new()),
				prepared: Mutex::new(HashSet::new()),
				utility: OnceCell::new(),
				destroyed: AtomicBool::new(false),
			}),
		}
	}

	/// Collaborator-assigned identifier.
	pub fn id(&self) -> &WorldId {
		&self.inner.id
	}

	/// Main or isolated.
	pub fn kind(&self) -> WorldKind {
		self.inner.kind
	}

	/// Returns true once navigation or detach tore this world down.
	pub fn is_destroyed(&self) -> bool {
		self.inner.destroyed.load(Ordering::Acquire)
	}

	/// The frame this world belongs to.
	///
	/// # Errors
	///
	/// Returns [`Error::TargetClosed`] once the frame has been dropped.
	pub fn frame(&self) -> Result<Frame> {
		self.inner
			.frame
			.upgrade()
			.map(Frame::from_inner)
			.ok_or_else(|| Error::TargetClosed {
				target_type: "frame".into(),
				context: format!("World {} outlived its frame", self.inner.id),
			})
	}

	pub(crate) fn connection(&self) -> &Arc<dyn RealmConnection> {
		&self.inner.connection
	}

	pub(crate) fn mark_destroyed(&self) {
		if !self.inner.destroyed.swap(true, Ordering::AcqRel) {
			tracing::debug!(world = %self.inner.id, kind = %self.inner.kind, "World destroyed");
		}
	}

	/// Evaluates `function` with `args` and deserializes the result.
	///
	/// # Errors
	///
	/// Returns [`Error::StaleWorld`] if the world was destroyed,
	/// [`Error::InvalidArgument`] for handles that cannot be passed here, and
	/// [`Error::Serialization`] if the result has no JSON form.
	pub async fn evaluate<T: DeserializeOwned>(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<T> {
		let remote = self.call(function, args, true).await?;
		let json = match remote.inline_json()? {
			Some(json) => json,
			None => {
				return Err(Error::Serialization(format!(
					"Evaluation returned a {} reference instead of a value",
					remote.kind.as_str()
				)));
			}
		};
		Ok(serde_json::from_value(json)?)
	}

	/// Evaluates `function` with `args` and returns the result as a handle.
	///
	/// # Errors
	///
	/// See [`World::evaluate`].
	pub async fn evaluate_handle(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<JsHandle> {
		let remote = self.call(function, args, false).await?;
		Ok(JsHandle::new(self.clone(), remote))
	}

	pub(crate) async fn call(&self, function: &str, args: Vec<EvalArg<'_>>, by_value: bool) -> Result<RemoteValue> {
		self.ensure_alive()?;

		let mut serialized = Vec::with_capacity(args.len());
		for arg in args {
			serialized.push(self.serialize_arg(arg).await?);
		}

		self.inner
			.connection
			.evaluate(&self.inner.id, function, serialized, by_value)
			.await
			.map_err(|err| self.classify(err))
	}

	async fn serialize_arg(&self, arg: EvalArg<'_>) -> Result<SerializedArgument> {
		match arg {
			EvalArg::Value(value) => Ok(SerializedArgument::json(&value)),
			EvalArg::Handle(handle) => handle.to_argument(self),
			EvalArg::Lazy(lazy) => lazy.resolve(self).await,
		}
	}

	/// Installs `name` as a global function calling back into `callback`.
	///
	/// Registering an already registered name is a no-op for the lifetime of
	/// this world.
	pub async fn create_global_binding(&self, name: &str, callback: BindingFn) -> Result<()> {
		self.ensure_alive()?;
		if !self.inner.bindings.lock().insert(name.to_owned()) {
			return Ok(());
		}

		let weak = Arc::downgrade(&self.inner);
		let world_id = self.inner.id.clone();
		let raw: RawBindingFn = Arc::new(move |args: Vec<RemoteValue>| -> BoxFuture<'static, Result<SerializedArgument>> {
			let weak = weak.clone();
			let world_id = world_id.clone();
			let callback = callback.clone();
			Box::pin(async move {
				let world = weak.upgrade().map(|inner| World { inner }).ok_or_else(|| Error::StaleWorld {
					world: world_id.to_string(),
				})?;
				let handles = args.into_iter().map(|remote| JsHandle::new(world.clone(), remote)).collect();
				match callback(world.clone(), handles).await? {
					BindingResult::Value(value) => Ok(SerializedArgument::json(&value)),
					BindingResult::Handle(handle) => handle.into_argument(&world),
				}
			})
		});

		if let Err(err) = self.inner.connection.create_binding(&self.inner.id, name, raw).await {
			self.inner.bindings.lock().remove(name);
			return Err(self.classify(err));
		}
		tracing::debug!(world = %self.inner.id, name, "Registered binding");
		Ok(())
	}

	/// Returns true if `name` was registered in this world.
	pub fn has_binding(&self, name: &str) -> bool {
		self.inner.bindings.lock().contains(name)
	}

	/// Reference to the utility library, injected on first use.
	///
	/// Concurrent callers share a single injection.
	pub async fn utility(&self) -> Result<RemoteObjectId> {
		let id = self
			.inner
			.utility
			.get_or_try_init(|| async {
				let remote = self.call(js::UTILITY_SOURCE, Vec::new(), false).await?;
				tracing::debug!(world = %self.inner.id, "Injected utility library");
				remote
					.handle
					.ok_or_else(|| Error::ProtocolError("utility library evaluated to a primitive".into()))
			})
			.await?;
		Ok(id.clone())
	}

	pub(crate) async fn utility_argument(&self) -> Result<SerializedArgument> {
		self.utility().await.map(SerializedArgument::Handle)
	}

	/// The `document` of this world.
	pub async fn document(&self) -> Result<ElementHandle> {
		let handle = self.evaluate_handle(js::DOCUMENT, Vec::new()).await?;
		handle
			.into_element()
			.map_err(|_| Error::ProtocolError("document did not evaluate to a node".into()))
	}

	/// Re-resolves the node behind `handle` in this world.
	///
	/// The source handle stays valid and owned by the caller.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidArgument`] for disposed or non-node handles.
	pub async fn adopt_handle(&self, handle: &JsHandle) -> Result<JsHandle> {
		let source = handle.world();
		let object = handle.live_node_id()?;
		source.ensure_alive()?;

		let node = source
			.inner
			.connection
			.describe_node(&source.inner.id, object)
			.await
			.map_err(|err| source.classify(err))?;

		let adopted = self.resolve_node(node).await?;
		tracing::debug!(from = %source.inner.id, to = %self.inner.id, node = node.0, "Adopted node");
		Ok(adopted)
	}

	/// Resolves a backend node to a new handle owned by this world.
	pub(crate) async fn resolve_node(&self, node: BackendNodeId) -> Result<JsHandle> {
		self.ensure_alive()?;
		let remote = self
			.inner
			.connection
			.resolve_node(&self.inner.id, node)
			.await
			.map_err(|err| self.classify(err))?;
		Ok(JsHandle::new(self.clone(), remote))
	}

	/// Moves `handle` into this world, disposing the source.
	///
	/// A handle already owned by this world is returned unchanged.
	pub async fn transfer_handle(&self, handle: JsHandle) -> Result<JsHandle> {
		if handle.world() == self {
			return Ok(handle);
		}
		let adopted = self.adopt_handle(&handle).await?;
		handle.dispose().await?;
		Ok(adopted)
	}

	/// [`World::adopt_handle`] for elements.
	pub async fn adopt_element(&self, element: &ElementHandle) -> Result<ElementHandle> {
		let adopted = self.adopt_handle(element).await?;
		adopted
			.into_element()
			.map_err(|_| Error::ProtocolError("adopted node did not resolve to a node".into()))
	}

	/// [`World::transfer_handle`] for elements.
	pub async fn transfer_element(&self, element: ElementHandle) -> Result<ElementHandle> {
		let transferred = self.transfer_handle(element.into_handle()).await?;
		transferred
			.into_element()
			.map_err(|_| Error::ProtocolError("transferred node did not resolve to a node".into()))
	}

	/// Releases a remote reference owned by this world.
	///
	/// Releasing into a destroyed world is a no-op.
	pub(crate) async fn release_object(&self, object: &RemoteObjectId) -> Result<()> {
		if self.is_destroyed() {
			tracing::debug!(world = %self.inner.id, %object, "Skipping release in destroyed world");
			return Ok(());
		}
		match self.inner.connection.release_object(&self.inner.id, object).await {
			Ok(()) => Ok(()),
			Err(err) if err.is_stale_world() => {
				tracing::debug!(world = %self.inner.id, %object, error = %err, "Release hit a stale world");
				self.mark_destroyed();
				Ok(())
			}
			Err(err) => Err(err),
		}
	}

	pub(crate) fn is_prepared(&self, key: &'static str) -> bool {
		self.inner.prepared.lock().contains(key)
	}

	pub(crate) fn mark_prepared(&self, key: &'static str) {
		self.inner.prepared.lock().insert(key);
	}

	/// Records an exposed custom engine registration. Returns false if it already was.
	pub(crate) fn expose_engine(&self, registration: u64) -> bool {
		self.inner.exposed_engines.lock().insert(registration)
	}

	pub(crate) fn forget_engine(&self, registration: u64) {
		self.inner.exposed_engines.lock().remove(&registration);
	}

	pub(crate) fn ensure_alive(&self) -> Result<()> {
		if self.is_destroyed() {
			return Err(self.stale());
		}
		Ok(())
	}

	fn stale(&self) -> Error {
		Error::StaleWorld {
			world: self.inner.id.to_string(),
		}
	}

	/// Maps collaborator stale-context failures onto [`Error::StaleWorld`].
	pub(crate) fn classify(&self, err: Error) -> Error {
		match err {
			Error::Remote { .. } if err.is_stale_world() => {
				self.mark_destroyed();
				self.stale()
			}
			other => other,
		}
	}
}

impl PartialEq for World {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for World {}

impl fmt::Debug for World {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("World")
			.field("id", &self.inner.id)
			.field("kind", &self.inner.kind)
			.field("destroyed", &self.is_destroyed())
			.finish()
	}
}
