//! Handles to remote values.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use pwq_protocol::{RemoteObjectId, RemoteType, RemoteValue, SerializedArgument};
use pwq_runtime::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::element_handle::ElementHandle;
use crate::js;
use crate::world::{EvalArg, World};

/// Reference to a value living in a [`World`].
///
/// A handle owns its remote reference. It is not `Clone`: pass it by move or
/// call [`dispose`](Self::dispose) when done. Dropping a live handle releases
/// the reference in the background on the current tokio runtime.
///
/// Inline primitives carry no reference; disposing them only flips the flag.
pub struct JsHandle {
	world: World,
	remote: RemoteValue,
	released: AtomicBool,
}

impl JsHandle {
	pub(crate) fn new(world: World, remote: RemoteValue) -> Self {
		Self {
			world,
			remote,
			released: AtomicBool::new(false),
		}
	}

	/// The world owning this handle.
	pub fn world(&self) -> &World {
		&self.world
	}

	/// The remote value as returned by the collaborator.
	pub fn remote_object(&self) -> &RemoteValue {
		&self.remote
	}

	/// Remote reference, `None` for inline primitives.
	pub fn id(&self) -> Option<&RemoteObjectId> {
		self.remote.object_id()
	}

	/// Returns true once the handle was disposed or handed over.
	pub fn disposed(&self) -> bool {
		self.released.load(Ordering::Acquire)
	}

	/// Returns true for inline primitives.
	pub fn is_primitive(&self) -> bool {
		self.remote.handle.is_none()
	}

	/// Releases the remote reference.
	///
	/// Calling it again is a no-op; the reference is released at most once.
	pub async fn dispose(&self) -> Result<()> {
		if self.released.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		match self.remote.object_id() {
			Some(object) => self.world.release_object(object).await,
			None => Ok(()),
		}
	}

	/// Evaluates `function` with this handle as the first argument.
	pub async fn evaluate<T: DeserializeOwned>(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<T> {
		self.world.evaluate(function, self.prepend(args)).await
	}

	/// Like [`evaluate`](Self::evaluate) but returns the result as a handle.
	pub async fn evaluate_handle(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<JsHandle> {
		self.world.evaluate_handle(function, self.prepend(args)).await
	}

	fn prepend<'a>(&'a self, args: Vec<EvalArg<'a>>) -> Vec<EvalArg<'a>> {
		let mut all = Vec::with_capacity(args.len() + 1);
		all.push(EvalArg::Handle(self));
		all.extend(args);
		all
	}

	/// Fetches a single property as a new handle.
	pub async fn get_property(&self, name: &str) -> Result<JsHandle> {
		self.evaluate_handle(js::GET_PROPERTY, vec![EvalArg::Value(json!(name))]).await
	}

	/// Fetches all enumerable own properties, keyed by name.
	pub async fn get_properties(&self) -> Result<IndexMap<String, JsHandle>> {
		let names: Vec<String> = self.evaluate(js::OWN_PROPERTY_NAMES, Vec::new()).await?;
		let mut properties = IndexMap::with_capacity(names.len());
		for name in names {
			let property = self.get_property(&name).await?;
			properties.insert(name, property);
		}
		Ok(properties)
	}

	/// Returns the JSON value of the remote object.
	///
	/// # Errors
	///
	/// Returns [`Error::Serialization`] when the value is `undefined` or not
	/// JSON-serializable, and [`Error::InvalidArgument`] on a disposed handle.
	pub async fn json_value<T: DeserializeOwned>(&self) -> Result<T> {
		self.ensure_live()?;
		if self.remote.kind == RemoteType::Undefined {
			return Err(undefined_value());
		}
		let json = match self.remote.inline_json()? {
			Some(json) => json,
			None => {
				let remote = self.world.call(js::IDENTITY, vec![EvalArg::Handle(self)], true).await?;
				if remote.kind == RemoteType::Undefined {
					return Err(undefined_value());
				}
				remote.inline_json()?.ok_or_else(undefined_value)?
			}
		};
		serde_json::from_value(json).map_err(|err| Error::Serialization(err.to_string()))
	}

	/// Converts into an [`ElementHandle`] if this handle refers to a node.
	///
	/// Gives the handle back otherwise.
	pub fn into_element(self) -> std::result::Result<ElementHandle, JsHandle> {
		if !self.remote.is_node() || self.disposed() {
			return Err(self);
		}
		match self.world.frame() {
			Ok(frame) => Ok(ElementHandle::new(self, frame)),
			Err(_) => Err(self),
		}
	}

	/// Serializes this handle as an argument for a call in `world`.
	pub(crate) fn to_argument(&self, world: &World) -> Result<SerializedArgument> {
		if &self.world != world {
			return Err(Error::InvalidArgument(
				"JSHandles can be evaluated only in the context they were created".into(),
			));
		}
		self.ensure_live()?;
		Ok(self.serialized())
	}

	/// Hands the reference over to the collaborator without releasing it.
	pub(crate) fn into_argument(self, world: &World) -> Result<SerializedArgument> {
		let argument = self.to_argument(world)?;
		self.released.store(true, Ordering::Release);
		Ok(argument)
	}

	pub(crate) fn live_node_id(&self) -> Result<&RemoteObjectId> {
		self.ensure_live()?;
		match self.remote.object_id() {
			Some(object) if self.remote.is_node() => Ok(object),
			_ => Err(Error::InvalidArgument(format!(
				"Cannot adopt a {} handle; only nodes move between worlds",
				self.remote.kind.as_str()
			))),
		}
	}

	fn serialized(&self) -> SerializedArgument {
		match (&self.remote.handle, &self.remote.value) {
			(Some(object), _) => SerializedArgument::Handle(object.clone()),
			(None, Some(value)) => SerializedArgument::Value(value.clone()),
			(None, None) => SerializedArgument::undefined(),
		}
	}

	fn ensure_live(&self) -> Result<()> {
		if self.disposed() {
			return Err(Error::InvalidArgument("JSHandle is disposed".into()));
		}
		Ok(())
	}
}

fn undefined_value() -> Error {
	Error::Serialization("Could not serialize referenced object".into())
}

impl Drop for JsHandle {
	fn drop(&mut self) {
		if self.released.swap(true, Ordering::AcqRel) || self.world.is_destroyed() {
			return;
		}
		let Some(object) = self.remote.handle.take() else {
			return;
		};
		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				let world = self.world.clone();
				runtime.spawn(async move {
					if let Err(err) = world.release_object(&object).await {
						tracing::debug!(world = %world.id(), %object, error = %err, "Release on drop failed");
					}
				});
			}
			Err(_) => {
				tracing::debug!(world = %self.world.id(), %object, "Dropped live handle outside a runtime");
			}
		}
	}
}

impl fmt::Display for JsHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.remote.handle.is_some() {
			return write!(f, "JSHandle@{}", self.remote.kind.as_str());
		}
		match self.remote.inline_json() {
			Ok(Some(Value::String(s))) if self.remote.kind == RemoteType::String => write!(f, "JSHandle:{s}"),
			_ if self.remote.kind == RemoteType::Undefined => f.write_str("JSHandle:undefined"),
			Ok(Some(value)) => write!(f, "JSHandle:{value}"),
			_ => write!(f, "JSHandle@{}", self.remote.kind.as_str()),
		}
	}
}

impl fmt::Debug for JsHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JsHandle")
			.field("world", self.world.id())
			.field("remote", &self.remote)
			.field("disposed", &self.disposed())
			.finish()
	}
}
