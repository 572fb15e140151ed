//! Frames and their pair of worlds.
//!
//! The session tracking navigation drives a [`Frame`] through its lifecycle
//! hooks; the query layer only reads the current worlds.

use std::fmt;
use std::sync::Arc;

use futures_util::TryStreamExt;
use parking_lot::Mutex;
use pwq_protocol::{WaitForSelectorOptions, WorldId, WorldKind};
use pwq_runtime::{Error, Result};
use serde::de::DeserializeOwned;
use tokio::sync::Notify;

use crate::element_handle::ElementHandle;
use crate::handle::JsHandle;
use crate::page::Page;
use crate::query_handler::get_query_handler_and_selector;
use crate::settings::QuerySettings;
use crate::wait_task::WaitTarget;
use crate::world::{Bindings, EvalArg, World};

/// A frame of a [`Page`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Frame {
	inner: Arc<FrameInner>,
}

pub(crate) struct FrameInner {
	id: String,
	page: Page,
	worlds: Mutex<Worlds>,
	changed: Notify,
}

#[derive(Default)]
struct Worlds {
	main: Option<World>,
	isolated: Option<World>,
	detached: bool,
}

impl Worlds {
	fn slot(&mut self, kind: WorldKind) -> &mut Option<World> {
		match kind {
			WorldKind::Main => &mut self.main,
			WorldKind::Isolated => &mut self.isolated,
		}
	}

	fn clear(&mut self) {
		for world in self.main.take().into_iter().chain(self.isolated.take()) {
			world.mark_destroyed();
		}
	}
}

impl Frame {
	pub(crate) fn attach(id: String, page: Page) -> Self {
		Self {
			inner: Arc::new(FrameInner {
				id,
				page,
				worlds: Mutex::new(Worlds::default()),
				changed: Notify::new(),
			}),
		}
	}

	pub(crate) fn from_inner(inner: Arc<FrameInner>) -> Self {
		Self { inner }
	}

	/// Frame identifier.
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// The page owning this frame.
	pub fn page(&self) -> &Page {
		&self.inner.page
	}

	/// Settings of the owning page.
	pub fn settings(&self) -> &QuerySettings {
		self.inner.page.settings()
	}

	/// Returns true once the frame was detached.
	pub fn is_detached(&self) -> bool {
		self.inner.worlds.lock().detached
	}

	/// Hook: a new execution context of `kind` appeared.
	///
	/// Replaces (and destroys) the previous world of that kind.
	pub fn on_context_created(&self, kind: WorldKind, id: WorldId) -> World {
		let world = World::new(
			id,
			kind,
			self.inner.page.connection().clone(),
			Arc::downgrade(&self.inner),
		);
		{
			let mut worlds = self.inner.worlds.lock();
			if let Some(previous) = worlds.slot(kind).replace(world.clone()) {
				previous.mark_destroyed();
			}
		}
		tracing::debug!(frame = %self.inner.id, world = %world.id(), %kind, "Execution context created");
		self.inner.changed.notify_waiters();
		world
	}

	/// Hook: the execution context `id` went away.
	pub fn on_context_destroyed(&self, id: &WorldId) {
		let mut worlds = self.inner.worlds.lock();
		for kind in [WorldKind::Main, WorldKind::Isolated] {
			let slot = worlds.slot(kind);
			if slot.as_ref().is_some_and(|world| world.id() == id) {
				if let Some(world) = slot.take() {
					world.mark_destroyed();
				}
			}
		}
	}

	/// Hook: the frame navigated; both worlds are gone until recreated.
	pub fn on_navigated(&self) {
		self.inner.worlds.lock().clear();
		tracing::debug!(frame = %self.inner.id, "Frame navigated");
	}

	/// Hook: the frame was detached; every pending world lookup fails.
	pub fn on_detached(&self) {
		{
			let mut worlds = self.inner.worlds.lock();
			worlds.clear();
			worlds.detached = true;
		}
		tracing::debug!(frame = %self.inner.id, "Frame detached");
		self.inner.changed.notify_waiters();
	}

	/// The live world of `kind`, if there is one right now.
	///
	/// # Errors
	///
	/// Returns [`Error::TargetClosed`] if the frame was detached.
	pub fn current_world(&self, kind: WorldKind) -> Result<Option<World>> {
		let mut worlds = self.inner.worlds.lock();
		if worlds.detached {
			return Err(self.closed());
		}
		Ok(worlds.slot(kind).clone().filter(|world| !world.is_destroyed()))
	}

	/// Waits for the world of `kind` to exist.
	///
	/// Bounded by the page's default timeout.
	pub async fn world(&self, kind: WorldKind) -> Result<World> {
		match self.settings().default_timeout {
			Some(timeout) => tokio::time::timeout(timeout, self.next_world(kind))
				.await
				.map_err(|_| {
					Error::Timeout(format!(
						"Waiting for {kind} world of frame {} failed: {}ms exceeded",
						self.inner.id,
						timeout.as_millis()
					))
				})?,
			None => self.next_world(kind).await,
		}
	}

	/// Waits without a deadline; the caller bounds it.
	pub(crate) async fn next_world(&self, kind: WorldKind) -> Result<World> {
		loop {
			// Register before checking so a world created in between is not missed.
			let notified = self.inner.changed.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(world) = self.current_world(kind)? {
				return Ok(world);
			}
			notified.await;
		}
	}

	/// [`Frame::world`] for the main world.
	pub async fn main_world(&self) -> Result<World> {
		self.world(WorldKind::Main).await
	}

	/// [`Frame::world`] for the isolated world.
	pub async fn isolated_world(&self) -> Result<World> {
		self.world(WorldKind::Isolated).await
	}

	/// Evaluates `function` in the main world.
	pub async fn evaluate<T: DeserializeOwned>(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<T> {
		self.main_world().await?.evaluate(function, args).await
	}

	/// Evaluates `function` in the main world, returning a handle.
	pub async fn evaluate_handle(&self, function: &str, args: Vec<EvalArg<'_>>) -> Result<JsHandle> {
		self.main_world().await?.evaluate_handle(function, args).await
	}

	/// First element of the document matching `selector`.
	pub async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
		let document = self.main_world().await?.document().await?;
		let found = document.query_selector(selector).await;
		release(document).await;
		found
	}

	/// Every element of the document matching `selector`, in document order.
	pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
		let document = self.main_world().await?.document().await?;
		let found = document.query_selector_all(selector).try_collect::<Vec<_>>().await;
		release(document).await;
		found
	}

	/// Waits for an element matching `selector` to appear in the document.
	///
	/// Survives navigation unless disabled through the options or settings.
	pub async fn wait_for_selector(
		&self,
		selector: &str,
		options: WaitForSelectorOptions,
	) -> Result<Option<ElementHandle>> {
		let (handler, selector) = get_query_handler_and_selector(selector)?;
		handler
			.wait_for(WaitTarget::Frame(self), &selector, options, Bindings::new())
			.await
	}

	pub(crate) fn closed(&self) -> Error {
		Error::TargetClosed {
			target_type: "frame".into(),
			context: format!("Frame {} was detached", self.inner.id),
		}
	}
}

async fn release(document: ElementHandle) {
	if let Err(err) = document.dispose().await {
		tracing::debug!(error = %err, "Failed to release document handle");
	}
}

impl PartialEq for Frame {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl fmt::Debug for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Frame")
			.field("id", &self.inner.id)
			.field("detached", &self.is_detached())
			.finish()
	}
}
