//! Polling for selectors.
//!
//! A wait runs in the frame's isolated world so page scripts cannot interfere
//! with it:
//!
//! 1. Setup: register bindings, then adopt the element root (or fetch the
//!    document) into the isolated world.
//! 2. Poll: run the handler's `query_one` every polling interval until it
//!    matches, the frame detaches, or the deadline passes. When navigation
//!    destroys the world, a document-rooted wait sets up again in the next one.
//! 3. Completion: release the root and move the match into the main world.

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use pwq_protocol::{WaitForSelectorOptions, WorldKind};
use pwq_runtime::{Error, Result};
use tokio::time::Instant;

use crate::element_handle::ElementHandle;
use crate::frame::Frame;
use crate::js;
use crate::lazy_arg::LazyArg;
use crate::query_handler::QueryHandler;
use crate::world::{Bindings, EvalArg};

/// What a wait is rooted at.
#[derive(Debug, Clone, Copy)]
pub enum WaitTarget<'a> {
	/// The whole document of a frame; survives navigation.
	Frame(&'a Frame),
	/// The subtree of an element; fails once its document is gone.
	Element(&'a ElementHandle),
}

impl WaitTarget<'_> {
	/// The frame the wait runs in.
	pub fn frame(&self) -> &Frame {
		match self {
			Self::Frame(frame) => frame,
			Self::Element(element) => element.frame(),
		}
	}
}

pub(crate) async fn wait_for_selector<H: QueryHandler + ?Sized>(
	handler: Arc<H>,
	target: WaitTarget<'_>,
	selector: String,
	options: WaitForSelectorOptions,
	extra_bindings: Bindings,
) -> Result<Option<ElementHandle>> {
	if options.wants_visible() && options.wants_hidden() {
		return Err(Error::InvalidArgument(
			"`visible` and `hidden` cannot both be set".into(),
		));
	}

	let frame = target.frame().clone();
	let settings = frame.settings().clone();
	let timeout = match options.timeout {
		Some(ms) if ms <= 0.0 => None,
		Some(ms) => Some(Duration::from_millis(ms as u64)),
		None => settings.default_timeout,
	};
	let polling = options
		.polling
		.map(|ms| Duration::from_millis(ms.max(0.0) as u64))
		.unwrap_or(settings.polling_interval);

	let mut bindings = handler.bindings();
	bindings.extend(extra_bindings);

	let task = WaitTask {
		handler,
		target,
		frame,
		selector,
		visible: options.wants_visible(),
		hidden: options.wants_hidden(),
		polling,
		resume: options.resume_on_navigation.unwrap_or(settings.resume_on_navigation),
		bindings,
		timeout,
		root: None,
	};
	task.run().await
}

struct WaitTask<'a, H: ?Sized> {
	handler: Arc<H>,
	target: WaitTarget<'a>,
	frame: Frame,
	selector: String,
	visible: bool,
	hidden: bool,
	polling: Duration,
	resume: bool,
	bindings: Bindings,
	timeout: Option<Duration>,
	root: Option<ElementHandle>,
}

impl<H: QueryHandler + ?Sized> WaitTask<'_, H> {
	async fn run(mut self) -> Result<Option<ElementHandle>> {
		let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
		let outcome = self.poll_until(deadline).await;
		self.release_root().await;

		match outcome? {
			Some(found) => {
				let main = self.frame.main_world().await?;
				main.transfer_element(found).await.map(Some)
			}
			None => Ok(None),
		}
	}

	async fn poll_until(&mut self, deadline: Option<Instant>) -> Result<Option<ElementHandle>> {
		loop {
			let attempt = match deadline {
				Some(deadline) => match tokio::time::timeout_at(deadline, self.poll_once()).await {
					Ok(attempt) => attempt,
					Err(_) => return Err(self.timeout_error()),
				},
				None => self.poll_once().await,
			};

			match attempt {
				Ok(Poll::Ready(found)) => return Ok(found),
				Ok(Poll::Pending) => {}
				Err(err) if err.is_stale_world() => {
					if self.frame.is_detached() {
						return Err(self.frame.closed());
					}
					if !self.resume || matches!(self.target, WaitTarget::Element(_)) {
						return Err(err);
					}
					tracing::debug!(frame = %self.frame.id(), selector = %self.selector, "World destroyed while polling, resuming");
					// The old world is gone, so its handles need no release.
					self.root = None;
					continue;
				}
				Err(err) => return Err(err),
			}

			let wake = Instant::now() + self.polling;
			match deadline {
				Some(deadline) if deadline <= wake => {
					tokio::time::sleep_until(deadline).await;
					return Err(self.timeout_error());
				}
				_ => tokio::time::sleep_until(wake).await,
			}
		}
	}

	/// One poll. `Ready(None)` only happens for `hidden` waits.
	async fn poll_once(&mut self) -> Result<Poll<Option<ElementHandle>>> {
		if self.root.is_none() {
			self.root = Some(self.setup().await?);
		}
		let Some(root) = self.root.as_ref() else {
			return Ok(Poll::Pending);
		};

		let found = self.handler.clone().query_one(root, &self.selector).await?;
		let Some(element) = found else {
			return Ok(if self.hidden { Poll::Ready(None) } else { Poll::Pending });
		};
		if !self.visible && !self.hidden {
			return Ok(Poll::Ready(Some(element)));
		}

		let visible = element
			.evaluate::<bool>(js::CHECK_VISIBILITY, vec![EvalArg::Lazy(LazyArg::utility())])
			.await;
		let visible = match visible {
			Ok(visible) => visible,
			Err(err) => {
				if let Err(dispose_err) = element.dispose().await {
					tracing::debug!(error = %dispose_err, "Failed to release candidate after visibility check");
				}
				return Err(err);
			}
		};

		if self.visible && visible {
			return Ok(Poll::Ready(Some(element)));
		}
		element.dispose().await?;
		Ok(if self.hidden && !visible { Poll::Ready(None) } else { Poll::Pending })
	}

	async fn setup(&self) -> Result<ElementHandle> {
		let world = self.frame.next_world(WorldKind::Isolated).await?;
		for (name, binding) in &self.bindings {
			world.create_global_binding(name, binding.clone()).await?;
		}
		match self.target {
			WaitTarget::Element(element) => world.adopt_element(element).await,
			WaitTarget::Frame(_) => world.document().await,
		}
	}

	async fn release_root(&mut self) {
		if let Some(root) = self.root.take() {
			if let Err(err) = root.dispose().await {
				tracing::debug!(error = %err, "Failed to release wait root");
			}
		}
	}

	fn timeout_error(&self) -> Error {
		let ms = self.timeout.map(|timeout| timeout.as_millis()).unwrap_or_default();
		Error::Timeout(format!("Waiting for selector `{}` failed: {ms}ms exceeded", self.selector))
	}
}
