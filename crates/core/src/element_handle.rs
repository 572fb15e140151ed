//! Handles to DOM nodes.

use std::fmt;
use std::ops::Deref;

use futures_util::StreamExt;
use futures_util::stream;
use pwq_protocol::WaitForSelectorOptions;
use pwq_runtime::Result;

use crate::frame::Frame;
use crate::handle::JsHandle;
use crate::query_handler::{HandleStream, get_query_handler_and_selector};
use crate::wait_task::WaitTarget;
use crate::world::Bindings;

/// A [`JsHandle`] known to refer to a DOM node.
///
/// Dereferences to the underlying handle, so evaluation and disposal work the
/// same way.
pub struct ElementHandle {
	handle: JsHandle,
	frame: Frame,
}

impl ElementHandle {
	pub(crate) fn new(handle: JsHandle, frame: Frame) -> Self {
		Self { handle, frame }
	}

	/// The frame whose document contains this node.
	pub fn frame(&self) -> &Frame {
		&self.frame
	}

	/// Unwraps the underlying handle.
	pub fn into_handle(self) -> JsHandle {
		self.handle
	}

	/// Streams every element under this node matching `selector`.
	///
	/// Elements are fetched lazily in batches; dropping the stream releases
	/// whatever was fetched but not yielded.
	pub fn query_selector_all(&self, selector: &str) -> HandleStream<'_> {
		match get_query_handler_and_selector(selector) {
			Ok((handler, selector)) => handler.query_all(self, &selector),
			Err(err) => stream::once(async move { Err(err) }).boxed(),
		}
	}

	/// First element under this node matching `selector`.
	pub async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
		let (handler, selector) = get_query_handler_and_selector(selector)?;
		handler.query_one(self, &selector).await
	}

	/// Waits for an element under this node matching `selector`.
	///
	/// The match is returned in the main world. With `hidden` the wait resolves
	/// to `None` once no visible match remains.
	pub async fn wait_for_selector(
		&self,
		selector: &str,
		options: WaitForSelectorOptions,
	) -> Result<Option<ElementHandle>> {
		let (handler, selector) = get_query_handler_and_selector(selector)?;
		handler
			.wait_for(WaitTarget::Element(self), &selector, options, Bindings::new())
			.await
	}
}

impl Deref for ElementHandle {
	type Target = JsHandle;

	fn deref(&self) -> &JsHandle {
		&self.handle
	}
}

impl fmt::Display for ElementHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.handle, f)
	}
}

impl fmt::Debug for ElementHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ElementHandle")
			.field("handle", &self.handle)
			.field("frame", &self.frame.id())
			.finish()
	}
}
