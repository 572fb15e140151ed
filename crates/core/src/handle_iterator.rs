//! Draining remote iterables into element streams.
//!
//! A query returns a remote iterable (array, generator, async generator). The
//! iterator is pulled in fixed-size batches, each batch comes back as one
//! array whose entries are fetched as individual handles.

use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream;
use pwq_runtime::Result;
use serde_json::json;

use crate::element_handle::ElementHandle;
use crate::frame::Frame;
use crate::handle::JsHandle;
use crate::js;
use crate::query_handler::HandleStream;
use crate::world::EvalArg;

/// Forward-only cursor over the nodes of a remote iterable.
pub(crate) struct HandleIterator {
	iterable: Option<JsHandle>,
	iterator: Option<JsHandle>,
	frame: Frame,
	batch_size: usize,
	buffered: VecDeque<ElementHandle>,
	exhausted: bool,
}

impl HandleIterator {
	pub(crate) fn new(iterable: JsHandle, frame: Frame, batch_size: usize) -> Self {
		Self {
			iterable: Some(iterable),
			iterator: None,
			frame,
			batch_size: batch_size.max(1),
			buffered: VecDeque::new(),
			exhausted: false,
		}
	}

	/// Next node, fetching another batch when the buffer runs dry.
	pub(crate) async fn next(&mut self) -> Result<Option<ElementHandle>> {
		loop {
			if let Some(element) = self.buffered.pop_front() {
				return Ok(Some(element));
			}
			if self.exhausted {
				self.dispose().await;
				return Ok(None);
			}
			self.fetch_batch().await?;
		}
	}

	async fn fetch_batch(&mut self) -> Result<()> {
		if self.iterator.is_none() {
			let Some(iterable) = self.iterable.take() else {
				self.exhausted = true;
				return Ok(());
			};
			let iterator = iterable.evaluate_handle(js::ITERATOR_FROM, Vec::new()).await;
			iterable.dispose().await?;
			self.iterator = Some(iterator?);
		}
		let Some(iterator) = self.iterator.as_ref() else {
			return Ok(());
		};

		let batch = iterator
			.evaluate_handle(js::ITERATOR_NEXT_BATCH, vec![EvalArg::Value(json!(self.batch_size))])
			.await?;
		let properties = batch.get_properties().await;
		batch.dispose().await?;
		let properties = properties?;

		if properties.len() < self.batch_size {
			self.exhausted = true;
		}
		tracing::debug!(fetched = properties.len(), exhausted = self.exhausted, "Fetched iterator batch");

		for (_, value) in properties {
			if !value.remote_object().is_node() {
				value.dispose().await?;
				continue;
			}
			self.buffered.push_back(ElementHandle::new(value, self.frame.clone()));
		}
		Ok(())
	}

	/// Releases the iterator and every fetched but unyielded element.
	pub(crate) async fn dispose(&mut self) {
		let pending = self
			.iterable
			.take()
			.into_iter()
			.chain(self.iterator.take())
			.chain(self.buffered.drain(..).map(ElementHandle::into_handle));
		for handle in pending.collect::<Vec<_>>() {
			if let Err(err) = handle.dispose().await {
				tracing::debug!(error = %err, "Failed to release iterator handle");
			}
		}
		self.exhausted = true;
	}

	/// Turns the cursor into a stream that owns it.
	pub(crate) fn into_stream(self) -> HandleStream<'static> {
		stream::unfold(Some(self), |state| async move {
			let Some(mut cursor) = state else {
				return None;
			};
			match cursor.next().await {
				Ok(Some(element)) => Some((Ok(element), Some(cursor))),
				Ok(None) => None,
				Err(err) => {
					cursor.dispose().await;
					Some((Err(err), None))
				}
			}
		})
		.boxed()
	}
}
