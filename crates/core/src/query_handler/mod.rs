//! Pluggable query handlers.
//!
//! A handler resolves selectors of one dialect against a root node. Concrete
//! handlers only declare the page functions they have through a [`Primitive`];
//! the missing half is derived:
//!
//! - only `All`: `query_one` drains the remote iterable one element at a time
//!   and stops after the first.
//! - only `One`: `query_all` yields zero or one element.
//!
//! Waiting is built on `query_one` and works for every handler (see
//! [`wait_task`](crate::wait_task)).

pub mod aria;
pub mod css;
pub mod custom;
pub mod p_query;

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use pwq_protocol::WaitForSelectorOptions;
use pwq_runtime::{BoxFuture, Error, Result};
use serde_json::Value;

use crate::element_handle::ElementHandle;
use crate::handle::JsHandle;
use crate::handle_iterator::HandleIterator;
use crate::js::PageFunction;
use crate::lazy_arg::LazyArg;
use crate::selector::{SelectorStep, parse_selector};
use crate::wait_task::{self, WaitTarget};
use crate::world::{Bindings, EvalArg, World};

pub use aria::{AriaQuery, AriaQueryHandler, parse_aria_selector};
pub use css::CssQueryHandler;
pub use custom::{
	CustomQueryHandler, CustomQueryRegistry, CustomQuerySource, clear_custom_query_handlers,
	custom_query_handler_names, register_custom_query_handler, unregister_custom_query_handler,
};
pub use p_query::PQueryHandler;

/// Lazily fetched query results.
pub type HandleStream<'a> = BoxStream<'a, Result<ElementHandle>>;

/// Page functions a handler declares.
///
/// Each function is called as `(root, selector, util)`; the multi-result one
/// may return any iterable, sync or async.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
	/// Only a multi-result function.
	All(PageFunction),
	/// Only a single-result function.
	One(PageFunction),
	/// Both functions.
	Both { all: PageFunction, one: PageFunction },
}

impl Primitive {
	/// Builds a primitive from whichever functions are present.
	///
	/// # Errors
	///
	/// Returns [`Error::Configuration`] when both are absent.
	pub fn from_parts(all: Option<PageFunction>, one: Option<PageFunction>) -> Result<Self> {
		match (all, one) {
			(Some(all), Some(one)) => Ok(Self::Both { all, one }),
			(Some(all), None) => Ok(Self::All(all)),
			(None, Some(one)) => Ok(Self::One(one)),
			(None, None) => Err(no_primitive()),
		}
	}

	/// The multi-result function, if declared.
	pub fn all(&self) -> Option<&PageFunction> {
		match self {
			Self::All(all) | Self::Both { all, .. } => Some(all),
			Self::One(_) => None,
		}
	}

	/// The single-result function, if declared.
	pub fn one(&self) -> Option<&PageFunction> {
		match self {
			Self::One(one) | Self::Both { one, .. } => Some(one),
			Self::All(_) => None,
		}
	}
}

fn no_primitive() -> Error {
	Error::Configuration("Cannot create default query selector: neither queryAll nor queryOne is declared".into())
}

/// A selector engine.
///
/// Implementors usually declare a [`Primitive`] and inherit everything else.
/// Handlers that resolve on the host side override `query_all` and
/// `query_one` directly.
pub trait QueryHandler: Send + Sync + 'static {
	/// Short name used in logs.
	fn name(&self) -> &str;

	/// Page functions backing the default query methods.
	fn primitive(&self) -> Result<&Primitive> {
		Err(no_primitive())
	}

	/// Readies `world` for this handler. Runs before every query.
	fn prepare<'a>(&'a self, _world: &'a World) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	/// Converts the selector into the argument handed to the page functions.
	fn selector_argument(&self, selector: &str) -> Result<Value> {
		Ok(Value::String(selector.to_owned()))
	}

	/// Global bindings remote polling code may call.
	fn bindings(&self) -> Bindings {
		Bindings::new()
	}

	/// Streams every element under `root` matching `selector`.
	fn query_all<'a>(self: Arc<Self>, root: &'a ElementHandle, selector: &str) -> HandleStream<'a> {
		let selector = selector.to_owned();
		stream::once(derived_query_all(self, root, selector))
			.try_flatten()
			.boxed()
	}

	/// First element under `root` matching `selector`.
	fn query_one<'a>(
		self: Arc<Self>,
		root: &'a ElementHandle,
		selector: &str,
	) -> BoxFuture<'a, Result<Option<ElementHandle>>> {
		let selector = selector.to_owned();
		Box::pin(derived_query_one(self, root, selector))
	}

	/// Polls until an element matching `selector` appears under `target`.
	///
	/// `bindings` are registered in the polling world next to
	/// [`QueryHandler::bindings`].
	fn wait_for<'a>(
		self: Arc<Self>,
		target: WaitTarget<'a>,
		selector: &str,
		options: WaitForSelectorOptions,
		bindings: Bindings,
	) -> BoxFuture<'a, Result<Option<ElementHandle>>> {
		let selector = selector.to_owned();
		Box::pin(wait_task::wait_for_selector(self, target, selector, options, bindings))
	}
}

async fn derived_query_all<H: QueryHandler + ?Sized>(
	handler: Arc<H>,
	root: &ElementHandle,
	selector: String,
) -> Result<HandleStream<'static>> {
	let primitive = handler.primitive()?;
	let world = root.world();
	handler.prepare(world).await?;
	let argument = handler.selector_argument(&selector)?;

	match primitive.all() {
		Some(all) => {
			let iterable = call_primitive(world, all, root, argument).await?;
			let batch_size = root.frame().settings().iterator_batch_size;
			Ok(HandleIterator::new(iterable, root.frame().clone(), batch_size).into_stream())
		}
		None => {
			let one = primitive.one().ok_or_else(no_primitive)?;
			let found = call_primitive(world, one, root, argument).await?;
			Ok(match element_or_dispose(found).await? {
				Some(element) => stream::once(async move { Ok(element) }).boxed(),
				None => stream::empty().boxed(),
			})
		}
	}
}

async fn derived_query_one<H: QueryHandler + ?Sized>(
	handler: Arc<H>,
	root: &ElementHandle,
	selector: String,
) -> Result<Option<ElementHandle>> {
	let primitive = handler.primitive()?;
	let world = root.world();
	handler.prepare(world).await?;
	let argument = handler.selector_argument(&selector)?;

	match primitive.one() {
		Some(one) => {
			let found = call_primitive(world, one, root, argument).await?;
			element_or_dispose(found).await
		}
		None => {
			let all = primitive.all().ok_or_else(no_primitive)?;
			let iterable = call_primitive(world, all, root, argument).await?;
			let mut cursor = HandleIterator::new(iterable, root.frame().clone(), 1);
			let first = cursor.next().await;
			cursor.dispose().await;
			first
		}
	}
}

async fn call_primitive(
	world: &World,
	function: &PageFunction,
	root: &ElementHandle,
	argument: Value,
) -> Result<JsHandle> {
	world
		.evaluate_handle(function.source(), vec![
			EvalArg::from(root),
			EvalArg::Value(argument),
			EvalArg::Lazy(LazyArg::utility()),
		])
		.await
}

/// Keeps node handles, disposes anything else.
pub(crate) async fn element_or_dispose(handle: JsHandle) -> Result<Option<ElementHandle>> {
	match handle.into_element() {
		Ok(element) => Ok(Some(element)),
		Err(other) => {
			other.dispose().await?;
			Ok(None)
		}
	}
}

/// Picks the handler for `selector` and the selector it should receive.
///
/// A single `aria/...` step goes to [`AriaQueryHandler`], a single custom
/// step to its registered handler and plain CSS to [`CssQueryHandler`].
/// Chains mixing engines go to [`PQueryHandler`] with the full selector.
///
/// # Errors
///
/// Returns [`Error::InvalidSelector`] if the selector does not parse.
pub fn get_query_handler_and_selector(selector: &str) -> Result<(Arc<dyn QueryHandler>, String)> {
	let steps = parse_selector(selector, custom::is_registered)?;

	if let [step] = steps.as_slice() {
		let routed: Option<(Arc<dyn QueryHandler>, &String)> = match step {
			SelectorStep::Css { expression } => {
				Some((Arc::new(CssQueryHandler::new()) as Arc<dyn QueryHandler>, expression))
			}
			SelectorStep::Aria { expression } => Some((Arc::new(AriaQueryHandler) as Arc<dyn QueryHandler>, expression)),
			SelectorStep::Custom { name, expression } => {
				custom::lookup(name).map(|handler| (handler as Arc<dyn QueryHandler>, expression))
			}
		};
		if let Some((handler, expression)) = routed {
			return Ok((handler, expression.clone()));
		}
	}

	let handler: Arc<dyn QueryHandler> = Arc::new(PQueryHandler::new());
	Ok((handler, selector.to_owned()))
}
