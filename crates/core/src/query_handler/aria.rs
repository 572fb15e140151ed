//! ARIA selectors, resolved against the accessibility tree on the host side.
//!
//! Syntax: `accessible name[role="button"][name="override"]`. The free text is
//! the default accessible name; runs of spaces collapse to one.

use std::sync::{Arc, LazyLock};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use pwq_protocol::{BackendNodeId, WaitForSelectorOptions};
use pwq_runtime::{BoxFuture, Error, Result};
use regex::Regex;
use serde_json::Value;

use super::{HandleStream, QueryHandler};
use crate::element_handle::ElementHandle;
use crate::handle::JsHandle;
use crate::js;
use crate::wait_task::{self, WaitTarget};
use crate::world::{BindingFn, BindingResult, Bindings, EvalArg, World, binding_fn};

/// Binding through which in-page code resolves a single ARIA match.
pub const ARIA_QUERY_ONE_BINDING: &str = "__ariaQuerySelector";
/// Binding through which in-page code resolves every ARIA match.
pub const ARIA_QUERY_ALL_BINDING: &str = "__ariaQuerySelectorAll";

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r#"\[\s*(?P<attribute>\w+)\s*=\s*(?:"(?P<dq>(?:\\.|[^"\\])*)"|'(?P<sq>(?:\\.|[^'\\])*)')\s*\]"#,
	)
	.expect("valid regex")
});

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(" +").expect("valid regex"));

/// Parsed ARIA selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AriaQuery {
	/// Accessible name to match.
	pub name: Option<String>,
	/// Role to match.
	pub role: Option<String>,
}

/// Parses an ARIA selector.
///
/// # Errors
///
/// Returns [`Error::InvalidSelector`] for attributes other than `name` and
/// `role`.
pub fn parse_aria_selector(selector: &str) -> Result<AriaQuery> {
	let mut query = AriaQuery::default();
	let mut remainder = String::with_capacity(selector.len());
	let mut last = 0;

	for captures in ATTRIBUTE.captures_iter(selector) {
		let Some(whole) = captures.get(0) else {
			continue;
		};
		remainder.push_str(&selector[last..whole.start()]);
		last = whole.end();

		let value = captures
			.name("dq")
			.or_else(|| captures.name("sq"))
			.map(|m| normalize(m.as_str()))
			.unwrap_or_default();
		match &captures["attribute"] {
			"name" => query.name = Some(value),
			"role" => query.role = Some(value),
			other => {
				return Err(Error::InvalidSelector {
					selector: selector.to_owned(),
					reason: format!("Unknown aria attribute \"{other}\" in selector"),
				});
			}
		}
	}
	remainder.push_str(&selector[last..]);

	if query.name.is_none() {
		let default_name = normalize(&remainder);
		if !default_name.is_empty() {
			query.name = Some(default_name);
		}
	}
	Ok(query)
}

fn normalize(value: &str) -> String {
	SPACES.replace_all(value, " ").trim().to_owned()
}

/// Host-side ARIA handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct AriaQueryHandler;

impl AriaQueryHandler {
	async fn matching_nodes(root: &ElementHandle, selector: &str) -> Result<Vec<BackendNodeId>> {
		let query = parse_aria_selector(selector)?;
		let world = root.world();
		let object = root.live_node_id()?;
		world.ensure_alive()?;
		world
			.connection()
			.query_accessibility_tree(world.id(), object, query.name.as_deref(), query.role.as_deref())
			.await
			.map_err(|err| world.classify(err))
	}
}

async fn resolve(world: World, node: BackendNodeId) -> Result<Option<ElementHandle>> {
	let handle = world.resolve_node(node).await?;
	super::element_or_dispose(handle).await
}

impl QueryHandler for AriaQueryHandler {
	fn name(&self) -> &str {
		"aria"
	}

	fn bindings(&self) -> Bindings {
		let mut bindings = Bindings::new();
		bindings.insert(ARIA_QUERY_ONE_BINDING.to_owned(), query_one_binding());
		bindings
	}

	fn query_all<'a>(self: Arc<Self>, root: &'a ElementHandle, selector: &str) -> HandleStream<'a> {
		let selector = selector.to_owned();
		stream::once(async move {
			let nodes = Self::matching_nodes(root, &selector).await?;
			let world = root.world().clone();
			let resolved = stream::iter(nodes)
				.then(move |node| resolve(world.clone(), node))
				.try_filter_map(|element| async move { Ok(element) });
			Ok::<HandleStream<'static>, Error>(resolved.boxed())
		})
		.try_flatten()
		.boxed()
	}

	fn query_one<'a>(
		self: Arc<Self>,
		root: &'a ElementHandle,
		selector: &str,
	) -> BoxFuture<'a, Result<Option<ElementHandle>>> {
		let selector = selector.to_owned();
		Box::pin(async move {
			let nodes = Self::matching_nodes(root, &selector).await?;
			match nodes.first() {
				Some(node) => resolve(root.world().clone(), *node).await,
				None => Ok(None),
			}
		})
	}

	fn wait_for<'a>(
		self: Arc<Self>,
		target: WaitTarget<'a>,
		selector: &str,
		options: WaitForSelectorOptions,
		mut bindings: Bindings,
	) -> BoxFuture<'a, Result<Option<ElementHandle>>> {
		bindings.insert(ARIA_QUERY_ONE_BINDING.to_owned(), query_one_binding());
		let selector = selector.to_owned();
		Box::pin(wait_task::wait_for_selector(self, target, selector, options, bindings))
	}
}

/// `__ariaQuerySelector(root, selector)`: first match or `null`.
pub(crate) fn query_one_binding() -> BindingFn {
	binding_fn(|_world, args| async move {
		let (root, selector) = binding_args(args).await?;
		let found = Arc::new(AriaQueryHandler).query_one(&root, &selector).await;
		release(root).await;
		Ok(match found? {
			Some(element) => BindingResult::Handle(element.into_handle()),
			None => BindingResult::Value(Value::Null),
		})
	})
}

/// `__ariaQuerySelectorAll(root, selector)`: array of every match.
pub(crate) fn query_all_binding() -> BindingFn {
	binding_fn(|world, args| async move {
		let (root, selector) = binding_args(args).await?;
		let found: Result<Vec<ElementHandle>> = Arc::new(AriaQueryHandler)
			.query_all(&root, &selector)
			.try_collect()
			.await;
		release(root).await;
		let elements = found?;

		let array = world
			.evaluate_handle(js::COLLECT, elements.iter().map(EvalArg::from).collect())
			.await;
		for element in elements {
			release(element).await;
		}
		Ok(BindingResult::Handle(array?))
	})
}

async fn binding_args(args: Vec<JsHandle>) -> Result<(ElementHandle, String)> {
	let mut args = args.into_iter();
	let (Some(root), Some(selector)) = (args.next(), args.next()) else {
		return Err(Error::InvalidArgument(
			"ARIA bindings take a root node and a selector".into(),
		));
	};
	let selector: String = selector.json_value().await?;
	let root = root
		.into_element()
		.map_err(|_| Error::InvalidArgument("ARIA binding root must be a node".into()))?;
	Ok((root, selector))
}

async fn release(element: ElementHandle) {
	if let Err(err) = element.dispose().await {
		tracing::debug!(error = %err, "Failed to release ARIA handle");
	}
}
