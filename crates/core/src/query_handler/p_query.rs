//! Chained selectors mixing CSS, ARIA and custom engines.

use pwq_runtime::{BoxFuture, Result};
use serde_json::{Value, json};

use super::aria::{self, ARIA_QUERY_ALL_BINDING};
use super::{Primitive, QueryHandler, custom};
use crate::js;
use crate::selector::parse_selector;
use crate::world::{Bindings, EvalArg, World};

const ARIA_RESOLVER: &str = "aria-resolver";

/// Resolves chained selectors inside the page through the utility library.
///
/// The selector is parsed on the host and handed over as JSON steps. ARIA
/// steps call back into the host through `__ariaQuerySelectorAll`; custom
/// steps use the engines exposed in the world.
#[derive(Debug, Clone)]
pub struct PQueryHandler {
	primitive: Primitive,
}

impl PQueryHandler {
	pub fn new() -> Self {
		Self {
			primitive: Primitive::Both {
				all: js::P_QUERY_ALL.into(),
				one: js::P_QUERY_ONE.into(),
			},
		}
	}
}

impl Default for PQueryHandler {
	fn default() -> Self {
		Self::new()
	}
}

impl QueryHandler for PQueryHandler {
	fn name(&self) -> &str {
		"pquery"
	}

	fn primitive(&self) -> Result<&Primitive> {
		Ok(&self.primitive)
	}

	fn prepare<'a>(&'a self, world: &'a World) -> BoxFuture<'a, Result<()>> {
		Box::pin(prepare_world(world))
	}

	fn selector_argument(&self, selector: &str) -> Result<Value> {
		let steps = parse_selector(selector, custom::is_registered)?;
		Ok(serde_json::to_value(steps)?)
	}

	fn bindings(&self) -> Bindings {
		let mut bindings = Bindings::new();
		bindings.insert(ARIA_QUERY_ALL_BINDING.to_owned(), aria::query_all_binding());
		bindings
	}
}

async fn prepare_world(world: &World) -> Result<()> {
	if let Ok(frame) = world.frame() {
		let source = format!("({})()", js::ARIA_RESOLVER_INIT);
		if let Err(err) = frame.page().prepare_once(ARIA_RESOLVER, &source).await {
			tracing::warn!(error = %err, "Failed to register ARIA resolver for new documents");
		}
	}

	world
		.create_global_binding(ARIA_QUERY_ALL_BINDING, aria::query_all_binding())
		.await?;
	if !world.is_prepared(ARIA_RESOLVER) {
		world.evaluate::<Value>(js::ARIA_RESOLVER_INIT, Vec::new()).await?;
		world.mark_prepared(ARIA_RESOLVER);
	}

	for (name, registration) in custom::registrations() {
		if !world.expose_engine(registration.id) {
			continue;
		}
		let source = registration.handler.source();
		let exposed = world
			.evaluate::<Value>(js::EXPOSE_CUSTOM_ENGINE, vec![
				EvalArg::Value(json!(name)),
				EvalArg::Value(json!(source.query_all)),
				EvalArg::Value(json!(source.query_one)),
			])
			.await;
		match exposed {
			Ok(_) => tracing::debug!(world = %world.id(), engine = %name, "Exposed custom query handler"),
			Err(err) => {
				tracing::warn!(world = %world.id(), engine = %name, error = %err, "Failed to expose custom query handler");
				world.forget_engine(registration.id);
			}
		}
	}
	Ok(())
}
