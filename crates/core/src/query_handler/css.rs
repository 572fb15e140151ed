//! Native CSS selectors.

use pwq_runtime::Result;

use super::{Primitive, QueryHandler};
use crate::js;

/// Resolves selectors with `querySelectorAll` / `querySelector`.
#[derive(Debug, Clone)]
pub struct CssQueryHandler {
	primitive: Primitive,
}

impl CssQueryHandler {
	pub fn new() -> Self {
		Self {
			primitive: Primitive::Both {
				all: js::CSS_QUERY_ALL.into(),
				one: js::CSS_QUERY_ONE.into(),
			},
		}
	}
}

impl Default for CssQueryHandler {
	fn default() -> Self {
		Self::new()
	}
}

impl QueryHandler for CssQueryHandler {
	fn name(&self) -> &str {
		"css"
	}

	fn primitive(&self) -> Result<&Primitive> {
		Ok(&self.primitive)
	}
}
